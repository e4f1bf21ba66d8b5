//! Gemini Live websocket client.
//!
//! Speaks the `BidiGenerateContent` protocol: one JSON `setup` frame on
//! connect, base64 PCM `realtimeInput` frames upstream, and a stream of
//! JSON server messages downstream that this module maps into
//! [`LiveEvent`]s. Only the frames this service actually uses are
//! implemented, not the whole protocol.

use async_stream::stream;
use async_trait::async_trait;
use base64::Engine as _;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, warn};

use wisp_core::events::{LiveEvent, ToolCall, ToolReply};

use crate::client::{LiveClient, LiveHandle, LiveResult, LiveSession};
use crate::errors::LiveError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection settings for the Gemini Live API.
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    /// API key, appended to the endpoint as a query parameter.
    pub api_key: String,
    /// Model identifier, e.g. `models/gemini-2.0-flash-exp`.
    pub model: String,
    /// WebSocket endpoint URL.
    pub endpoint: String,
    /// System instruction sent in the setup frame.
    pub system_instruction: String,
}

/// Live client backed by the Gemini bidirectional streaming API.
pub struct GeminiLive {
    config: GeminiConfig,
}

impl GeminiLive {
    /// Build a client from connection settings.
    #[must_use]
    pub fn new(config: GeminiConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl LiveClient for GeminiLive {
    fn model(&self) -> &str {
        &self.config.model
    }

    async fn open(&self) -> LiveResult<LiveSession> {
        let url = format!("{}?key={}", self.config.endpoint, self.config.api_key);
        let (mut ws, _) = connect_async(&url)
            .await
            .map_err(|e| LiveError::Connect {
                message: e.to_string(),
            })?;

        let setup = setup_frame(&self.config);
        ws.send(Message::Text(setup.to_string().into())).await?;

        // The server acks setup before accepting realtime input.
        loop {
            let Some(msg) = ws.next().await else {
                return Err(LiveError::Protocol {
                    message: "connection closed before setup ack".into(),
                });
            };
            let Some(text) = frame_text(msg?) else {
                continue;
            };
            let parsed: ServerMessage = serde_json::from_str(&text)?;
            if parsed.setup_complete.is_some() {
                break;
            }
            debug!("ignoring pre-setup frame");
        }
        debug!(model = %self.config.model, "live session established");

        let (sink, read) = ws.split();
        Ok(LiveSession {
            handle: Box::new(GeminiHandle { sink }),
            events: Box::pin(read_events(read)),
        })
    }
}

struct GeminiHandle {
    sink: SplitSink<WsStream, Message>,
}

#[async_trait]
impl LiveHandle for GeminiHandle {
    async fn send_audio(&mut self, samples: &[i16]) -> LiveResult<()> {
        let frame = audio_frame(samples);
        self.sink.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn send_tool_reply(&mut self, reply: &ToolReply) -> LiveResult<()> {
        let frame = tool_reply_frame(reply);
        self.sink.send(Message::Text(frame.to_string().into())).await?;
        Ok(())
    }

    async fn close(&mut self) -> LiveResult<()> {
        self.sink.send(Message::Close(None)).await?;
        Ok(())
    }
}

fn read_events(
    mut read: SplitStream<WsStream>,
) -> impl Stream<Item = Result<LiveEvent, LiveError>> {
    stream! {
        while let Some(msg) = read.next().await {
            let msg = match msg {
                Ok(msg) => msg,
                Err(e) => {
                    yield Err(LiveError::WebSocket(e));
                    break;
                }
            };
            if matches!(msg, Message::Close(_)) {
                break;
            }
            let Some(text) = frame_text(msg) else { continue };
            match serde_json::from_str::<ServerMessage>(&text) {
                Ok(parsed) => {
                    for event in map_server_message(parsed) {
                        yield Ok(event);
                    }
                }
                // Skip rather than kill the session; the protocol adds
                // frame kinds we do not track.
                Err(e) => warn!(error = %e, "unparseable live frame"),
            }
        }
    }
}

/// Text payload of a frame, if it carries one. The server sends JSON as
/// binary frames in some deployments.
fn frame_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        _ => None,
    }
}

// ─── Upstream frames ─────────────────────────────────────────────────────

fn setup_frame(config: &GeminiConfig) -> Value {
    json!({
        "setup": {
            "model": config.model,
            "generationConfig": { "responseModalities": ["TEXT"] },
            "systemInstruction": {
                "parts": [{ "text": config.system_instruction }]
            },
            "tools": [{ "functionDeclarations": tool_declarations() }]
        }
    })
}

fn tool_declarations() -> Value {
    json!([
        {
            "name": "move_to",
            "description": "Move to a position inside the current room",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "x": { "type": "INTEGER", "description": "Horizontal coordinate" },
                    "y": { "type": "INTEGER", "description": "Vertical coordinate" }
                },
                "required": ["x", "y"]
            }
        },
        {
            "name": "change_room",
            "description": "Move to a different room",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "roomId": { "type": "STRING", "description": "Destination room id" }
                },
                "required": ["roomId"]
            }
        },
        {
            "name": "interact",
            "description": "Interact with an object in the current room",
            "parameters": {
                "type": "OBJECT",
                "properties": {
                    "objectId": { "type": "STRING", "description": "Object id" }
                },
                "required": ["objectId"]
            }
        },
        {
            "name": "list_rooms",
            "description": "List the rooms that currently exist",
            "parameters": { "type": "OBJECT", "properties": {} }
        }
    ])
}

fn audio_frame(samples: &[i16]) -> Value {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for sample in samples {
        bytes.extend_from_slice(&sample.to_le_bytes());
    }
    let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
    json!({
        "realtimeInput": {
            "mediaChunks": [{ "mimeType": "audio/pcm;rate=16000", "data": data }]
        }
    })
}

fn tool_reply_frame(reply: &ToolReply) -> Value {
    let mut response = json!({
        "name": reply.name,
        "response": reply.payload,
    });
    if let Some(id) = &reply.id {
        response["id"] = json!(id);
    }
    json!({ "toolResponse": { "functionResponses": [response] } })
}

// ─── Downstream frames ───────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerMessage {
    setup_complete: Option<Value>,
    server_content: Option<ServerContent>,
    tool_call: Option<ToolCallFrame>,
    usage_metadata: Option<UsageFrame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ServerContent {
    model_turn: Option<ModelTurn>,
    turn_complete: bool,
    interrupted: bool,
    generation_complete: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ModelTurn {
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Part {
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ToolCallFrame {
    function_calls: Vec<FunctionCallFrame>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FunctionCallFrame {
    id: Option<String>,
    name: String,
    args: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct UsageFrame {
    total_token_count: u64,
}

/// Map one server message to zero or more events.
///
/// A single frame can carry text, a completion flag, and usage metadata
/// at once, so this returns a sequence. Interruption is emitted before
/// any text from the same frame.
fn map_server_message(msg: ServerMessage) -> Vec<LiveEvent> {
    let mut events = Vec::new();
    if let Some(content) = msg.server_content {
        if content.interrupted {
            events.push(LiveEvent::Interrupted);
        }
        let text: String = content
            .model_turn
            .map(|turn| turn.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();
        if !text.is_empty() || content.turn_complete {
            events.push(LiveEvent::Text {
                content: text,
                end_of_turn: content.turn_complete,
            });
        }
        if content.generation_complete {
            events.push(LiveEvent::GenerationComplete);
        }
    }
    if let Some(tool_call) = msg.tool_call {
        for call in tool_call.function_calls {
            events.push(LiveEvent::ToolCall {
                call: ToolCall {
                    id: call.id,
                    name: call.name,
                    args: call.args,
                },
            });
        }
    }
    if let Some(usage) = msg.usage_metadata {
        events.push(LiveEvent::Usage {
            total_tokens: usage.total_token_count,
        });
    }
    events
}
