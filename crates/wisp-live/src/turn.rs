//! Turn coordination against the live model stream.
//!
//! One audio clip in, one reply string out. The coordinator serializes
//! turns with a single-flight flag (a second caller gets
//! [`SubmitOutcome::Busy`] immediately, never a queue slot), keeps the
//! model session open across turns while it stays healthy, and drains
//! stream events until one of four endings:
//!
//! - generation complete: extract a reply from the transcript
//! - interruption: drop the transcript, answer with an apology
//! - deadline (overall or idle): salvage whatever text arrived, verbatim
//! - session lost: same salvage, and the next turn reconnects
//!
//! Whatever the ending, the flag is released and the turn buffer is
//! dropped before [`TurnCoordinator::submit_audio`] returns. Raw
//! transport errors never reach the caller; they collapse into canned
//! fallback phrases.
//!
//! Tool calls are handled mid-drain: the injected [`TurnHooks`] executes
//! the call, the reply goes back over the same session, and an optional
//! context note joins the transcript as a `/* [SYSTEM: ..] */` span that
//! extraction later strips.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use std::time::Duration;

use async_trait::async_trait;
use futures::FutureExt as _;
use futures::StreamExt as _;
use regex::Regex;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use wisp_core::events::{LiveEvent, ToolCall, ToolReply};
use wisp_core::ids::TurnId;

use crate::client::{LiveClient, LiveSession};
use crate::extract::Extractor;
use crate::phrases::PhraseBook;
use crate::usage::{UsageSnapshot, UsageWindow};

/// Reply text for a turn that performed actions but said nothing.
const ACTION_ONLY_REPLY: &str = "[The spirit did something, but said nothing.]";

static NOTE_SPAN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").expect("valid regex"));

/// Timing and extraction knobs for the coordinator.
#[derive(Debug, Clone)]
pub struct TurnConfig {
    /// Hard wall-clock bound on one whole turn.
    pub overall_timeout: Duration,
    /// Bound on consecutive silence from the stream.
    pub idle_timeout: Duration,
    /// Transcript extraction strategy.
    pub extractor: Extractor,
    /// Advisory request budget per rolling minute.
    pub requests_per_minute: u32,
    /// Advisory token budget per rolling minute.
    pub tokens_per_minute: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            overall_timeout: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(15),
            extractor: Extractor::default(),
            requests_per_minute: 30,
            tokens_per_minute: 1_000_000,
        }
    }
}

/// Result of one `submit_audio` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Another turn is in flight; nothing was sent.
    Busy,
    /// The turn ran to one of its endings and produced this reply.
    Reply {
        /// Reply text, never empty.
        text: String,
    },
}

/// What a tool call produced.
#[derive(Debug, Clone)]
pub struct ToolOutcome {
    /// Reply sent back to the model over the session.
    pub reply: ToolReply,
    /// Optional context line for the turn transcript.
    pub note: Option<String>,
}

/// Callbacks out of the coordinator while a turn runs.
///
/// All side effects of a turn happen through this trait, which keeps
/// the coordinator free of any knowledge about rooms, entities, or
/// connected clients.
#[async_trait]
pub trait TurnHooks: Send + Sync {
    /// A turn acquired the flight flag and is about to run.
    fn processing_started(&self, turn_id: &TurnId);

    /// The transcript grew. `text` is the accumulated transcript so
    /// far; `end_of_turn` marks a completed speaker turn.
    fn fragment(&self, turn_id: &TurnId, text: &str, end_of_turn: bool);

    /// Execute one tool call and produce its outcome.
    async fn tool_call(&self, call: &ToolCall) -> ToolOutcome;
}

#[derive(Default)]
struct SessionSlot {
    live: Option<LiveSession>,
}

/// Per-turn accumulation state.
#[derive(Default)]
struct TurnBuffer {
    transcript: String,
    saw_text: bool,
    saw_action: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TurnEnd {
    Generation,
    Interrupted,
    Deadline,
    SessionLost,
}

struct FlightGuard<'a> {
    busy: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
    }
}

/// Serializes turns of the shared conversation.
pub struct TurnCoordinator {
    client: Arc<dyn LiveClient>,
    hooks: Arc<dyn TurnHooks>,
    config: TurnConfig,
    busy: AtomicBool,
    session: Mutex<SessionSlot>,
    usage: UsageWindow,
    phrases: PhraseBook,
}

impl TurnCoordinator {
    /// Build a coordinator over a live client and a hook sink.
    #[must_use]
    pub fn new(client: Arc<dyn LiveClient>, hooks: Arc<dyn TurnHooks>, config: TurnConfig) -> Self {
        let usage = UsageWindow::new(config.requests_per_minute, config.tokens_per_minute);
        Self {
            client,
            hooks,
            config,
            busy: AtomicBool::new(false),
            session: Mutex::new(SessionSlot::default()),
            usage,
            phrases: PhraseBook::default(),
        }
    }

    /// Whether a turn is currently in flight.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Relaxed)
    }

    /// Current rolling-minute usage, for observability.
    #[must_use]
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.usage.snapshot()
    }

    /// Run one turn: send the clip, drain the stream, return a reply.
    ///
    /// Never fails. Connect and transport problems, timeouts, and
    /// interruptions all resolve to a usable reply string; the only
    /// non-reply outcome is [`SubmitOutcome::Busy`] when another turn
    /// holds the flight flag, in which case nothing is sent at all.
    pub async fn submit_audio(&self, samples: &[i16]) -> SubmitOutcome {
        if self
            .busy
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return SubmitOutcome::Busy;
        }
        let _flight = FlightGuard { busy: &self.busy };

        let turn_id = TurnId::generate();
        self.usage.record_request();
        self.hooks.processing_started(&turn_id);
        debug!(turn_id = %turn_id, samples = samples.len(), "turn started");

        let text = self.run_turn(&turn_id, samples).await;
        debug!(turn_id = %turn_id, "turn finished");
        SubmitOutcome::Reply { text }
    }

    /// Close the hot session, if any. The next turn reconnects.
    pub async fn shutdown(&self) {
        let mut slot = self.session.lock().await;
        if let Some(mut live) = slot.live.take() {
            if let Err(e) = live.handle.close().await {
                debug!(error = %e, "close on shutdown failed");
            }
        }
    }

    async fn run_turn(&self, turn_id: &TurnId, samples: &[i16]) -> String {
        let mut slot = self.session.lock().await;

        let hot = match slot.live.take() {
            Some(mut live) => {
                if drain_stale(&mut live, &self.usage) {
                    Some(live)
                } else {
                    debug!("hot session was already closed");
                    None
                }
            }
            None => None,
        };
        let mut live = match hot {
            Some(live) => live,
            None => match self.client.open().await {
                Ok(live) => live,
                Err(e) => {
                    warn!(error = %e, "live session open failed");
                    return self.phrases.fallback().to_owned();
                }
            },
        };

        if let Err(e) = live.handle.send_audio(samples).await {
            warn!(error = %e, "audio send failed");
            return self.phrases.fallback().to_owned();
        }

        let (end, turn) = self.drain(turn_id, &mut live).await;
        if end != TurnEnd::SessionLost {
            slot.live = Some(live);
        }
        self.conclude(turn_id, end, turn)
    }

    /// Consume stream events until a terminal signal or a deadline.
    async fn drain(&self, turn_id: &TurnId, live: &mut LiveSession) -> (TurnEnd, TurnBuffer) {
        let mut turn = TurnBuffer::default();
        let overall = tokio::time::sleep(self.config.overall_timeout);
        tokio::pin!(overall);

        let end = loop {
            let frame = tokio::select! {
                () = &mut overall => break TurnEnd::Deadline,
                () = tokio::time::sleep(self.config.idle_timeout) => break TurnEnd::Deadline,
                frame = live.events.next() => frame,
            };
            let event = match frame {
                Some(Ok(event)) => event,
                Some(Err(e)) => {
                    warn!(error = %e, "live stream failed");
                    break TurnEnd::SessionLost;
                }
                None => break TurnEnd::SessionLost,
            };
            match event {
                LiveEvent::Text { content, end_of_turn } => {
                    if !content.is_empty() {
                        turn.transcript.push_str(&content);
                        turn.saw_text = true;
                        self.hooks.fragment(turn_id, &turn.transcript, false);
                    }
                    if end_of_turn {
                        self.hooks.fragment(turn_id, &turn.transcript, true);
                    }
                }
                LiveEvent::ToolCall { call } => {
                    turn.saw_action = true;
                    let outcome = self.hooks.tool_call(&call).await;
                    if let Some(note) = outcome.note {
                        turn.transcript.push_str(&context_note(&note));
                        self.hooks.fragment(turn_id, &turn.transcript, false);
                    }
                    if let Err(e) = live.handle.send_tool_reply(&outcome.reply).await {
                        warn!(error = %e, "tool reply send failed");
                        break TurnEnd::SessionLost;
                    }
                }
                LiveEvent::Interrupted => break TurnEnd::Interrupted,
                LiveEvent::GenerationComplete => break TurnEnd::Generation,
                LiveEvent::Usage { total_tokens } => self.usage.record_tokens(total_tokens),
            }
        };
        (end, turn)
    }

    fn conclude(&self, turn_id: &TurnId, end: TurnEnd, turn: TurnBuffer) -> String {
        match end {
            TurnEnd::Generation => {
                let cleaned = strip_notes(&turn.transcript);
                match self.config.extractor.extract(&cleaned) {
                    Some(text) => text,
                    None if turn.saw_action && !turn.saw_text => {
                        self.hooks.fragment(turn_id, ACTION_ONLY_REPLY, true);
                        ACTION_ONLY_REPLY.to_owned()
                    }
                    None => self.phrases.fallback().to_owned(),
                }
            }
            TurnEnd::Interrupted => {
                debug!(turn_id = %turn_id, "turn interrupted by the user");
                self.phrases.apology().to_owned()
            }
            // Best-effort salvage: the transcript exactly as it
            // accumulated, skipping extraction.
            TurnEnd::Deadline | TurnEnd::SessionLost => {
                if turn.transcript.is_empty() {
                    debug!(turn_id = %turn_id, "turn ended with nothing to salvage");
                    self.phrases.fallback().to_owned()
                } else {
                    turn.transcript
                }
            }
        }
    }
}

/// Discard frames buffered since the previous turn ended.
///
/// Anything already readable predates this turn's audio, so a stale
/// completion cannot terminate the new turn early. Late usage metadata
/// is still worth recording. Returns false when the stream has ended.
fn drain_stale(live: &mut LiveSession, usage: &UsageWindow) -> bool {
    let mut dropped = 0usize;
    loop {
        match live.events.next().now_or_never() {
            None => break,
            Some(None) | Some(Some(Err(_))) => return false,
            Some(Some(Ok(LiveEvent::Usage { total_tokens }))) => usage.record_tokens(total_tokens),
            Some(Some(Ok(_))) => dropped += 1,
        }
    }
    if dropped > 0 {
        debug!(dropped, "discarded frames from an earlier turn");
    }
    true
}

fn context_note(note: &str) -> String {
    format!("/* [SYSTEM: {note}] */")
}

fn strip_notes(transcript: &str) -> String {
    NOTE_SPAN.replace_all(transcript, "").into_owned()
}
