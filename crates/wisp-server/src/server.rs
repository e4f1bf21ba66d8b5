//! Server wiring: shared state, the router, and the listener loop.

use std::sync::Arc;
use std::time::Instant;

use axum::Json;
use axum::Router;
use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use wisp_live::TurnCoordinator;
use wisp_world::{EntityState, RoomRegistry};

use crate::config::ServerConfig;
use crate::gateway::Gateway;
use crate::health::{self, HealthResponse};
use crate::micgate::MicGate;
use crate::routes;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::{self, BroadcastManager};

/// Shared state behind every handler.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Room/session registry.
    pub registry: Arc<RoomRegistry>,
    /// Entity placement state.
    pub entity: Arc<EntityState>,
    /// The capture gate.
    pub gate: Arc<MicGate>,
    /// Single-flight turn execution.
    pub coordinator: Arc<TurnCoordinator>,
    /// Client event dispatch.
    pub gateway: Arc<Gateway>,
    /// Connection fan-out.
    pub broadcast: Arc<BroadcastManager>,
    /// Shutdown fan-out.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Process start, for uptime reporting.
    pub start_time: Instant,
}

/// The wisp HTTP + WebSocket server.
pub struct WispServer {
    state: AppState,
}

impl WispServer {
    /// Build a server over a wired gateway.
    #[must_use]
    pub fn new(config: ServerConfig, gateway: Arc<Gateway>) -> Self {
        let state = AppState {
            config: Arc::new(config),
            registry: Arc::clone(gateway.registry()),
            entity: Arc::clone(gateway.entity()),
            gate: Arc::clone(gateway.gate()),
            coordinator: Arc::clone(gateway.coordinator()),
            broadcast: Arc::clone(gateway.broadcast()),
            gateway,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
        };
        Self { state }
    }

    /// The shared state, for the daemon and for tests.
    #[must_use]
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Shutdown fan-out for this server and its background tasks.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// Build the router with every route and layer attached.
    #[must_use]
    pub fn router(&self) -> Router {
        let cors = if self.state.config.permissive_cors {
            CorsLayer::permissive()
        } else {
            CorsLayer::new()
        };
        Router::new()
            .route("/health", get(health_handler))
            .route("/ws", get(websocket::session::ws_handler))
            .route(
                "/api/clips",
                post(routes::clips::upload_clip)
                    .layer(DefaultBodyLimit::max(self.state.config.max_clip_bytes)),
            )
            .route(
                "/api/entity/location",
                get(routes::location::entity_location),
            )
            .layer(cors)
            .with_state(self.state.clone())
    }

    /// Bind and serve until the shutdown token fires.
    pub async fn run(&self) -> std::io::Result<()> {
        let addr = (self.state.config.host.as_str(), self.state.config.port);
        let listener = TcpListener::bind(addr).await?;
        let local = listener.local_addr()?;
        info!(addr = %local, "listening");
        let token = self.state.shutdown.token();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(token.cancelled_owned())
            .await
    }
}

async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.broadcast.connection_count(),
        state.registry.active_room_count(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use tower::ServiceExt;

    use wisp_core::ids::RoomId;
    use wisp_live::{DisabledLiveClient, TurnConfig, TurnHooks};

    use crate::gateway::TurnBridge;

    fn test_server() -> WispServer {
        let registry = Arc::new(RoomRegistry::new(Duration::from_secs(20)));
        let entity = Arc::new(EntityState::new());
        let gate = Arc::new(MicGate::new(Duration::from_secs(5)));
        let broadcast = Arc::new(BroadcastManager::new());
        let bridge = Arc::new(TurnBridge::new(
            Arc::clone(&registry),
            Arc::clone(&entity),
            Arc::clone(&broadcast),
        ));
        let coordinator = Arc::new(TurnCoordinator::new(
            Arc::new(DisabledLiveClient),
            bridge as Arc<dyn TurnHooks>,
            TurnConfig::default(),
        ));
        let gateway = Arc::new(Gateway::new(registry, entity, gate, coordinator, broadcast));
        WispServer::new(ServerConfig::default(), gateway)
    }

    /// Create `room` with one session and birth the entity into the
    /// origin (the first room created).
    fn inhabit(server: &WispServer, room: &str) -> RoomId {
        let (room, _existed, _session) =
            server.state().gateway.connect(Some(RoomId::from(room)));
        if !server.state().entity.is_alive() {
            assert!(server.state().entity.birth(room.id.clone()));
        }
        room.id
    }

    async fn body_json(response: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), 100_000)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn get(uri: &str, room: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(room) = room {
            builder = builder.header("x-room-id", room);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn post_clip(room: Option<&str>, body: Vec<u8>) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri("/api/clips")
            .header(header::CONTENT_TYPE, "audio/wav");
        if let Some(room) = room {
            builder = builder.header("x-room-id", room);
        }
        builder.body(Body::from(body)).unwrap()
    }

    /// Minimal PCM16 WAV with a 440Hz tone at the given amplitude.
    fn test_wav(sample_rate: u32, channels: u16, frames: u32, amp: f32) -> Vec<u8> {
        let bits_per_sample: u16 = 16;
        let byte_rate = sample_rate * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let block_align = channels * bits_per_sample / 8;
        let data_size = frames * u32::from(channels) * u32::from(bits_per_sample) / 8;
        let file_size = 36 + data_size;

        let mut buf = Vec::with_capacity(file_size as usize + 8);
        buf.extend_from_slice(b"RIFF");
        buf.extend_from_slice(&file_size.to_le_bytes());
        buf.extend_from_slice(b"WAVE");
        buf.extend_from_slice(b"fmt ");
        buf.extend_from_slice(&16u32.to_le_bytes());
        buf.extend_from_slice(&1u16.to_le_bytes());
        buf.extend_from_slice(&channels.to_le_bytes());
        buf.extend_from_slice(&sample_rate.to_le_bytes());
        buf.extend_from_slice(&byte_rate.to_le_bytes());
        buf.extend_from_slice(&block_align.to_le_bytes());
        buf.extend_from_slice(&bits_per_sample.to_le_bytes());
        buf.extend_from_slice(b"data");
        buf.extend_from_slice(&data_size.to_le_bytes());
        for i in 0..frames {
            let t = i as f32 / sample_rate as f32;
            let value = (amp * (t * 440.0 * std::f32::consts::TAU).sin() * 32_000.0) as i16;
            for _ in 0..channels {
                buf.extend_from_slice(&value.to_le_bytes());
            }
        }
        buf
    }

    #[tokio::test]
    async fn health_reports_counters() {
        let server = test_server();
        let response = server.router().oneshot(get("/health", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json = body_json(response).await;
        assert_eq!(json["status"], "ok");
        assert_eq!(json["connections"], 0);
        assert_eq!(json["activeRooms"], 0);
    }

    #[tokio::test]
    async fn location_requires_the_room_header() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(get("/api/entity/location", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn location_is_not_found_before_birth() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(get("/api/entity/location", Some("lobby")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn location_reports_the_entity_room() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");

        let response = server
            .router()
            .oneshot(get("/api/entity/location", Some("lobby")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        assert_eq!(json["entityRoomId"], "lobby");
        assert_eq!(json["isEntityHere"], true);

        let response = server
            .router()
            .oneshot(get("/api/entity/location", Some("annex")))
            .await
            .unwrap();
        let json = body_json(response).await;
        assert_eq!(json["isEntityHere"], false);
    }

    #[tokio::test]
    async fn clips_require_the_room_header() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(post_clip(None, test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn clips_for_unknown_rooms_are_forbidden() {
        let server = test_server();
        let response = server
            .router()
            .oneshot(post_clip(Some("nowhere"), test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn clips_from_rooms_without_the_entity_are_forbidden() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");
        let (_room, _existed, _session) = server
            .state()
            .gateway
            .connect(Some(RoomId::from("annex")));

        let response = server
            .router()
            .oneshot(post_clip(Some("annex"), test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn undecodable_clips_are_bad_requests() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");

        let response = server
            .router()
            .oneshot(post_clip(Some("lobby"), b"not audio at all".to_vec()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(server.state().gate.holder(), None);
    }

    #[tokio::test]
    async fn overlong_clips_are_rejected_with_413() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");

        // Six seconds, one past the 5.5s ceiling.
        let response = server
            .router()
            .oneshot(post_clip(Some("lobby"), test_wav(16_000, 1, 96_000, 0.2)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(server.state().gate.holder(), None);
    }

    #[tokio::test]
    async fn upload_runs_a_turn_and_arms_the_cooldown() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");

        let response = server
            .router()
            .oneshot(post_clip(Some("lobby"), test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let json = body_json(response).await;
        let text = json["text"].as_str().unwrap();
        assert!(!text.is_empty());

        // Gate released, cooldown armed: the next upload is too soon.
        assert_eq!(server.state().gate.holder(), None);
        let response = server
            .router()
            .oneshot(post_clip(Some("lobby"), test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert!(json["remainingSeconds"].as_u64().unwrap() <= 5);
    }

    #[tokio::test]
    async fn uploads_lose_to_a_room_already_capturing() {
        let server = test_server();
        let _home = inhabit(&server, "lobby");
        let (_room, _existed, _session) = server
            .state()
            .gateway
            .connect(Some(RoomId::from("annex")));
        assert!(server.state().gate.engage(&RoomId::from("annex")).is_ok());

        let response = server
            .router()
            .oneshot(post_clip(Some("lobby"), test_wav(16_000, 1, 16_000, 0.5)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        let json = body_json(response).await;
        assert_eq!(json["holderRoomId"], "annex");
    }
}
