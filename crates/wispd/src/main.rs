//! # wispd
//!
//! The wisp daemon. Loads settings, wires the world state, the live
//! client, and the gateway together, and serves until ctrl-c.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use wisp_live::{
    DisabledLiveClient, Extractor, GeminiConfig, GeminiLive, LiveClient, TurnConfig,
    TurnCoordinator,
};
use wisp_server::config::ServerConfig;
use wisp_server::gateway::{Gateway, TurnBridge};
use wisp_server::micgate::MicGate;
use wisp_server::movement::spawn_wanderer;
use wisp_server::server::WispServer;
use wisp_server::shutdown::DEFAULT_DRAIN_TIMEOUT;
use wisp_server::websocket::BroadcastManager;
use wisp_settings::{ExtractionMode, WispSettings};
use wisp_world::{EntityState, RoomRegistry};

/// Wisp world server.
#[derive(Parser, Debug)]
#[command(name = "wispd", about = "Wisp world server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (overrides settings; 0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file path (defaults to `~/.wisp/settings.json`).
    #[arg(long)]
    settings: Option<PathBuf>,
}

fn init_logging(settings: &WispSettings) {
    let filter = EnvFilter::try_from_env("WISP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(settings.logging.level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn turn_config(settings: &WispSettings) -> TurnConfig {
    TurnConfig {
        overall_timeout: Duration::from_secs(settings.turn.overall_timeout_secs),
        idle_timeout: Duration::from_secs(settings.turn.idle_timeout_secs),
        extractor: match settings.turn.extraction {
            ExtractionMode::Delimited => Extractor::Delimited,
            ExtractionMode::Tagged => Extractor::Tagged,
        },
        requests_per_minute: settings.turn.requests_per_minute,
        tokens_per_minute: settings.turn.tokens_per_minute,
    }
}

/// A missing API key runs the world without a voice: turns still
/// resolve, through the canned fallback phrases.
fn live_client(settings: &WispSettings) -> Arc<dyn LiveClient> {
    match settings.live.api_key.clone() {
        Some(api_key) => {
            info!(model = %settings.live.model, "live client enabled");
            Arc::new(GeminiLive::new(GeminiConfig {
                api_key,
                model: settings.live.model.clone(),
                endpoint: settings.live.endpoint.clone(),
                system_instruction: settings.live.system_instruction.clone(),
            }))
        }
        None => {
            info!("no live API key configured, canned replies only");
            Arc::new(DisabledLiveClient)
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings = match &args.settings {
        Some(path) => wisp_settings::load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => wisp_settings::load_settings().unwrap_or_default(),
    };
    init_logging(&settings);

    // World state
    let registry = Arc::new(RoomRegistry::new(Duration::from_secs(
        settings.world.eviction_grace_secs,
    )));
    let entity = Arc::new(EntityState::new());
    let gate = Arc::new(MicGate::new(Duration::from_secs(settings.world.cooldown_secs)));
    let broadcast = Arc::new(BroadcastManager::new());

    // Live turns
    let bridge = Arc::new(TurnBridge::new(
        Arc::clone(&registry),
        Arc::clone(&entity),
        Arc::clone(&broadcast),
    ));
    let coordinator = Arc::new(TurnCoordinator::new(
        live_client(&settings),
        bridge,
        turn_config(&settings),
    ));

    let gateway = Arc::new(Gateway::new(
        Arc::clone(&registry),
        Arc::clone(&entity),
        Arc::clone(&gate),
        Arc::clone(&coordinator),
        Arc::clone(&broadcast),
    ));

    let config = ServerConfig {
        host: args.host.unwrap_or_else(|| settings.server.host.clone()),
        port: args.port.unwrap_or(settings.server.port),
        max_connections: settings.server.max_connections,
        max_clip_secs: settings.audio.max_clip_secs,
        ..ServerConfig::default()
    };
    let server = WispServer::new(config, Arc::clone(&gateway));

    // Background tasks share the server's shutdown token.
    let token = server.shutdown().token();
    let pump = gateway.spawn_registry_pump(token.clone());
    let wanderer = spawn_wanderer(
        Arc::clone(&gateway),
        Duration::from_secs(settings.world.movement_interval_secs),
        token,
    );

    tokio::select! {
        result = server.run() => {
            result.context("server terminated")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
        }
    }

    server
        .shutdown()
        .drain(vec![pump, wanderer], DEFAULT_DRAIN_TIMEOUT)
        .await;
    coordinator.shutdown().await;
    info!("shutdown complete");
    Ok(())
}
