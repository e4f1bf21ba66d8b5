//! The wander scheduler.
//!
//! Every few seconds the entity drifts to a random spot in its room,
//! so scenes feel inhabited between conversations. Ticks are skipped
//! while a turn is running or the entity is unborn.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::gateway::Gateway;

/// Default cadence between wander considerations.
pub const WANDER_TICK: Duration = Duration::from_secs(3);

/// Spawn the scheduler; it runs until `shutdown` fires.
pub fn spawn_wanderer(
    gateway: Arc<Gateway>,
    tick: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut tick = tokio::time::interval(tick);
        // Skip the immediate first tick
        let _ = tick.tick().await;
        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = tick.tick() => gateway.wander_step(),
            }
        }
        debug!("wander scheduler stopped");
    })
}
