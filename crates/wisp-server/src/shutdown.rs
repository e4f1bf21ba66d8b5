//! Coordinated shutdown for the server and its background tasks.

use std::time::Duration;

use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// How long [`ShutdownCoordinator::drain`] waits before abandoning tasks.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Fans a single cancellation signal out to every background task.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    token: CancellationToken,
}

impl ShutdownCoordinator {
    /// Create a coordinator with an untriggered token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that resolves when shutdown begins. Clone freely.
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Trigger shutdown. Idempotent.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has been triggered.
    #[must_use]
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Trigger shutdown and wait for the given tasks to finish, up to
    /// `timeout`. Tasks still running after the deadline are left to
    /// die with the process.
    pub async fn drain(&self, handles: Vec<JoinHandle<()>>, timeout: Duration) {
        self.shutdown();
        let count = handles.len();
        match tokio::time::timeout(timeout, join_all(handles)).await {
            Ok(_) => info!(tasks = count, "background tasks drained"),
            Err(_) => warn!(tasks = count, ?timeout, "shutdown drain timed out"),
        }
    }
}
