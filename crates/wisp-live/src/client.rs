//! Live session abstraction.
//!
//! A live session is one bidirectional conversation with the model:
//! audio and tool replies go up through a [`LiveHandle`], events come
//! down as a [`LiveEventStream`]. The [`TurnCoordinator`] owns exactly
//! one session at a time and reopens it lazily when it dies.
//!
//! [`TurnCoordinator`]: crate::turn::TurnCoordinator

use std::fmt;
use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use wisp_core::events::{LiveEvent, ToolReply};

use crate::errors::LiveError;

/// Result type alias for live session operations.
pub type LiveResult<T> = Result<T, LiveError>;

/// Boxed stream of events arriving from the model.
pub type LiveEventStream = Pin<Box<dyn Stream<Item = Result<LiveEvent, LiveError>> + Send>>;

/// Factory for live sessions.
#[async_trait]
pub trait LiveClient: Send + Sync {
    /// Model identifier, for logs.
    fn model(&self) -> &str;

    /// Open a fresh session.
    async fn open(&self) -> LiveResult<LiveSession>;
}

/// Outbound half of a live session.
#[async_trait]
pub trait LiveHandle: Send + Sync {
    /// Send one clip of 16kHz mono PCM16 audio.
    async fn send_audio(&mut self, samples: &[i16]) -> LiveResult<()>;

    /// Send the result of an executed tool call back to the model.
    async fn send_tool_reply(&mut self, reply: &ToolReply) -> LiveResult<()>;

    /// Close the session cleanly.
    async fn close(&mut self) -> LiveResult<()>;
}

/// One open bidirectional session.
pub struct LiveSession {
    /// Outbound sender.
    pub handle: Box<dyn LiveHandle>,
    /// Inbound event stream.
    pub events: LiveEventStream,
}

impl fmt::Debug for LiveSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LiveSession").finish_non_exhaustive()
    }
}

/// Stand-in client for deployments without an API key.
///
/// Every open attempt fails with [`LiveError::Disabled`], which the
/// turn coordinator folds into a fallback phrase. The rest of the
/// service (rooms, entity, movement) works normally.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledLiveClient;

#[async_trait]
impl LiveClient for DisabledLiveClient {
    fn model(&self) -> &str {
        "disabled"
    }

    async fn open(&self) -> LiveResult<LiveSession> {
        Err(LiveError::Disabled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_client_is_object_safe() {
        fn assert_object_safe(_: &dyn LiveClient) {}
        let _ = assert_object_safe;
    }

    #[test]
    fn live_handle_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<dyn LiveHandle>();
    }

    #[tokio::test]
    async fn disabled_client_refuses_to_open() {
        let client = DisabledLiveClient;
        assert_eq!(client.model(), "disabled");
        let err = client.open().await.unwrap_err();
        assert!(matches!(err, LiveError::Disabled));
    }
}
