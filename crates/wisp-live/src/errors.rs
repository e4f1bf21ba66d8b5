//! Live session errors.
//!
//! These stay inside the crate boundary: the turn coordinator converts
//! every one of them into a canned phrase before a caller sees anything.

/// Errors from the live session transport.
#[derive(Debug, thiserror::Error)]
pub enum LiveError {
    /// Could not establish the websocket session.
    #[error("live connect failed: {message}")]
    Connect {
        /// Error description.
        message: String,
    },

    /// Websocket-level failure after connect.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Frame (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The server broke the expected handshake or frame sequence.
    #[error("protocol error: {message}")]
    Protocol {
        /// Error description.
        message: String,
    },

    /// The session is gone (closed by either side).
    #[error("live session closed")]
    Closed,

    /// No live backend is configured (missing API key).
    #[error("live backend disabled")]
    Disabled,
}

impl LiveError {
    /// Error category string for log fields.
    #[must_use]
    pub fn category(&self) -> &'static str {
        match self {
            Self::Connect { .. } => "connect",
            Self::WebSocket(_) => "transport",
            Self::Json(_) => "parse",
            Self::Protocol { .. } => "protocol",
            Self::Closed => "closed",
            Self::Disabled => "disabled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_detail() {
        let e = LiveError::Connect {
            message: "dns failure".into(),
        };
        assert!(e.to_string().contains("dns failure"));
    }

    #[test]
    fn categories_are_stable() {
        assert_eq!(LiveError::Closed.category(), "closed");
        assert_eq!(LiveError::Disabled.category(), "disabled");
        let e = LiveError::Protocol {
            message: "x".into(),
        };
        assert_eq!(e.category(), "protocol");
    }

    #[test]
    fn json_errors_convert() {
        let bad: Result<serde_json::Value, _> = serde_json::from_str("{nope");
        let e = LiveError::from(bad.unwrap_err());
        assert_eq!(e.category(), "parse");
    }
}
