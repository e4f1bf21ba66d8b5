//! Clip processing errors.

/// Errors that can occur while turning an upload into PCM16.
#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    /// Container probe or codec decode failure (unsupported format,
    /// corrupt data).
    #[error("audio decode error: {0}")]
    Decode(String),

    /// Resampling failure.
    #[error("resample error: {0}")]
    Resample(String),

    /// The clip decoded to zero samples.
    #[error("clip contains no audio")]
    Empty,

    /// The clip exceeds the duration ceiling.
    #[error("clip is {duration_secs:.1}s, limit is {limit_secs:.1}s")]
    TooLong {
        /// Decoded duration.
        duration_secs: f64,
        /// Configured ceiling.
        limit_secs: f64,
    },
}
