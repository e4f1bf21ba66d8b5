//! # wisp-audio
//!
//! Turns an uploaded voice clip into the PCM the live model wants:
//!
//! ```text
//! clip bytes (m4a/wav/...) → symphonia decode → mono mix (f32)
//! → rubato resample to 16kHz → PCM16 samples
//! ```
//!
//! The duration ceiling is enforced here too, from the decoded sample
//! count rather than anything the client claims.

#![deny(unsafe_code)]

pub mod clip;
pub mod errors;

pub use clip::{decode_clip, AudioClip, TARGET_SAMPLE_RATE};
pub use errors::AudioError;
