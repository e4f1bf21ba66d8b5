//! # wisp-live
//!
//! Everything between a decoded voice clip and the entity's spoken reply:
//!
//! - [`LiveClient`] / [`LiveHandle`]: the bidirectional live-session
//!   abstraction, with [`GeminiLive`] as the real backend over the
//!   Gemini Live websocket API
//! - [`TurnCoordinator`]: single-flight turn execution racing stream
//!   events against wall-clock and idle deadlines
//! - [`Extractor`]: pluggable reply-text extraction (delimited or
//!   tagged transcript protocols)
//! - [`PhraseBook`]: rotating canned phrases for interrupted and
//!   empty-handed turns
//! - [`UsageWindow`]: advisory rolling-minute request/token accounting
//!
//! A turn can end four ways (completion, interruption, deadline, lost
//! session) and every one of them returns a usable reply string; raw
//! transport errors never escape `submit_audio`.

#![deny(unsafe_code)]

pub mod client;
pub mod errors;
pub mod extract;
pub mod gemini;
pub mod phrases;
pub mod turn;
pub mod usage;

pub use client::{DisabledLiveClient, LiveClient, LiveEventStream, LiveHandle, LiveSession};
pub use errors::LiveError;
pub use extract::Extractor;
pub use gemini::{GeminiConfig, GeminiLive};
pub use phrases::PhraseBook;
pub use turn::{SubmitOutcome, ToolOutcome, TurnConfig, TurnCoordinator, TurnHooks};
pub use usage::{UsageSnapshot, UsageWindow};
