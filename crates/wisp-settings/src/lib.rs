//! # wisp-settings
//!
//! Layered configuration for the wisp service.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults** — [`WispSettings::default()`]
//! 2. **User file** — `~/.wisp/settings.json` (deep-merged over defaults)
//! 3. **Environment variables** — `WISP_*` overrides (highest priority)
//!
//! There is no process-wide settings singleton: the binary loads once at
//! startup and hands the pieces to the components that need them.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
