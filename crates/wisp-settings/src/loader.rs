//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`WispSettings::default()`]
//! 2. If `~/.wisp/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `WISP_*` environment overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::WispSettings;

/// Resolve the path to the settings file (`~/.wisp/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".wisp").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<WispSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields the defaults; a file with invalid JSON is an
/// error rather than a silent fallback.
pub fn load_settings_from_path(path: &Path) -> Result<WispSettings> {
    let defaults = serde_json::to_value(WispSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: WispSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are warned about and ignored, falling back to the
/// file/default layer.
pub fn apply_env_overrides(settings: &mut WispSettings) {
    if let Some(v) = read_env_string("WISP_HOST") {
        settings.server.host = v;
    }
    if let Some(v) = read_env_u16("WISP_PORT", 0, 65535) {
        settings.server.port = v;
    }
    if let Some(v) = read_env_usize("WISP_MAX_CONNECTIONS", 1, 10_000) {
        settings.server.max_connections = v;
    }
    if let Some(v) = read_env_u64("WISP_EVICTION_GRACE_SECS", 1, 3600) {
        settings.world.eviction_grace_secs = v;
    }
    if let Some(v) = read_env_u64("WISP_COOLDOWN_SECS", 0, 600) {
        settings.world.cooldown_secs = v;
    }
    if let Some(v) = read_env_u64("WISP_TURN_TIMEOUT_SECS", 5, 600) {
        settings.turn.overall_timeout_secs = v;
    }
    if let Some(v) = read_env_u64("WISP_TURN_IDLE_SECS", 1, 600) {
        settings.turn.idle_timeout_secs = v;
    }
    if let Some(v) = read_env_string("WISP_EXTRACTION") {
        if let Ok(mode) = serde_json::from_value(Value::String(v.to_lowercase())) {
            settings.turn.extraction = mode;
        }
    }
    if let Some(v) = read_env_string("WISP_GEMINI_API_KEY") {
        settings.live.api_key = Some(v);
    }
    if let Some(v) = read_env_string("WISP_LIVE_MODEL") {
        settings.live.model = v;
    }
    if let Some(v) = read_env_string("WISP_LIVE_ENDPOINT") {
        settings.live.endpoint = v;
    }
    if let Some(v) = read_env_f64("WISP_MAX_CLIP_SECS", 0.5, 60.0) {
        settings.audio.max_clip_secs = v;
    }
    if let Some(v) = read_env_string("WISP_LOG") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u16` within a range.
pub fn parse_u16_range(val: &str, min: u16, max: u16) -> Option<u16> {
    let n: u16 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as an `f64` within a range.
pub fn parse_f64_range(val: &str, min: f64, max: f64) -> Option<f64> {
    let n: f64 = val.parse().ok()?;
    (n.is_finite() && n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_u16(name: &str, min: u16, max: u16) -> Option<u16> {
    let val = std::env::var(name).ok()?;
    let result = parse_u16_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u16 env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

fn read_env_f64(name: &str, min: f64, max: f64) -> Option<f64> {
    let val = std::env::var(name).ok()?;
    let result = parse_f64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid f64 env var, ignoring");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.world.eviction_grace_secs, 20);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        let mut f = std::fs::File::create(&path).unwrap();
        write!(
            f,
            r#"{{"world": {{"evictionGraceSecs": 7}}, "live": {{"apiKey": "k"}}}}"#
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.world.eviction_grace_secs, 7);
        assert_eq!(settings.world.cooldown_secs, 5);
        assert_eq!(settings.live.api_key.as_deref(), Some("k"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(load_settings_from_path(&path).is_err());
    }

    #[test]
    fn deep_merge_replaces_primitives() {
        let target = serde_json::json!({"a": 1, "b": {"c": 2, "d": 3}});
        let source = serde_json::json!({"b": {"c": 9}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": {"c": 9, "d": 3}}));
    }

    #[test]
    fn deep_merge_skips_nulls() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged, serde_json::json!({"a": 1, "b": 2}));
    }

    #[test]
    fn parse_u64_respects_range() {
        assert_eq!(parse_u64_range("30", 1, 60), Some(30));
        assert_eq!(parse_u64_range("0", 1, 60), None);
        assert_eq!(parse_u64_range("61", 1, 60), None);
        assert_eq!(parse_u64_range("abc", 1, 60), None);
    }

    #[test]
    fn parse_f64_rejects_non_finite() {
        assert_eq!(parse_f64_range("5.5", 0.5, 60.0), Some(5.5));
        assert_eq!(parse_f64_range("inf", 0.5, 60.0), None);
        assert_eq!(parse_f64_range("0.1", 0.5, 60.0), None);
    }

    #[test]
    fn parse_u16_allows_zero_port() {
        assert_eq!(parse_u16_range("0", 0, 65535), Some(0));
    }
}
