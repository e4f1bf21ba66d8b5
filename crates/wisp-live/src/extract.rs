//! Reply text extraction.
//!
//! The model's transcript arrives as raw fragments whose framing has
//! changed over protocol generations. Two strategies cover both shapes:
//!
//! - [`Extractor::Delimited`]: every fragment is already one clean
//!   speaker turn, so extraction is just normalization.
//! - [`Extractor::Tagged`]: the reply is embedded in a
//!   `[SPEAKER]: "..."` convention. Tags are frequently malformed
//!   (curly quotes, missing quotes, missing brackets), so a ladder of
//!   looser regexes runs before giving up and normalizing the whole
//!   transcript.
//!
//! Strategy choice is configuration; `Delimited` is the default.

use std::sync::LazyLock;

use regex::Regex;

static TAGGED_QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\[SPEAKER\]\s*:\s*"([^"]*)""#).expect("valid regex"));

static TAGGED_CURLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[SPEAKER\]\s*:\s*[“”]([^“”]*)[“”]").expect("valid regex"));

static TAGGED_BARE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)\[SPEAKER\]\s*:\s*(.+)$").expect("valid regex"));

static TAGGED_LOOSE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?im)^\s*speaker\s*:\s*(.+)$").expect("valid regex"));

/// Transcript extraction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Extractor {
    /// Fragments are already per-turn delimited; normalize only.
    #[default]
    Delimited,
    /// Parse the `[SPEAKER]: "..."` convention, with fallbacks.
    Tagged,
}

impl Extractor {
    /// Extract the reply from the accumulated transcript.
    ///
    /// Returns `None` when nothing usable remains after extraction and
    /// normalization; the caller substitutes a canned phrase.
    #[must_use]
    pub fn extract(&self, raw: &str) -> Option<String> {
        let text = match self {
            Self::Delimited => normalize(raw),
            Self::Tagged => extract_tagged(raw),
        };
        (!text.is_empty()).then_some(text)
    }
}

/// Normalize whitespace and quote artifacts.
///
/// Curly quotes become straight, whitespace runs collapse to single
/// spaces, and one layer of wrapping quotes is stripped when the whole
/// reply arrives quoted.
#[must_use]
pub fn normalize(raw: &str) -> String {
    let straightened: String = raw
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            c => c,
        })
        .collect();
    let collapsed = straightened.split_whitespace().collect::<Vec<_>>().join(" ");
    let trimmed = collapsed.trim();
    if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
        trimmed[1..trimmed.len() - 1].trim().to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn extract_tagged(raw: &str) -> String {
    // Exact convention first, then the known malformations in order of
    // how much structure they preserve.
    for pattern in [&TAGGED_QUOTED, &TAGGED_CURLY, &TAGGED_BARE, &TAGGED_LOOSE] {
        let captured: Vec<String> = pattern
            .captures_iter(raw)
            .filter_map(|c| c.get(1))
            .map(|m| normalize(m.as_str()))
            .filter(|s| !s.is_empty())
            .collect();
        if !captured.is_empty() {
            return captured.join(" ");
        }
    }
    normalize(raw)
}
