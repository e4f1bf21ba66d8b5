//! Canned phrases for turns that end without a clean reply.
//!
//! Two rotating sets: apologies for interrupted turns, and
//! didn't-catch-that fallbacks for turns that time out with nothing to
//! show. Rotation keeps repeated failures from sounding robotic.

use std::sync::atomic::{AtomicUsize, Ordering};

const APOLOGIES: &[&str] = &[
    "Oh, sorry, I lost my train of thought.",
    "Whoops, I got cut off for a second there.",
    "Sorry, where was I?",
    "Ah, never mind, it slipped away.",
];

const FALLBACKS: &[&str] = &[
    "Hm, I didn't quite catch that.",
    "Sorry, could you say that again?",
    "I missed that, one more time?",
    "That one got past me, could you repeat it?",
];

/// Rotating phrase source. Cheap to share behind an `Arc`.
pub struct PhraseBook {
    apologies: &'static [&'static str],
    fallbacks: &'static [&'static str],
    apology_cursor: AtomicUsize,
    fallback_cursor: AtomicUsize,
}

impl Default for PhraseBook {
    fn default() -> Self {
        Self {
            apologies: APOLOGIES,
            fallbacks: FALLBACKS,
            apology_cursor: AtomicUsize::new(0),
            fallback_cursor: AtomicUsize::new(0),
        }
    }
}

impl PhraseBook {
    /// Next apology phrase (interrupted turn).
    pub fn apology(&self) -> &'static str {
        let idx = self.apology_cursor.fetch_add(1, Ordering::Relaxed);
        self.apologies[idx % self.apologies.len()]
    }

    /// Next fallback phrase (turn ended with no usable text).
    pub fn fallback(&self) -> &'static str {
        let idx = self.fallback_cursor.fetch_add(1, Ordering::Relaxed);
        self.fallbacks[idx % self.fallbacks.len()]
    }

    /// Whether `text` is one of the apology phrases.
    #[must_use]
    pub fn is_apology(&self, text: &str) -> bool {
        self.apologies.contains(&text)
    }

    /// Whether `text` is one of the fallback phrases.
    #[must_use]
    pub fn is_fallback(&self, text: &str) -> bool {
        self.fallbacks.contains(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apologies_rotate_and_wrap() {
        let book = PhraseBook::default();
        let first_cycle: Vec<_> = (0..APOLOGIES.len()).map(|_| book.apology()).collect();
        assert_eq!(first_cycle.as_slice(), APOLOGIES);
        // Wraps back to the start
        assert_eq!(book.apology(), APOLOGIES[0]);
    }

    #[test]
    fn fallbacks_rotate_independently() {
        let book = PhraseBook::default();
        let _ = book.apology();
        let _ = book.apology();
        assert_eq!(book.fallback(), FALLBACKS[0]);
        assert_eq!(book.fallback(), FALLBACKS[1]);
    }

    #[test]
    fn membership_checks() {
        let book = PhraseBook::default();
        let a = book.apology();
        assert!(book.is_apology(a));
        assert!(!book.is_fallback(a));
        let f = book.fallback();
        assert!(book.is_fallback(f));
        assert!(!book.is_apology(f));
    }
}
