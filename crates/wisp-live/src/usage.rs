//! Rolling-minute usage accounting.
//!
//! Tracks request and token counts over a sliding 60-second window and
//! reports remaining-capacity percentages. Strictly advisory: nothing
//! here ever blocks a turn or returns an error, it only feeds logs and
//! the health endpoint.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Width of the sliding window.
pub const USAGE_WINDOW: Duration = Duration::from_secs(60);

/// Point-in-time usage view.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageSnapshot {
    /// Requests started inside the window.
    pub requests_in_window: usize,
    /// Tokens reported inside the window.
    pub tokens_in_window: u64,
    /// Remaining request capacity, 0.0 to 100.0.
    pub request_headroom_pct: f64,
    /// Remaining token capacity, 0.0 to 100.0.
    pub token_headroom_pct: f64,
}

struct WindowInner {
    requests: VecDeque<Instant>,
    tokens: VecDeque<(Instant, u64)>,
}

/// Sliding-window request/token counter.
pub struct UsageWindow {
    request_limit: u32,
    token_limit: u64,
    inner: Mutex<WindowInner>,
}

impl UsageWindow {
    /// Create a window against per-minute limits. A zero limit means
    /// "no limit" and reports full headroom.
    #[must_use]
    pub fn new(request_limit: u32, token_limit: u64) -> Self {
        Self {
            request_limit,
            token_limit,
            inner: Mutex::new(WindowInner {
                requests: VecDeque::new(),
                tokens: VecDeque::new(),
            }),
        }
    }

    /// Record one request starting now.
    pub fn record_request(&self) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        prune(&mut inner, now);
        inner.requests.push_back(now);
    }

    /// Record tokens reported by usage metadata.
    pub fn record_tokens(&self, tokens: u64) {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        prune(&mut inner, now);
        inner.tokens.push_back((now, tokens));
    }

    /// Current window contents and headroom.
    pub fn snapshot(&self) -> UsageSnapshot {
        let now = Instant::now();
        let mut inner = self.inner.lock();
        prune(&mut inner, now);
        let requests = inner.requests.len();
        let tokens: u64 = inner.tokens.iter().map(|(_, n)| n).sum();
        UsageSnapshot {
            requests_in_window: requests,
            tokens_in_window: tokens,
            request_headroom_pct: headroom(requests as f64, f64::from(self.request_limit)),
            token_headroom_pct: headroom(tokens as f64, self.token_limit as f64),
        }
    }
}

fn prune(inner: &mut WindowInner, now: Instant) {
    while inner
        .requests
        .front()
        .is_some_and(|t| now.duration_since(*t) > USAGE_WINDOW)
    {
        let _ = inner.requests.pop_front();
    }
    while inner
        .tokens
        .front()
        .is_some_and(|(t, _)| now.duration_since(*t) > USAGE_WINDOW)
    {
        let _ = inner.tokens.pop_front();
    }
}

fn headroom(used: f64, limit: f64) -> f64 {
    if limit <= 0.0 {
        return 100.0;
    }
    ((1.0 - used / limit) * 100.0).clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn counts_inside_window() {
        let window = UsageWindow::new(10, 1_000);
        window.record_request();
        window.record_request();
        window.record_tokens(250);
        let snap = window.snapshot();
        assert_eq!(snap.requests_in_window, 2);
        assert_eq!(snap.tokens_in_window, 250);
        assert!((snap.request_headroom_pct - 80.0).abs() < f64::EPSILON);
        assert!((snap.token_headroom_pct - 75.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn old_entries_fall_out() {
        let window = UsageWindow::new(10, 1_000);
        window.record_request();
        window.record_tokens(500);
        tokio::time::advance(Duration::from_secs(61)).await;
        window.record_request();
        let snap = window.snapshot();
        assert_eq!(snap.requests_in_window, 1);
        assert_eq!(snap.tokens_in_window, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn headroom_floors_at_zero() {
        let window = UsageWindow::new(2, 100);
        for _ in 0..5 {
            window.record_request();
        }
        window.record_tokens(500);
        let snap = window.snapshot();
        assert!((snap.request_headroom_pct - 0.0).abs() < f64::EPSILON);
        assert!((snap.token_headroom_pct - 0.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_means_unlimited() {
        let window = UsageWindow::new(0, 0);
        window.record_request();
        window.record_tokens(1_000_000);
        let snap = window.snapshot();
        assert!((snap.request_headroom_pct - 100.0).abs() < f64::EPSILON);
        assert!((snap.token_headroom_pct - 100.0).abs() < f64::EPSILON);
    }
}
