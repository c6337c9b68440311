//! Fixed-window rate limiting

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Length of one counting window
pub const WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone)]
struct RateLimitEntry {
    count: u32,
    window_start: Instant,
}

impl RateLimitEntry {
    fn new(now: Instant) -> Self {
        Self {
            count: 1,
            window_start: now,
        }
    }

    fn increment(&mut self) -> u32 {
        self.count = self.count.saturating_add(1);
        self.count
    }

    fn is_expired(&self, now: Instant, window: Duration) -> bool {
        now.saturating_duration_since(self.window_start) >= window
    }
}

/// Per-client counters; a window resets on the first request after it
/// elapses. Process-local.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit_per_window: u32,
    window: Duration,
    entries: Arc<RwLock<HashMap<String, RateLimitEntry>>>,
}

impl RateLimiter {
    pub fn new(limit_per_window: u32) -> Self {
        Self::with_window(limit_per_window, WINDOW)
    }

    pub fn with_window(limit_per_window: u32, window: Duration) -> Self {
        Self {
            limit_per_window,
            window,
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit_per_window
    }

    /// Count a request from `key` and report whether it is admitted
    pub fn check(&self, key: &str) -> bool {
        self.check_at(key, Instant::now())
    }

    /// [`RateLimiter::check`] at an explicit instant
    pub fn check_at(&self, key: &str, now: Instant) -> bool {
        let mut entries = self.entries.write();

        if let Some(entry) = entries.get_mut(key) {
            if entry.is_expired(now, self.window) {
                *entry = RateLimitEntry::new(now);
                self.limit_per_window >= 1
            } else {
                entry.increment() <= self.limit_per_window
            }
        } else {
            entries.insert(key.to_string(), RateLimitEntry::new(now));
            self.limit_per_window >= 1
        }
    }

    /// Requests counted in the current window for `key`
    pub fn status(&self, key: &str) -> (u32, u32) {
        let entries = self.entries.read();
        let count = entries.get(key).map_or(0, |e| e.count);
        (count, self.limit_per_window)
    }

    /// Drop counters whose window has elapsed
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.window;
        self.entries.write().retain(|_, e| !e.is_expired(now, window));
    }

    pub fn tracked_clients(&self) -> usize {
        self.entries.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admits_exactly_n_per_window() {
        let limiter = RateLimiter::new(3);
        let start = Instant::now();

        for _ in 0..3 {
            assert!(limiter.check_at("client", start));
        }
        assert!(!limiter.check_at("client", start + Duration::from_secs(1)));
        assert_eq!(limiter.status("client"), (4, 3));

        // Other clients are counted separately
        assert!(limiter.check_at("other", start));

        // A new window admits again
        assert!(limiter.check_at("client", start + WINDOW));
        assert_eq!(limiter.status("client"), (1, 3));
    }

    #[test]
    fn test_cleanup_drops_expired() {
        let limiter = RateLimiter::with_window(5, Duration::from_millis(0));
        limiter.check("a");
        limiter.check("b");
        limiter.cleanup();
        assert_eq!(limiter.tracked_clients(), 0);
    }

    #[test]
    fn test_zero_limit_rejects() {
        let limiter = RateLimiter::new(0);
        assert!(!limiter.check("client"));
    }
}
