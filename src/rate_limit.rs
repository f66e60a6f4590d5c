//! rate_limit.rs — per-IP submission throttle over a sliding window.
//!
//! The counter storage is an injected trait, not a process-wide
//! singleton, so unit tests stay deterministic and the storage
//! collaborator can supply its own (e.g. Redis-backed) implementation.
//!
//! Failure policy: a broken counter store fails OPEN; we would rather
//! let a burst through than block legitimate traffic on an
//! infrastructure hiccup.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::warn;

/// Counter storage seam. One active window per key; an increment on an
/// expired window starts a fresh one at 1.
pub trait CounterStore: Send + Sync {
    /// Increment the counter for `key` within `window` and return the
    /// count after the increment.
    fn incr(&self, key: &str, window: Duration) -> anyhow::Result<u32>;
}

#[derive(Debug)]
struct RateWindow {
    count: u32,
    expires_at: Instant,
}

/// In-memory counter store. Windows are evicted lazily on touch, plus an
/// opportunistic sweep once the map grows past a soft cap.
#[derive(Debug, Default)]
pub struct MemoryCounterStore {
    windows: Mutex<HashMap<String, RateWindow>>,
}

const SWEEP_THRESHOLD: usize = 1024;

impl MemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CounterStore for MemoryCounterStore {
    fn incr(&self, key: &str, window: Duration) -> anyhow::Result<u32> {
        let now = Instant::now();
        let mut map = self.windows.lock().expect("counter store mutex poisoned");

        if map.len() > SWEEP_THRESHOLD {
            map.retain(|_, w| w.expires_at > now);
        }

        let entry = map.entry(key.to_string()).or_insert(RateWindow {
            count: 0,
            expires_at: now + window,
        });
        if entry.expires_at <= now {
            entry.count = 0;
            entry.expires_at = now + window;
        }
        entry.count = entry.count.saturating_add(1);
        Ok(entry.count)
    }
}

/// Per-IP rate limiter: at most `max_submissions` per `window`.
pub struct RateLimiter {
    store: Box<dyn CounterStore>,
    window: Duration,
    max_submissions: u32,
}

impl RateLimiter {
    pub fn new(store: Box<dyn CounterStore>, window: Duration, max_submissions: u32) -> Self {
        Self {
            store,
            window,
            max_submissions: max_submissions.max(1),
        }
    }

    pub fn in_memory(window: Duration, max_submissions: u32) -> Self {
        Self::new(Box::new(MemoryCounterStore::new()), window, max_submissions)
    }

    /// Record one submission from `ip` and report whether it is within
    /// the limit. Store errors fail open.
    pub fn allow(&self, ip: &str) -> bool {
        match self.store.incr(ip, self.window) {
            Ok(count) => count <= self.max_submissions,
            Err(e) => {
                warn!(ip, error = %e, "rate-limit counter store unavailable; failing open");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fourth_call_in_window_is_blocked() {
        let rl = RateLimiter::in_memory(Duration::from_secs(60), 3);
        assert!(rl.allow("198.51.100.1"));
        assert!(rl.allow("198.51.100.1"));
        assert!(rl.allow("198.51.100.1"));
        assert!(!rl.allow("198.51.100.1"));
        // A different IP has its own window.
        assert!(rl.allow("198.51.100.2"));
    }

    #[test]
    fn window_expiry_resets_the_counter() {
        let rl = RateLimiter::in_memory(Duration::from_millis(80), 2);
        assert!(rl.allow("198.51.100.3"));
        assert!(rl.allow("198.51.100.3"));
        assert!(!rl.allow("198.51.100.3"));

        std::thread::sleep(Duration::from_millis(120));
        // Window expired: counter restarts at 1.
        assert!(rl.allow("198.51.100.3"));
        assert!(rl.allow("198.51.100.3"));
        assert!(!rl.allow("198.51.100.3"));
    }

    struct BrokenStore;
    impl CounterStore for BrokenStore {
        fn incr(&self, _key: &str, _window: Duration) -> anyhow::Result<u32> {
            anyhow::bail!("store down")
        }
    }

    #[test]
    fn store_failure_fails_open() {
        let rl = RateLimiter::new(Box::new(BrokenStore), Duration::from_secs(60), 1);
        assert!(rl.allow("198.51.100.4"));
        assert!(rl.allow("198.51.100.4"));
    }
}
