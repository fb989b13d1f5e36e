//! Clock & Expiry Service (spec.md §4.9): a single authoritative "now" per
//! command invocation, injectable so tests can pin deterministic timestamps
//! for TTL expiry and stream IDs.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Milliseconds since the Unix epoch, the unit every expiry and stream-id
/// computation in this crate works in.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Wall-clock time via `chrono`, used outside of tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// A clock tests can set directly, so TTL expiry and stream IDs are
/// deterministic without sleeping real wall-clock time.
#[derive(Debug, Default)]
pub struct TestClock {
    millis: AtomicU64,
}

impl TestClock {
    pub fn new(start_ms: u64) -> Arc<Self> {
        Arc::new(TestClock {
            millis: AtomicU64::new(start_ms),
        })
    }

    pub fn set(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }

    pub fn advance(&self, delta_ms: u64) {
        self.millis.fetch_add(delta_ms, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_ms(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_is_settable_and_monotonic_on_demand() {
        let clock = TestClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);
        clock.advance(50);
        assert_eq!(clock.now_ms(), 1_050);
        clock.set(5_000);
        assert_eq!(clock.now_ms(), 5_000);
    }
}
