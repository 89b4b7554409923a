use chrono::Utc;
use std::sync::{Arc, Mutex};

/// Source of "now" for every time-dependent decision in the engine.
///
/// All core state (window pruning, kill switch expiry, cooldowns) is a pure
/// function of the timestamp this trait returns, so tests can drive the engine
/// with a virtual clock instead of sleeping.
pub trait Clock: Send + Sync {
    /// Current time as unix milliseconds.
    fn now_ms(&self) -> i64;
}

/// Wall-clock implementation used in production.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Controllable clock for deterministic tests.
///
/// Clones share the same underlying time value, so advancing one clone
/// advances all of them.
#[derive(Debug, Clone)]
pub struct MockClock {
    current_ms: Arc<Mutex<i64>>,
}

impl MockClock {
    /// Create a mock clock starting at the given unix-millisecond timestamp.
    pub fn new(start_ms: i64) -> Self {
        Self {
            current_ms: Arc::new(Mutex::new(start_ms)),
        }
    }

    /// Advance the clock by `delta_ms` milliseconds.
    pub fn advance(&self, delta_ms: i64) {
        let mut now = self.current_ms.lock().unwrap();
        *now += delta_ms;
    }

    /// Set the clock to an absolute timestamp.
    pub fn set(&self, ts_ms: i64) {
        let mut now = self.current_ms.lock().unwrap();
        *now = ts_ms;
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> i64 {
        *self.current_ms.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_clock_monotonic_enough() {
        let clock = SystemClock::new();
        let t1 = clock.now_ms();
        let t2 = clock.now_ms();
        assert!(t2 >= t1);
    }

    #[test]
    fn test_mock_clock_advance_and_set() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.now_ms(), 1_000);

        clock.advance(500);
        assert_eq!(clock.now_ms(), 1_500);

        clock.set(10_000);
        assert_eq!(clock.now_ms(), 10_000);

        // Clones share time
        let other = clock.clone();
        other.advance(1);
        assert_eq!(clock.now_ms(), 10_001);
    }
}
