use crate::config::RateLimitConfig;
use crate::error::GuardError;
use crate::events::UserId;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct ActorBucket {
    /// Timestamps of every invocation (any command type) inside the window.
    invocations: VecDeque<i64>,
    /// Last invocation timestamp per command type, for cooldown enforcement.
    last_by_command: HashMap<String, i64>,
}

/// Per-actor command throttle enforcing two constraints at once:
/// at most `max_per_window` invocations of any type inside the rolling
/// window, and at least `cooldown_ms` between two invocations of the same
/// type. Check and record happen in one critical section so two concurrent
/// invocations cannot both pass on a stale count.
#[derive(Clone)]
pub struct CommandRateLimiter {
    config: RateLimitConfig,
    buckets: Arc<Mutex<HashMap<UserId, ActorBucket>>>,
}

impl CommandRateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            buckets: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Check the limits for `actor` invoking `command` and, if allowed,
    /// record the invocation as part of the same call.
    ///
    /// # Returns
    /// `Ok(())` when allowed; `GuardError::RateLimited` with a positive
    /// `retry_after_ms` otherwise.
    pub fn check_and_record(
        &self,
        actor: UserId,
        command: &str,
        now_ms: i64,
    ) -> Result<(), GuardError> {
        if self.config.exempt.contains(&actor) {
            return Ok(());
        }

        let mut buckets = self.buckets.lock().unwrap();
        let bucket = buckets.entry(actor).or_default();

        // Roll the window forward before counting
        let cutoff = now_ms - self.config.window_ms;
        while let Some(front) = bucket.invocations.front() {
            if *front < cutoff {
                bucket.invocations.pop_front();
            } else {
                break;
            }
        }

        let mut retry_after_ms: i64 = 0;

        if bucket.invocations.len() >= self.config.max_per_window {
            if let Some(oldest) = bucket.invocations.front() {
                // Retention keeps an entry through `oldest + window_ms`
                // inclusive, so the earliest admissible instant is one
                // millisecond past that. A retained oldest always yields a
                // positive value here.
                retry_after_ms =
                    retry_after_ms.max(oldest + self.config.window_ms + 1 - now_ms);
            }
        }

        if let Some(last) = bucket.last_by_command.get(command) {
            let elapsed = now_ms - last;
            if elapsed < self.config.cooldown_ms {
                retry_after_ms = retry_after_ms.max(self.config.cooldown_ms - elapsed);
            }
        }

        if retry_after_ms > 0 {
            return Err(GuardError::RateLimited { retry_after_ms });
        }

        bucket.invocations.push_back(now_ms);
        bucket.last_by_command.insert(command.to_string(), now_ms);
        Ok(())
    }

    /// Drop expired invocation history; removes buckets with nothing left in
    /// the window and no cooldown still in effect. Used by the sweep.
    pub fn prune_all(&self, now_ms: i64) {
        let window_cutoff = now_ms - self.config.window_ms;
        let cooldown_cutoff = now_ms - self.config.cooldown_ms;
        let mut buckets = self.buckets.lock().unwrap();
        buckets.retain(|_, bucket| {
            while let Some(front) = bucket.invocations.front() {
                if *front < window_cutoff {
                    bucket.invocations.pop_front();
                } else {
                    break;
                }
            }
            bucket
                .last_by_command
                .retain(|_, last| *last >= cooldown_cutoff);
            !bucket.invocations.is_empty() || !bucket.last_by_command.is_empty()
        });
    }

    /// Number of live buckets (for observability).
    pub fn tracked_actors(&self) -> usize {
        self.buckets.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter() -> CommandRateLimiter {
        CommandRateLimiter::new(RateLimitConfig {
            max_per_window: 10,
            window_ms: 60_000,
            cooldown_ms: 3_000,
            exempt: [999].into_iter().collect(),
        })
    }

    #[test]
    fn test_eleventh_call_in_window_rejected() {
        let limiter = limiter();
        // Space calls out past the cooldown but inside the window
        for i in 0..10 {
            assert!(limiter.check_and_record(1, "status", i * 4_000).is_ok());
        }
        let err = limiter.check_and_record(1, "status", 40_000).unwrap_err();
        match err {
            GuardError::RateLimited { retry_after_ms } => assert!(retry_after_ms > 0),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_window_edge_entry_still_counts() {
        let limiter = limiter();
        // Fill the bucket with distinct command types so only the shared
        // window constrains the next call.
        for i in 0..10i64 {
            assert!(limiter.check_and_record(1, &format!("cmd{i}"), i).is_ok());
        }
        // At exactly oldest + window the oldest invocation has not aged
        // out yet, so the bucket is still full.
        let err = limiter.check_and_record(1, "late", 60_000).unwrap_err();
        match err {
            GuardError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 1),
            other => panic!("unexpected error: {other:?}"),
        }
        // One millisecond later the oldest entry expires.
        assert!(limiter.check_and_record(1, "late", 60_001).is_ok());
    }

    #[test]
    fn test_window_rollover_allows_again() {
        let limiter = limiter();
        for i in 0..10 {
            limiter.check_and_record(1, "status", i * 4_000).unwrap();
        }
        assert!(limiter.check_and_record(1, "status", 40_000).is_err());
        // First invocation (t=0) leaves the window at t=60_000
        assert!(limiter.check_and_record(1, "status", 60_001).is_ok());
    }

    #[test]
    fn test_same_type_cooldown() {
        let limiter = limiter();
        limiter.check_and_record(1, "warn", 0).unwrap();
        let err = limiter.check_and_record(1, "warn", 1_000).unwrap_err();
        match err {
            GuardError::RateLimited { retry_after_ms } => assert_eq!(retry_after_ms, 2_000),
            other => panic!("unexpected error: {other:?}"),
        }
        // Different command type is only bound by the shared window
        assert!(limiter.check_and_record(1, "status", 1_000).is_ok());
        // Cooldown elapsed
        assert!(limiter.check_and_record(1, "warn", 3_000).is_ok());
    }

    #[test]
    fn test_rejected_call_not_recorded() {
        let limiter = limiter();
        limiter.check_and_record(1, "warn", 0).unwrap();
        assert!(limiter.check_and_record(1, "warn", 100).is_err());
        // The rejected call must not have refreshed the cooldown
        assert!(limiter.check_and_record(1, "warn", 3_000).is_ok());
    }

    #[test]
    fn test_exempt_actor_bypasses() {
        let limiter = limiter();
        for _ in 0..100 {
            assert!(limiter.check_and_record(999, "status", 0).is_ok());
        }
    }

    #[test]
    fn test_actors_independent() {
        let limiter = limiter();
        limiter.check_and_record(1, "warn", 0).unwrap();
        assert!(limiter.check_and_record(2, "warn", 0).is_ok());
    }

    #[test]
    fn test_prune_all_drops_idle_buckets() {
        let limiter = limiter();
        limiter.check_and_record(1, "warn", 0).unwrap();
        assert_eq!(limiter.tracked_actors(), 1);
        limiter.prune_all(61_000);
        assert_eq!(limiter.tracked_actors(), 0);
    }
}
