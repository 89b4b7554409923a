use crate::clock::Clock;
use crate::security::kill_switch::KillSwitch;
use crate::security::rate_limiter::CommandRateLimiter;
use crate::security::violations::ViolationStore;
use crate::security::window_tracker::SlidingWindowTracker;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Periodic + lazy expiry of all tracked state.
///
/// Every sweep goes through each component's own locked mutation path, so it
/// can never lose updates against in-flight handlers. Correctness does not
/// depend on the sweep at all: each component also prunes lazily on read and
/// the sweep only bounds idle memory.
#[derive(Clone)]
pub struct ReclamationDaemon {
    clock: Arc<dyn Clock>,
    tracker: SlidingWindowTracker,
    rate_limiter: CommandRateLimiter,
    violations: ViolationStore,
    kill_switch: KillSwitch,
}

/// Handle to a running sweeper task; aborts the task when shut down.
pub struct ReclamationHandle {
    handle: JoinHandle<()>,
}

impl ReclamationHandle {
    pub fn shutdown(self) {
        self.handle.abort();
    }
}

impl ReclamationDaemon {
    pub fn new(
        clock: Arc<dyn Clock>,
        tracker: SlidingWindowTracker,
        rate_limiter: CommandRateLimiter,
        violations: ViolationStore,
        kill_switch: KillSwitch,
    ) -> Self {
        Self {
            clock,
            tracker,
            rate_limiter,
            violations,
            kill_switch,
        }
    }

    /// One full reclamation pass at the given timestamp.
    pub fn sweep(&self, now_ms: i64) {
        self.tracker.prune_all(now_ms);
        self.rate_limiter.prune_all(now_ms);
        self.violations.prune_all(now_ms);
        self.kill_switch.sweep(now_ms);
        metrics::gauge!("tracked_window_keys", self.tracker.tracked_keys() as f64);
        metrics::gauge!("tracked_rate_buckets", self.rate_limiter.tracked_actors() as f64);
        tracing::debug!(
            window_keys = self.tracker.tracked_keys(),
            rate_buckets = self.rate_limiter.tracked_actors(),
            violation_keys = self.violations.tracked_keys(),
            "reclamation sweep complete"
        );
    }

    /// Spawn the fixed-interval sweeper task.
    pub fn spawn(self, interval: Duration) -> ReclamationHandle {
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The immediate first tick would sweep an empty engine
            ticker.tick().await;
            loop {
                ticker.tick().await;
                self.sweep(self.clock.now_ms());
            }
        });
        ReclamationHandle { handle }
    }
}
