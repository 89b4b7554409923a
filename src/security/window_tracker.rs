use crate::config::GuardConfig;
use crate::events::{GuildId, UserId, ViolationCategory};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

/// Key for one tracked event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedKey {
    pub guild: GuildId,
    pub actor: UserId,
    pub category: ViolationCategory,
}

#[derive(Debug, Clone)]
struct WindowEntry {
    ts_ms: i64,
    #[allow(dead_code)]
    evidence: Option<String>,
}

/// Sliding window tracker: bounded per-key event history with count queries.
///
/// Entries are appended in timestamp order and pruned from the front, so each
/// prune costs O(expired entries). Not internally transactional beyond single
/// calls: callers needing increment-then-evaluate must use
/// `record_and_count`, which does both inside one critical section.
#[derive(Clone)]
pub struct SlidingWindowTracker {
    config: Arc<GuardConfig>,
    entries: Arc<Mutex<HashMap<TrackedKey, VecDeque<WindowEntry>>>>,
}

impl SlidingWindowTracker {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        Self {
            config,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record an event and return the count of events still inside the
    /// category window, as one atomic step.
    pub fn record_and_count(
        &self,
        key: TrackedKey,
        now_ms: i64,
        evidence: Option<String>,
    ) -> usize {
        let window_ms = self.config.window_ms(key.category);
        let mut entries = self.entries.lock().unwrap();
        let history = entries.entry(key).or_default();
        Self::prune_front(history, now_ms, window_ms);
        history.push_back(WindowEntry {
            ts_ms: now_ms,
            evidence,
        });
        history.len()
    }

    /// Count events within the category window, pruning expired ones first.
    pub fn count(&self, key: &TrackedKey, now_ms: i64) -> usize {
        let window_ms = self.config.window_ms(key.category);
        let mut entries = self.entries.lock().unwrap();
        match entries.get_mut(key) {
            Some(history) => {
                Self::prune_front(history, now_ms, window_ms);
                history.len()
            }
            None => 0,
        }
    }

    /// Drop all expired entries across every key; removes empty keys.
    /// Used by the reclamation sweep.
    pub fn prune_all(&self, now_ms: i64) {
        let mut entries = self.entries.lock().unwrap();
        entries.retain(|key, history| {
            let window_ms = self.config.window_ms(key.category);
            Self::prune_front(history, now_ms, window_ms);
            !history.is_empty()
        });
    }

    /// Number of live keys (for observability).
    pub fn tracked_keys(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    fn prune_front(history: &mut VecDeque<WindowEntry>, now_ms: i64, window_ms: i64) {
        let cutoff = now_ms - window_ms;
        while let Some(front) = history.front() {
            if front.ts_ms < cutoff {
                history.pop_front();
            } else {
                break;
            }
        }
    }
}
