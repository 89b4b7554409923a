use crate::config::GuardConfig;
use crate::events::{GuildId, UserId, ViolationCategory};
use crate::security::escalation::PunishmentTier;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One recorded violation, with the punishment that was ultimately applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub ts_ms: i64,
    pub reason: String,
    /// Filled in after the escalation decision; `None` when no punitive
    /// action was dispatched (exempt actor or kill switch active).
    pub punishment: Option<PunishmentTier>,
}

type StoreKey = (GuildId, UserId, ViolationCategory);

/// Per (guild, user, category) violation history. Drives tier lookup.
///
/// Retention is per item, not per key: nuke-type categories keep minutes of
/// history, generic warnings keep 90 days, and a key is deleted only once
/// every record in it has aged out.
#[derive(Clone)]
pub struct ViolationStore {
    config: Arc<GuardConfig>,
    records: Arc<Mutex<HashMap<StoreKey, Vec<ViolationRecord>>>>,
}

impl ViolationStore {
    pub fn new(config: Arc<GuardConfig>) -> Self {
        Self {
            config,
            records: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Append a violation and return the retained count, as one atomic step.
    pub fn record_and_count(
        &self,
        guild: GuildId,
        actor: UserId,
        category: ViolationCategory,
        now_ms: i64,
        reason: &str,
    ) -> usize {
        let retention_ms = self.config.retention_ms(category);
        let mut records = self.records.lock().unwrap();
        let history = records.entry((guild, actor, category)).or_default();
        history.retain(|r| now_ms - r.ts_ms <= retention_ms);
        history.push(ViolationRecord {
            ts_ms: now_ms,
            reason: reason.to_string(),
            punishment: None,
        });
        history.len()
    }

    /// Record the punishment applied for the most recent violation of a key.
    pub fn mark_last_punishment(
        &self,
        guild: GuildId,
        actor: UserId,
        category: ViolationCategory,
        punishment: PunishmentTier,
    ) {
        let mut records = self.records.lock().unwrap();
        if let Some(history) = records.get_mut(&(guild, actor, category)) {
            if let Some(last) = history.last_mut() {
                last.punishment = Some(punishment);
            }
        }
    }

    /// Count of retained violations for a key.
    pub fn count(
        &self,
        guild: GuildId,
        actor: UserId,
        category: ViolationCategory,
        now_ms: i64,
    ) -> usize {
        let retention_ms = self.config.retention_ms(category);
        let mut records = self.records.lock().unwrap();
        match records.get_mut(&(guild, actor, category)) {
            Some(history) => {
                history.retain(|r| now_ms - r.ts_ms <= retention_ms);
                history.len()
            }
            None => 0,
        }
    }

    /// Filter every key down to its retention horizon, deleting keys that end
    /// up empty. Used by the reclamation sweep.
    pub fn prune_all(&self, now_ms: i64) {
        let mut records = self.records.lock().unwrap();
        records.retain(|(_, _, category), history| {
            let retention_ms = self.config.retention_ms(*category);
            history.retain(|r| now_ms - r.ts_ms <= retention_ms);
            !history.is_empty()
        });
    }

    /// Number of live keys (for observability).
    pub fn tracked_keys(&self) -> usize {
        self.records.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ViolationStore {
        ViolationStore::new(Arc::new(GuardConfig::default()))
    }

    #[test]
    fn test_record_and_count() {
        let store = store();
        assert_eq!(
            store.record_and_count(1, 2, ViolationCategory::InviteSpam, 0, "invite spam"),
            1
        );
        assert_eq!(
            store.record_and_count(1, 2, ViolationCategory::InviteSpam, 1_000, "invite spam"),
            2
        );
        // Different category is a different key
        assert_eq!(
            store.record_and_count(1, 2, ViolationCategory::Warning, 1_000, "rude"),
            1
        );
    }

    #[test]
    fn test_per_item_retention() {
        let store = store();
        let retention = ViolationCategory::InviteSpam.retention_ms();
        store.record_and_count(1, 2, ViolationCategory::InviteSpam, 0, "spam");
        store.record_and_count(1, 2, ViolationCategory::InviteSpam, retention / 2, "spam");

        // First record aged out, second survives
        let count = store.count(1, 2, ViolationCategory::InviteSpam, retention + 1);
        assert_eq!(count, 1);
    }

    #[test]
    fn test_mark_last_punishment() {
        let store = store();
        store.record_and_count(1, 2, ViolationCategory::InviteSpam, 0, "spam");
        store.mark_last_punishment(1, 2, ViolationCategory::InviteSpam, PunishmentTier::Warn);

        let records = store.records.lock().unwrap();
        let history = records.get(&(1, 2, ViolationCategory::InviteSpam)).unwrap();
        assert_eq!(history.last().unwrap().punishment, Some(PunishmentTier::Warn));
    }

    #[test]
    fn test_prune_all_deletes_only_empty_keys() {
        let store = store();
        let retention = ViolationCategory::MassBan.retention_ms();
        store.record_and_count(1, 2, ViolationCategory::MassBan, 0, "ban wave");
        store.record_and_count(1, 3, ViolationCategory::Warning, 0, "warned");
        assert_eq!(store.tracked_keys(), 2);

        store.prune_all(retention + 1);
        // MassBan history aged out, the 90-day warning did not
        assert_eq!(store.tracked_keys(), 1);
        assert_eq!(store.count(1, 3, ViolationCategory::Warning, retention + 1), 1);
    }
}
