use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::events::{ViolationCategory, ViolationEvent};
use crate::ports::{ActionRecord, AuditSink, ModerationExecutor};
use crate::security::kill_switch::KillSwitch;
use crate::security::violations::ViolationStore;
use crate::security::window_tracker::{SlidingWindowTracker, TrackedKey};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const MUTE_5M_MS: i64 = 300_000;
const MUTE_30M_MS: i64 = 1_800_000;
const MUTE_2H_MS: i64 = 7_200_000;

/// Punishment applied for one violation, ordered from lightest to heaviest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PunishmentTier {
    Warn,
    Mute { duration_ms: i64 },
    Ban,
}

// Default ladder shared by the rate-based categories: counts beyond the table
// clamp to the last entry, never regressing to a lighter tier.
static DEFAULT_LADDER: Lazy<Vec<PunishmentTier>> = Lazy::new(|| {
    vec![
        PunishmentTier::Warn,
        PunishmentTier::Mute { duration_ms: MUTE_5M_MS },
        PunishmentTier::Mute { duration_ms: MUTE_30M_MS },
        PunishmentTier::Mute { duration_ms: MUTE_2H_MS },
        PunishmentTier::Ban,
    ]
});

// Moderator-issued warnings never auto-escalate past a warn.
static WARNING_LADDER: Lazy<Vec<PunishmentTier>> = Lazy::new(|| vec![PunishmentTier::Warn]);

/// Outcome of processing one violation event.
#[derive(Debug, Clone)]
pub struct EscalationReport {
    pub category: ViolationCategory,
    /// Violation count after this event (the tier input).
    pub count: usize,
    /// Event count inside the category's sliding window (the nuke input).
    pub rate_count: usize,
    pub tier: PunishmentTier,
    pub exempt: bool,
    /// False when the kill switch (or exemption) suppressed dispatch.
    pub dispatched: bool,
    pub steps_completed: Vec<String>,
    pub steps_failed: Vec<(String, String)>,
}

impl EscalationReport {
    /// The aggregated partial-failure error, when any sub-step failed.
    pub fn partial_failure(&self) -> Option<GuardError> {
        if self.steps_failed.is_empty() {
            None
        } else {
            Some(GuardError::ActionPartialFailure {
                completed: self.steps_completed.clone(),
                failed: self.steps_failed.clone(),
            })
        }
    }
}

/// Violation-count to punishment-tier decision plus remediation dispatch.
///
/// Detection (steps 1-3) always runs; the kill switch gates only the
/// punitive dispatch. Every remediation sub-step is attempted independently
/// and failures are aggregated, never silently dropped.
#[derive(Clone)]
pub struct EscalationEngine {
    config: Arc<GuardConfig>,
    clock: Arc<dyn Clock>,
    tracker: SlidingWindowTracker,
    violations: ViolationStore,
    kill_switch: KillSwitch,
    executor: Arc<dyn ModerationExecutor>,
    sink: Arc<dyn AuditSink>,
}

impl EscalationEngine {
    pub fn new(
        config: Arc<GuardConfig>,
        clock: Arc<dyn Clock>,
        tracker: SlidingWindowTracker,
        violations: ViolationStore,
        kill_switch: KillSwitch,
        executor: Arc<dyn ModerationExecutor>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            config,
            clock,
            tracker,
            violations,
            kill_switch,
            executor,
            sink,
        }
    }

    /// Resolve the punishment tier for a category at a given violation count.
    pub fn tier_for(&self, category: ViolationCategory, count: usize) -> PunishmentTier {
        let ladder: &[PunishmentTier] = match self.config.tier_override(category) {
            Some(tiers) if !tiers.is_empty() => tiers,
            _ => match category {
                ViolationCategory::Warning => WARNING_LADDER.as_slice(),
                _ => DEFAULT_LADDER.as_slice(),
            },
        };
        let index = count.saturating_sub(1).min(ladder.len() - 1);
        ladder[index]
    }

    /// Process one attributed violation through detection, tier decision and
    /// (unless exempt or killed) remediation dispatch.
    pub async fn handle_violation(&self, violation: &ViolationEvent) -> EscalationReport {
        let now_ms = self.clock.now_ms();
        let reason = violation
            .evidence
            .as_deref()
            .map(|e| format!("{:?}: {e}", violation.category))
            .unwrap_or_else(|| format!("{:?}", violation.category));

        let exempt = self.is_exempt(violation).await;

        // Increment-then-evaluate: both counters are bumped and read inside
        // one critical section each, so two concurrent violations can never
        // observe the same stale count across a suspension point.
        let key = TrackedKey {
            guild: violation.guild_id,
            actor: violation.actor_id,
            category: violation.category,
        };
        let rate_count = self
            .tracker
            .record_and_count(key, now_ms, violation.evidence.clone());
        let count = self.violations.record_and_count(
            violation.guild_id,
            violation.actor_id,
            violation.category,
            now_ms,
            &reason,
        );

        metrics::counter!("violations_detected_total", 1);
        if let Err(e) = self.sink.record_violation(violation, count).await {
            tracing::warn!(error = %e, "audit sink rejected violation record");
        }

        let tier = self.tier_for(violation.category, count);
        let mut report = EscalationReport {
            category: violation.category,
            count,
            rate_count,
            tier,
            exempt,
            dispatched: false,
            steps_completed: Vec::new(),
            steps_failed: Vec::new(),
        };

        if exempt {
            tracing::info!(
                guild = violation.guild_id,
                actor = violation.actor_id,
                category = ?violation.category,
                count,
                "violation by exempt actor, logged only"
            );
            return report;
        }

        if self.kill_switch.is_active(now_ms) {
            tracing::warn!(
                guild = violation.guild_id,
                actor = violation.actor_id,
                category = ?violation.category,
                "kill switch active, punitive dispatch suppressed"
            );
            return report;
        }

        report.dispatched = true;
        metrics::counter!("actions_dispatched_total", 1);

        if violation.category == ViolationCategory::PrivilegeEscalation {
            self.neutralize(violation, &reason, now_ms, &mut report).await;
        } else {
            self.apply_tier(violation, tier, &reason, now_ms, &mut report).await;
            let threshold = self.config.nuke_threshold(violation.category);
            if violation.category.is_nuke() && rate_count >= threshold {
                self.contain(violation, &reason, now_ms, &mut report).await;
            }
        }

        self.violations.mark_last_punishment(
            violation.guild_id,
            violation.actor_id,
            violation.category,
            tier,
        );

        if let Some(err) = report.partial_failure() {
            tracing::warn!(error = %err, "remediation partially failed");
        }
        report
    }

    /// Exemption check: guild owner, supreme owner, configured protected
    /// list, staff role. A failed role lookup counts as not exempt; the
    /// platform still refuses actions against members above the engine's
    /// hierarchy position.
    async fn is_exempt(&self, violation: &ViolationEvent) -> bool {
        let actor = violation.actor_id;
        if actor == self.config.supreme_owner
            || self.config.is_guild_owner(violation.guild_id, actor)
            || self.config.protected_users.contains(&actor)
        {
            return true;
        }
        if let Some(staff_role) = self.config.staff_role {
            match self.executor.member_roles(violation.guild_id, actor).await {
                Ok(roles) => return roles.iter().any(|r| r.id == staff_role),
                Err(e) => {
                    tracing::warn!(actor, error = %e, "role lookup failed during exemption check");
                }
            }
        }
        false
    }

    /// Dispatch the tier punishment for a non-privilege-escalation violation.
    async fn apply_tier(
        &self,
        violation: &ViolationEvent,
        tier: PunishmentTier,
        reason: &str,
        now_ms: i64,
        report: &mut EscalationReport,
    ) {
        match tier {
            PunishmentTier::Warn => {
                // A warning is pure observability: the sink record is the action.
                self.record_step(violation, "warn", reason, now_ms, Ok(()), report)
                    .await;
            }
            PunishmentTier::Mute { duration_ms } => {
                let result = self
                    .executor
                    .timeout(violation.guild_id, violation.actor_id, duration_ms, reason)
                    .await;
                self.record_step(violation, "timeout", reason, now_ms, result, report)
                    .await;
            }
            PunishmentTier::Ban => {
                let result = self
                    .executor
                    .ban(violation.guild_id, violation.actor_id, reason)
                    .await;
                self.record_step(violation, "ban", reason, now_ms, result, report)
                    .await;
            }
        }
    }

    /// Containment for a nuke-rate actor: ban attempt and guild-wide send
    /// lockdown, run concurrently and recorded independently. A denied ban
    /// (hierarchy) is a logged failure, not an abort.
    async fn contain(
        &self,
        violation: &ViolationEvent,
        reason: &str,
        now_ms: i64,
        report: &mut EscalationReport,
    ) {
        metrics::counter!("lockdowns_total", 1);
        let (ban_result, lockdown_result) = futures::future::join(
            self.executor
                .ban(violation.guild_id, violation.actor_id, reason),
            self.executor.lockdown_guild(violation.guild_id, reason),
        )
        .await;
        self.record_step(violation, "containment-ban", reason, now_ms, ban_result, report)
            .await;
        self.record_step(
            violation,
            "guild-lockdown",
            reason,
            now_ms,
            lockdown_result,
            report,
        )
        .await;
    }

    /// Neutralize a privilege-escalation actor: revert the specific grant,
    /// strip every role below the engine's hierarchy position, then apply the
    /// fixed-duration timeout. Re-triggering while already neutralized resets
    /// the timeout rather than stacking it. Preserves an appeal path where a
    /// ban would not.
    async fn neutralize(
        &self,
        violation: &ViolationEvent,
        reason: &str,
        now_ms: i64,
        report: &mut EscalationReport,
    ) {
        if !violation.granted_roles.is_empty() {
            let result = self
                .executor
                .remove_roles(
                    violation.guild_id,
                    violation.actor_id,
                    &violation.granted_roles,
                    reason,
                )
                .await;
            self.record_step(violation, "revert-grant", reason, now_ms, result, report)
                .await;
        }

        let strip_result = match futures::future::join(
            self.executor.member_roles(violation.guild_id, violation.actor_id),
            self.executor.bot_role_position(violation.guild_id),
        )
        .await
        {
            (Ok(roles), Ok(bot_position)) => {
                let strippable: Vec<_> = roles
                    .iter()
                    .filter(|r| r.position < bot_position)
                    .map(|r| r.id)
                    .collect();
                if strippable.is_empty() {
                    Ok(())
                } else {
                    self.executor
                        .remove_roles(violation.guild_id, violation.actor_id, &strippable, reason)
                        .await
                }
            }
            (Err(e), _) | (_, Err(e)) => Err(e),
        };
        self.record_step(violation, "strip-roles", reason, now_ms, strip_result, report)
            .await;

        let timeout_result = self
            .executor
            .timeout(
                violation.guild_id,
                violation.actor_id,
                self.config.neutralize_timeout_ms,
                reason,
            )
            .await;
        self.record_step(violation, "neutralize-timeout", reason, now_ms, timeout_result, report)
            .await;
    }

    /// Record one attempted sub-step in the report and the audit sink.
    async fn record_step(
        &self,
        violation: &ViolationEvent,
        action: &str,
        reason: &str,
        now_ms: i64,
        result: anyhow::Result<()>,
        report: &mut EscalationReport,
    ) {
        let record = ActionRecord {
            guild_id: violation.guild_id,
            target_id: violation.actor_id,
            action: action.to_string(),
            reason: reason.to_string(),
            success: result.is_ok(),
            detail: result.as_ref().err().map(|e| e.to_string()),
            ts_ms: now_ms,
        };
        match result {
            Ok(()) => report.steps_completed.push(action.to_string()),
            Err(e) => report.steps_failed.push((action.to_string(), e.to_string())),
        }
        if let Err(e) = self.sink.record_action(&record).await {
            tracing::warn!(action, error = %e, "audit sink rejected action record");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invite_spam_ladder_is_monotonic() {
        let engine_tiers: Vec<PunishmentTier> = (1usize..=7)
            .map(|count| {
                let ladder = &*DEFAULT_LADDER;
                let index = count.saturating_sub(1).min(ladder.len() - 1);
                ladder[index]
            })
            .collect();
        assert_eq!(engine_tiers[0], PunishmentTier::Warn);
        assert_eq!(engine_tiers[1], PunishmentTier::Mute { duration_ms: MUTE_5M_MS });
        assert_eq!(engine_tiers[2], PunishmentTier::Mute { duration_ms: MUTE_30M_MS });
        assert_eq!(engine_tiers[3], PunishmentTier::Mute { duration_ms: MUTE_2H_MS });
        assert_eq!(engine_tiers[4], PunishmentTier::Ban);
        // Clamped, never regressing
        assert_eq!(engine_tiers[5], PunishmentTier::Ban);
        assert_eq!(engine_tiers[6], PunishmentTier::Ban);
    }

    #[test]
    fn test_warning_ladder_never_escalates() {
        assert_eq!(WARNING_LADDER.len(), 1);
        assert_eq!(WARNING_LADDER[0], PunishmentTier::Warn);
    }
}
