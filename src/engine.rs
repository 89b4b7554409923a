use crate::clock::Clock;
use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::events::{ChannelId, GatewayEvent, GuildId, PrincipalId, UserId, ViolationEvent};
use crate::ports::{AuditLogReader, AuditSink, ModerationExecutor};
use crate::security::{
    ChannelFreezeManager, CommandRateLimiter, EscalationEngine, EscalationReport, EventCorrelator,
    KillSwitch, KillSwitchState, ReclamationDaemon, ReclamationHandle, SlidingWindowTracker,
    ViolationStore,
};
use std::sync::Arc;
use std::time::Duration;

/// The assembled enforcement engine: one instance constructed at startup with
/// injected configuration, clock and collaborators. All tracked state is
/// owned here; there are no ambient globals.
#[derive(Clone)]
pub struct GuardEngine {
    config: Arc<GuardConfig>,
    clock: Arc<dyn Clock>,
    correlator: EventCorrelator,
    escalation: EscalationEngine,
    freeze: ChannelFreezeManager,
    kill_switch: KillSwitch,
    rate_limiter: CommandRateLimiter,
    tracker: SlidingWindowTracker,
    violations: ViolationStore,
}

impl GuardEngine {
    pub fn new(
        config: GuardConfig,
        clock: Arc<dyn Clock>,
        audit: Arc<dyn AuditLogReader>,
        executor: Arc<dyn ModerationExecutor>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let config = Arc::new(config);
        let tracker = SlidingWindowTracker::new(config.clone());
        let violations = ViolationStore::new(config.clone());
        let kill_switch = KillSwitch::new(config.supreme_owner, config.kill_switch_ttl_ms);
        let rate_limiter = CommandRateLimiter::new(config.rate_limit.clone());
        let correlator = EventCorrelator::new(config.clone(), audit);
        let freeze = ChannelFreezeManager::new(executor.clone());
        let escalation = EscalationEngine::new(
            config.clone(),
            clock.clone(),
            tracker.clone(),
            violations.clone(),
            kill_switch.clone(),
            executor,
            sink,
        );

        Self {
            config,
            clock,
            correlator,
            escalation,
            freeze,
            kill_switch,
            rate_limiter,
            tracker,
            violations,
        }
    }

    /// Process one raw gateway event end to end: attribute it, then escalate.
    ///
    /// Returns `None` when the event is untracked or unattributable. Audit
    /// lookup failures are logged and swallowed so one bad event can never
    /// break subsequent event processing.
    pub async fn handle_event(&self, event: &GatewayEvent) -> Option<EscalationReport> {
        let now_ms = self.clock.now_ms();
        match self.correlator.correlate(event, now_ms).await {
            Ok(Some(violation)) => Some(self.escalation.handle_violation(&violation).await),
            Ok(None) => None,
            Err(e) => {
                metrics::counter!("correlation_failures_total", 1);
                tracing::warn!(error = %e, guild = event.guild_id(), "event correlation failed");
                None
            }
        }
    }

    /// Feed an already-attributed violation into the escalation engine.
    /// Used by the command layer for moderator-issued warnings.
    pub async fn report_violation(&self, violation: &ViolationEvent) -> EscalationReport {
        self.escalation.handle_violation(violation).await
    }

    /// Reversibly lock a channel down, exempting `exempt_principal`.
    pub async fn freeze_channel(
        &self,
        guild: GuildId,
        channel: ChannelId,
        exempt_principal: PrincipalId,
        reason: &str,
    ) -> Result<(), GuardError> {
        self.freeze
            .freeze(guild, channel, exempt_principal, reason, self.clock.now_ms())
            .await
    }

    /// Restore a frozen channel to its exact pre-freeze overwrite state.
    pub async fn unfreeze_channel(&self, channel: ChannelId) -> Result<(), GuardError> {
        self.freeze.unfreeze(channel).await
    }

    pub fn frozen_channels(&self) -> Vec<ChannelId> {
        self.freeze.frozen_channels()
    }

    pub fn activate_kill_switch(&self, actor: UserId) -> Result<KillSwitchState, GuardError> {
        self.kill_switch.activate(actor, self.clock.now_ms())
    }

    pub fn deactivate_kill_switch(&self, actor: UserId) -> Result<(), GuardError> {
        self.kill_switch.deactivate(actor)
    }

    pub fn kill_switch_active(&self) -> bool {
        self.kill_switch.is_active(self.clock.now_ms())
    }

    /// Throttle guard for command-invocation paths.
    pub fn check_command_rate(&self, actor: UserId, command: &str) -> Result<(), GuardError> {
        self.rate_limiter
            .check_and_record(actor, command, self.clock.now_ms())
    }

    /// Start the periodic reclamation sweeper at the configured interval.
    pub fn spawn_reclamation(&self) -> ReclamationHandle {
        let daemon = ReclamationDaemon::new(
            self.clock.clone(),
            self.tracker.clone(),
            self.rate_limiter.clone(),
            self.violations.clone(),
            self.kill_switch.clone(),
        );
        daemon.spawn(Duration::from_millis(self.config.sweep_interval_ms as u64))
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }
}
