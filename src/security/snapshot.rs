use crate::error::GuardError;
use crate::events::{ChannelId, GuildId, PrincipalId};
use crate::ports::{ModerationExecutor, OverwriteState};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Captured pre-freeze overwrite state for one channel.
///
/// At most one live snapshot exists per channel; it is created by `freeze`
/// and consumed by the matching `unfreeze`.
#[derive(Debug, Clone)]
pub struct PermissionSnapshot {
    pub channel: ChannelId,
    pub exempt: PrincipalId,
    /// Exact prior state per principal: explicit allow, explicit deny, or no
    /// override at all. Replayed verbatim on unfreeze.
    pub prior: HashMap<PrincipalId, OverwriteState>,
    pub frozen_at_ms: i64,
    pub reason: String,
}

/// Reversible channel lockdown with exact permission restoration.
///
/// Freeze and unfreeze on the same channel are serialized through a
/// per-channel async lock so interleaved calls can never corrupt a snapshot.
#[derive(Clone)]
pub struct ChannelFreezeManager {
    executor: Arc<dyn ModerationExecutor>,
    snapshots: Arc<Mutex<HashMap<ChannelId, PermissionSnapshot>>>,
    locks: Arc<Mutex<HashMap<ChannelId, Arc<tokio::sync::Mutex<()>>>>>,
}

impl ChannelFreezeManager {
    pub fn new(executor: Arc<dyn ModerationExecutor>) -> Self {
        Self {
            executor,
            snapshots: Arc::new(Mutex::new(HashMap::new())),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn channel_lock(&self, channel: ChannelId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap();
        locks.entry(channel).or_default().clone()
    }

    /// Freeze a channel: capture every relevant principal's exact overwrite
    /// state, then deny send for all of them except `exempt_principal`, which
    /// is explicitly allowed.
    ///
    /// The snapshot is stored before any mutation, so a partially applied
    /// freeze can still be rolled back by `unfreeze`. Individual permission
    /// edits that fail are aggregated into `ActionPartialFailure`.
    pub async fn freeze(
        &self,
        guild: GuildId,
        channel: ChannelId,
        exempt_principal: PrincipalId,
        reason: &str,
        now_ms: i64,
    ) -> Result<(), GuardError> {
        let lock = self.channel_lock(channel);
        let _guard = lock.lock().await;

        if self.snapshots.lock().unwrap().contains_key(&channel) {
            return Err(GuardError::FreezeConflict { channel });
        }

        let overwrites = self.executor.send_overwrites(channel).await?;

        let mut prior: HashMap<PrincipalId, OverwriteState> = HashMap::new();
        for ow in &overwrites {
            prior.insert(ow.principal, ow.state);
        }
        // The default/everyone principal (the guild id) and the exemption
        // principal are always part of the snapshot, recorded as Inherit when
        // they had no override before.
        prior.entry(guild).or_insert(OverwriteState::Inherit);
        prior.entry(exempt_principal).or_insert(OverwriteState::Inherit);

        let snapshot = PermissionSnapshot {
            channel,
            exempt: exempt_principal,
            prior: prior.clone(),
            frozen_at_ms: now_ms,
            reason: reason.to_string(),
        };
        self.snapshots.lock().unwrap().insert(channel, snapshot);

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (&principal, _) in prior.iter().filter(|(p, _)| **p != exempt_principal) {
            let step = format!("deny-send:{principal}");
            match self
                .executor
                .set_channel_send_permission(channel, principal, OverwriteState::Deny, reason)
                .await
            {
                Ok(()) => completed.push(step),
                Err(e) => failed.push((step, e.to_string())),
            }
        }
        let exempt_step = format!("allow-send:{exempt_principal}");
        match self
            .executor
            .set_channel_send_permission(channel, exempt_principal, OverwriteState::Allow, reason)
            .await
        {
            Ok(()) => completed.push(exempt_step),
            Err(e) => failed.push((exempt_step, e.to_string())),
        }

        if failed.is_empty() {
            tracing::info!(channel, reason, "channel frozen");
            Ok(())
        } else {
            tracing::warn!(channel, failures = failed.len(), "channel freeze partially failed");
            Err(GuardError::ActionPartialFailure { completed, failed })
        }
    }

    /// Unfreeze a channel: replay the captured three-valued state for every
    /// principal exactly, then delete the snapshot. Principals that had no
    /// override before the freeze end with no override, including the one
    /// touched only to grant the exemption.
    pub async fn unfreeze(&self, channel: ChannelId) -> Result<(), GuardError> {
        let lock = self.channel_lock(channel);
        let _guard = lock.lock().await;

        let snapshot = self
            .snapshots
            .lock()
            .unwrap()
            .remove(&channel)
            .ok_or(GuardError::NotFrozen { channel })?;

        let mut completed = Vec::new();
        let mut failed = Vec::new();
        for (&principal, &state) in &snapshot.prior {
            let step = format!("restore:{principal}");
            match self
                .executor
                .set_channel_send_permission(channel, principal, state, "unfreeze")
                .await
            {
                Ok(()) => completed.push(step),
                Err(e) => failed.push((step, e.to_string())),
            }
        }

        if failed.is_empty() {
            tracing::info!(channel, "channel unfrozen");
            Ok(())
        } else {
            tracing::warn!(channel, failures = failed.len(), "channel unfreeze partially failed");
            Err(GuardError::ActionPartialFailure { completed, failed })
        }
    }

    pub fn is_frozen(&self, channel: ChannelId) -> bool {
        self.snapshots.lock().unwrap().contains_key(&channel)
    }

    /// Channels with a live snapshot.
    pub fn frozen_channels(&self) -> Vec<ChannelId> {
        self.snapshots.lock().unwrap().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::ChannelOverwrite;
    use anyhow::Result;
    use async_trait::async_trait;
    use crate::events::{RoleId, UserId};
    use crate::ports::RoleInfo;

    /// In-memory platform double: holds one channel's overwrites and applies
    /// permission edits to them.
    struct FakePlatform {
        overwrites: Mutex<HashMap<PrincipalId, OverwriteState>>,
    }

    impl FakePlatform {
        fn with(initial: &[(PrincipalId, OverwriteState)]) -> Arc<Self> {
            Arc::new(Self {
                overwrites: Mutex::new(initial.iter().copied().collect()),
            })
        }

        fn state_of(&self, principal: PrincipalId) -> OverwriteState {
            self.overwrites
                .lock()
                .unwrap()
                .get(&principal)
                .copied()
                .unwrap_or(OverwriteState::Inherit)
        }
    }

    #[async_trait]
    impl ModerationExecutor for FakePlatform {
        async fn ban(&self, _: GuildId, _: UserId, _: &str) -> Result<()> {
            Ok(())
        }
        async fn kick(&self, _: GuildId, _: UserId, _: &str) -> Result<()> {
            Ok(())
        }
        async fn timeout(&self, _: GuildId, _: UserId, _: i64, _: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_roles(&self, _: GuildId, _: UserId, _: &[RoleId], _: &str) -> Result<()> {
            Ok(())
        }
        async fn set_channel_send_permission(
            &self,
            _channel: ChannelId,
            principal: PrincipalId,
            state: OverwriteState,
            _reason: &str,
        ) -> Result<()> {
            let mut overwrites = self.overwrites.lock().unwrap();
            match state {
                OverwriteState::Inherit => {
                    overwrites.remove(&principal);
                }
                other => {
                    overwrites.insert(principal, other);
                }
            }
            Ok(())
        }
        async fn lockdown_guild(&self, _: GuildId, _: &str) -> Result<()> {
            Ok(())
        }
        async fn send_overwrites(&self, _: ChannelId) -> Result<Vec<ChannelOverwrite>> {
            Ok(self
                .overwrites
                .lock()
                .unwrap()
                .iter()
                .map(|(&principal, &state)| ChannelOverwrite { principal, state })
                .collect())
        }
        async fn member_roles(&self, _: GuildId, _: UserId) -> Result<Vec<RoleInfo>> {
            Ok(vec![])
        }
        async fn bot_role_position(&self, _: GuildId) -> Result<i32> {
            Ok(100)
        }
    }

    const GUILD: GuildId = 10; // also the everyone principal
    const CHANNEL: ChannelId = 20;
    const STAFF: PrincipalId = 30;
    const ROLE_X: PrincipalId = 40;

    #[tokio::test]
    async fn test_freeze_then_unfreeze_round_trip() {
        // Arbitrary mix: role X allow, role Y deny, everyone and staff absent
        let role_y: PrincipalId = 50;
        let platform = FakePlatform::with(&[
            (ROLE_X, OverwriteState::Allow),
            (role_y, OverwriteState::Deny),
        ]);
        let manager = ChannelFreezeManager::new(platform.clone());

        manager.freeze(GUILD, CHANNEL, STAFF, "raid", 1_000).await.unwrap();

        assert_eq!(platform.state_of(GUILD), OverwriteState::Deny);
        assert_eq!(platform.state_of(ROLE_X), OverwriteState::Deny);
        assert_eq!(platform.state_of(role_y), OverwriteState::Deny);
        assert_eq!(platform.state_of(STAFF), OverwriteState::Allow);

        manager.unfreeze(CHANNEL).await.unwrap();

        // Bit-exact restoration, including "no override" for everyone and staff
        assert_eq!(platform.state_of(GUILD), OverwriteState::Inherit);
        assert_eq!(platform.state_of(ROLE_X), OverwriteState::Allow);
        assert_eq!(platform.state_of(role_y), OverwriteState::Deny);
        assert_eq!(platform.state_of(STAFF), OverwriteState::Inherit);
    }

    #[tokio::test]
    async fn test_double_freeze_conflicts() {
        let platform = FakePlatform::with(&[]);
        let manager = ChannelFreezeManager::new(platform);

        manager.freeze(GUILD, CHANNEL, STAFF, "raid", 0).await.unwrap();
        let err = manager.freeze(GUILD, CHANNEL, STAFF, "raid", 1).await.unwrap_err();
        assert!(matches!(err, GuardError::FreezeConflict { channel: CHANNEL }));
    }

    #[tokio::test]
    async fn test_unfreeze_without_snapshot() {
        let platform = FakePlatform::with(&[]);
        let manager = ChannelFreezeManager::new(platform);
        let err = manager.unfreeze(CHANNEL).await.unwrap_err();
        assert!(matches!(err, GuardError::NotFrozen { channel: CHANNEL }));
    }

    #[tokio::test]
    async fn test_unfreeze_consumes_snapshot() {
        let platform = FakePlatform::with(&[]);
        let manager = ChannelFreezeManager::new(platform);
        manager.freeze(GUILD, CHANNEL, STAFF, "raid", 0).await.unwrap();
        assert!(manager.is_frozen(CHANNEL));
        assert_eq!(manager.frozen_channels(), vec![CHANNEL]);

        manager.unfreeze(CHANNEL).await.unwrap();
        assert!(!manager.is_frozen(CHANNEL));
        assert!(manager.unfreeze(CHANNEL).await.is_err());
    }

    #[tokio::test]
    async fn test_exempt_with_prior_allow_is_restored_to_allow() {
        let platform = FakePlatform::with(&[(STAFF, OverwriteState::Allow)]);
        let manager = ChannelFreezeManager::new(platform.clone());

        manager.freeze(GUILD, CHANNEL, STAFF, "raid", 0).await.unwrap();
        manager.unfreeze(CHANNEL).await.unwrap();
        assert_eq!(platform.state_of(STAFF), OverwriteState::Allow);
    }
}
