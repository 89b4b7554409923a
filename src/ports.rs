//! Collaborator interfaces the engine is invoked with.
//!
//! The engine never talks to the platform directly; everything goes through
//! these traits so tests can substitute recording doubles and the hosting
//! layer can plug in its own client.

use crate::events::{
    AuditEventKind, ChannelId, GuildId, PrincipalId, RoleId, UserId, ViolationEvent,
};
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Three-valued state of a send-permission overwrite for one principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverwriteState {
    /// Explicit allow overwrite.
    Allow,
    /// Explicit deny overwrite.
    Deny,
    /// No overwrite; the principal inherits.
    Inherit,
}

/// One principal's current send-permission overwrite on a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelOverwrite {
    pub principal: PrincipalId,
    pub state: OverwriteState,
}

/// A role held by a member, with its hierarchy position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleInfo {
    pub id: RoleId,
    pub position: i32,
}

/// One entry from the platform audit trail.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub executor_id: UserId,
    pub executor_is_bot: bool,
    pub created_at_ms: i64,
    pub target_id: Option<u64>,
    pub reason: Option<String>,
}

/// Read access to the platform audit trail, used for event attribution.
#[async_trait]
pub trait AuditLogReader: Send + Sync {
    /// Most recent audit entries of the given kind, newest first.
    async fn lookup(
        &self,
        guild: GuildId,
        kind: AuditEventKind,
        limit: usize,
    ) -> Result<Vec<AuditEntry>>;
}

/// Moderation operations plus the channel/member reads the engine needs to
/// snapshot state before mutating it. Every call is independently fallible
/// and idempotent on the platform side.
#[async_trait]
pub trait ModerationExecutor: Send + Sync {
    async fn ban(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()>;
    async fn kick(&self, guild: GuildId, user: UserId, reason: &str) -> Result<()>;
    async fn timeout(
        &self,
        guild: GuildId,
        user: UserId,
        duration_ms: i64,
        reason: &str,
    ) -> Result<()>;
    async fn remove_roles(
        &self,
        guild: GuildId,
        user: UserId,
        roles: &[RoleId],
        reason: &str,
    ) -> Result<()>;
    /// Set, or with `OverwriteState::Inherit` remove, the send-permission
    /// overwrite for a principal on a channel.
    async fn set_channel_send_permission(
        &self,
        channel: ChannelId,
        principal: PrincipalId,
        state: OverwriteState,
        reason: &str,
    ) -> Result<()>;
    async fn lockdown_guild(&self, guild: GuildId, reason: &str) -> Result<()>;

    /// Current send-permission overwrites on a channel, including the
    /// default/everyone principal when it has an explicit overwrite.
    async fn send_overwrites(&self, channel: ChannelId) -> Result<Vec<ChannelOverwrite>>;
    /// Roles currently held by a member.
    async fn member_roles(&self, guild: GuildId, user: UserId) -> Result<Vec<RoleInfo>>;
    /// Hierarchy position of the engine's own top role in the guild.
    async fn bot_role_position(&self, guild: GuildId) -> Result<i32>;
}

/// Record of one attempted remediation sub-step, for the audit sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub guild_id: GuildId,
    pub target_id: UserId,
    pub action: String,
    pub reason: String,
    pub success: bool,
    pub detail: Option<String>,
    pub ts_ms: i64,
}

/// Append-only sink for violations and actions. Persistence lives behind it;
/// sink failures are logged by the engine, never propagated.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record_violation(&self, violation: &ViolationEvent, count: usize) -> Result<()>;
    async fn record_action(&self, record: &ActionRecord) -> Result<()>;
}
