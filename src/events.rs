use serde::{Deserialize, Serialize};

pub type GuildId = u64;
pub type UserId = u64;
pub type ChannelId = u64;
pub type RoleId = u64;
/// A permission-overwrite principal: either a role id or a user id.
pub type PrincipalId = u64;

const MINUTE_MS: i64 = 60_000;
const DAY_MS: i64 = 86_400_000;

/// Category of tracked violation. Drives the sliding-window width, the
/// violation-record retention horizon and the escalation tier table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationCategory {
    ChannelDelete,
    RoleDelete,
    MassBan,
    MassKick,
    WebhookSpam,
    InviteSpam,
    BulkMessageDelete,
    BotAdd,
    PrivilegeEscalation,
    /// Generic moderator-issued warning; long retention, never a nuke trigger.
    Warning,
}

impl ViolationCategory {
    /// Width of the sliding window used to measure this category's rate.
    pub fn window_ms(&self) -> i64 {
        match self {
            ViolationCategory::Warning => 90 * DAY_MS,
            _ => 5 * MINUTE_MS,
        }
    }

    /// How long individual violation records are retained for tier lookup.
    pub fn retention_ms(&self) -> i64 {
        match self {
            ViolationCategory::Warning => 90 * DAY_MS,
            _ => 10 * MINUTE_MS,
        }
    }

    /// Nuke-type categories trigger containment (ban + guild lockdown) once
    /// their count crosses the configured threshold.
    pub fn is_nuke(&self) -> bool {
        !matches!(self, ViolationCategory::Warning)
    }

    /// Default containment threshold; overridable per category in config.
    pub fn default_nuke_threshold(&self) -> usize {
        5
    }
}

/// Audit-log event type codes used when resolving the executor of an
/// anonymous gateway event. Values follow the platform's audit log API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditEventKind {
    MemberKick = 20,
    MemberBanAdd = 22,
    MemberRoleUpdate = 25,
    BotAdd = 28,
    ChannelDelete = 12,
    RoleDelete = 32,
    InviteCreate = 40,
    WebhookUpdate = 51,
    MessageBulkDelete = 73,
}

impl AuditEventKind {
    pub fn code(&self) -> u32 {
        *self as u32
    }
}

/// Normalized platform event as delivered by the gateway layer.
///
/// These carry only ids, names and timestamps; the engine never holds live
/// platform objects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum GatewayEvent {
    ChannelDeleted {
        guild_id: GuildId,
        channel_id: ChannelId,
        name: String,
        ts_ms: i64,
    },
    RoleDeleted {
        guild_id: GuildId,
        role_id: RoleId,
        name: String,
        ts_ms: i64,
    },
    MemberBanned {
        guild_id: GuildId,
        target_id: UserId,
        ts_ms: i64,
    },
    /// member-remove; only escalated when the audit trail shows a kick.
    MemberRemoved {
        guild_id: GuildId,
        target_id: UserId,
        ts_ms: i64,
    },
    WebhookUpdated {
        guild_id: GuildId,
        channel_id: ChannelId,
        ts_ms: i64,
    },
    InviteCreated {
        guild_id: GuildId,
        code: String,
        ts_ms: i64,
    },
    MessagesBulkDeleted {
        guild_id: GuildId,
        channel_id: ChannelId,
        count: usize,
        ts_ms: i64,
    },
    /// member-join; only bot accounts are tracked (bot-add spree).
    MemberJoined {
        guild_id: GuildId,
        user_id: UserId,
        is_bot: bool,
        ts_ms: i64,
    },
    /// member-update that granted roles; `dangerous` marks grants carrying
    /// administrative permissions.
    MemberRolesGranted {
        guild_id: GuildId,
        target_id: UserId,
        role_ids: Vec<RoleId>,
        dangerous: bool,
        ts_ms: i64,
    },
}

impl GatewayEvent {
    pub fn guild_id(&self) -> GuildId {
        match self {
            GatewayEvent::ChannelDeleted { guild_id, .. }
            | GatewayEvent::RoleDeleted { guild_id, .. }
            | GatewayEvent::MemberBanned { guild_id, .. }
            | GatewayEvent::MemberRemoved { guild_id, .. }
            | GatewayEvent::WebhookUpdated { guild_id, .. }
            | GatewayEvent::InviteCreated { guild_id, .. }
            | GatewayEvent::MessagesBulkDeleted { guild_id, .. }
            | GatewayEvent::MemberJoined { guild_id, .. }
            | GatewayEvent::MemberRolesGranted { guild_id, .. } => *guild_id,
        }
    }

    pub fn ts_ms(&self) -> i64 {
        match self {
            GatewayEvent::ChannelDeleted { ts_ms, .. }
            | GatewayEvent::RoleDeleted { ts_ms, .. }
            | GatewayEvent::MemberBanned { ts_ms, .. }
            | GatewayEvent::MemberRemoved { ts_ms, .. }
            | GatewayEvent::WebhookUpdated { ts_ms, .. }
            | GatewayEvent::InviteCreated { ts_ms, .. }
            | GatewayEvent::MessagesBulkDeleted { ts_ms, .. }
            | GatewayEvent::MemberJoined { ts_ms, .. }
            | GatewayEvent::MemberRolesGranted { ts_ms, .. } => *ts_ms,
        }
    }
}

/// A platform event successfully attributed to an actor, ready for the
/// escalation engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub guild_id: GuildId,
    pub actor_id: UserId,
    pub category: ViolationCategory,
    /// Human-readable evidence label, e.g. the deleted channel's name.
    pub evidence: Option<String>,
    /// Role ids granted by a privilege-escalation event; empty otherwise.
    /// Used to revert the specific mutation before neutralizing the actor.
    pub granted_roles: Vec<RoleId>,
    pub ts_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_windows() {
        assert_eq!(ViolationCategory::ChannelDelete.window_ms(), 5 * MINUTE_MS);
        assert_eq!(ViolationCategory::Warning.window_ms(), 90 * DAY_MS);
    }

    #[test]
    fn test_nuke_classification() {
        assert!(ViolationCategory::ChannelDelete.is_nuke());
        assert!(ViolationCategory::InviteSpam.is_nuke());
        assert!(ViolationCategory::PrivilegeEscalation.is_nuke());
        assert!(!ViolationCategory::Warning.is_nuke());
    }

    #[test]
    fn test_retention_split() {
        // Nuke categories keep minutes, warnings keep 90 days
        assert!(ViolationCategory::MassBan.retention_ms() < DAY_MS);
        assert_eq!(ViolationCategory::Warning.retention_ms(), 90 * DAY_MS);
    }

    #[test]
    fn test_audit_kind_codes() {
        assert_eq!(AuditEventKind::ChannelDelete.code(), 12);
        assert_eq!(AuditEventKind::MessageBulkDelete.code(), 73);
    }
}
