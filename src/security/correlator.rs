use crate::config::GuardConfig;
use crate::error::GuardError;
use crate::events::{AuditEventKind, GatewayEvent, RoleId, ViolationCategory, ViolationEvent};
use crate::ports::AuditLogReader;
use std::sync::Arc;

const AUDIT_LOOKUP_LIMIT: usize = 5;

/// What an attributable gateway event looks like in audit-log terms.
struct Classification {
    kind: AuditEventKind,
    category: ViolationCategory,
    evidence: Option<String>,
    granted_roles: Vec<RoleId>,
    /// Target the audit entry must reference, when the event names one.
    target: Option<u64>,
}

/// Attributes anonymous platform events to an actor via the audit trail.
///
/// Attribution is accepted only when the most recent matching audit entry is
/// fresh (≤ the configured freshness window) and its executor is neither a
/// bot nor the engine itself. Everything else is a silent no-escalate
/// outcome, never an error: escalating a misattributed event is worse than
/// dropping an unattributable one.
#[derive(Clone)]
pub struct EventCorrelator {
    config: Arc<GuardConfig>,
    audit: Arc<dyn AuditLogReader>,
}

impl EventCorrelator {
    pub fn new(config: Arc<GuardConfig>, audit: Arc<dyn AuditLogReader>) -> Self {
        Self { config, audit }
    }

    /// Attribute a gateway event. `Ok(None)` means the event is not tracked
    /// or could not be attributed with confidence.
    pub async fn correlate(
        &self,
        event: &GatewayEvent,
        now_ms: i64,
    ) -> Result<Option<ViolationEvent>, GuardError> {
        let Some(class) = Self::classify(event) else {
            return Ok(None);
        };

        let guild = event.guild_id();
        let entries = self
            .audit
            .lookup(guild, class.kind, AUDIT_LOOKUP_LIMIT)
            .await?;

        // Entries come newest first; take the first one for the right target.
        // When the event names a target, an entry without one is no match.
        let entry = entries.iter().find(|e| match (class.target, e.target_id) {
            (Some(expected), Some(actual)) => expected == actual,
            (Some(_), None) => false,
            (None, _) => true,
        });

        let Some(entry) = entry else {
            self.discard("no matching audit entry", class.category);
            return Ok(None);
        };

        if now_ms - entry.created_at_ms > self.config.attribution_freshness_ms {
            self.discard("audit entry stale", class.category);
            return Ok(None);
        }
        if entry.executor_is_bot || entry.executor_id == self.config.bot_user_id {
            self.discard("executor is a bot or the engine", class.category);
            return Ok(None);
        }

        Ok(Some(ViolationEvent {
            guild_id: guild,
            actor_id: entry.executor_id,
            category: class.category,
            evidence: class.evidence,
            granted_roles: class.granted_roles,
            ts_ms: event.ts_ms(),
        }))
    }

    fn discard(&self, why: &'static str, category: ViolationCategory) {
        metrics::counter!("attribution_discarded_total", 1);
        tracing::debug!(?category, why, "attribution discarded");
    }

    fn classify(event: &GatewayEvent) -> Option<Classification> {
        let class = match event {
            GatewayEvent::ChannelDeleted {
                channel_id, name, ..
            } => Classification {
                kind: AuditEventKind::ChannelDelete,
                category: ViolationCategory::ChannelDelete,
                evidence: Some(name.clone()),
                granted_roles: vec![],
                target: Some(*channel_id),
            },
            GatewayEvent::RoleDeleted { role_id, name, .. } => Classification {
                kind: AuditEventKind::RoleDelete,
                category: ViolationCategory::RoleDelete,
                evidence: Some(name.clone()),
                granted_roles: vec![],
                target: Some(*role_id),
            },
            GatewayEvent::MemberBanned { target_id, .. } => Classification {
                kind: AuditEventKind::MemberBanAdd,
                category: ViolationCategory::MassBan,
                evidence: None,
                granted_roles: vec![],
                target: Some(*target_id),
            },
            GatewayEvent::MemberRemoved { target_id, .. } => Classification {
                kind: AuditEventKind::MemberKick,
                category: ViolationCategory::MassKick,
                evidence: None,
                granted_roles: vec![],
                target: Some(*target_id),
            },
            GatewayEvent::WebhookUpdated { channel_id, .. } => Classification {
                kind: AuditEventKind::WebhookUpdate,
                category: ViolationCategory::WebhookSpam,
                evidence: None,
                granted_roles: vec![],
                target: Some(*channel_id),
            },
            GatewayEvent::InviteCreated { code, .. } => Classification {
                kind: AuditEventKind::InviteCreate,
                category: ViolationCategory::InviteSpam,
                evidence: Some(code.clone()),
                granted_roles: vec![],
                target: None,
            },
            GatewayEvent::MessagesBulkDeleted { count, .. } => Classification {
                kind: AuditEventKind::MessageBulkDelete,
                category: ViolationCategory::BulkMessageDelete,
                evidence: Some(format!("{count} messages")),
                granted_roles: vec![],
                target: None,
            },
            GatewayEvent::MemberJoined {
                user_id, is_bot, ..
            } => {
                if !is_bot {
                    return None;
                }
                Classification {
                    kind: AuditEventKind::BotAdd,
                    category: ViolationCategory::BotAdd,
                    evidence: None,
                    granted_roles: vec![],
                    target: Some(*user_id),
                }
            }
            GatewayEvent::MemberRolesGranted {
                target_id,
                role_ids,
                dangerous,
                ..
            } => {
                if !dangerous {
                    return None;
                }
                Classification {
                    kind: AuditEventKind::MemberRoleUpdate,
                    category: ViolationCategory::PrivilegeEscalation,
                    evidence: Some(format!("roles {role_ids:?}")),
                    granted_roles: role_ids.clone(),
                    target: Some(*target_id),
                }
            }
        };
        Some(class)
    }
}
