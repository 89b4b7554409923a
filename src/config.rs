use crate::events::{GuildId, RoleId, UserId, ViolationCategory};
use crate::security::escalation::PunishmentTier;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::env;

const DEFAULT_ATTRIBUTION_FRESHNESS_MS: i64 = 5_000;
const DEFAULT_NEUTRALIZE_TIMEOUT_MS: i64 = 86_400_000; // 24 hours
const DEFAULT_KILL_SWITCH_TTL_MS: i64 = 86_400_000; // 24 hours
const DEFAULT_SWEEP_INTERVAL_MS: i64 = 300_000; // 5 minutes

/// Per-category overrides; anything left unset falls back to the
/// category's built-in defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CategoryPolicy {
    #[serde(default)]
    pub window_ms: Option<i64>,
    #[serde(default)]
    pub retention_ms: Option<i64>,
    #[serde(default)]
    pub nuke_threshold: Option<usize>,
    #[serde(default)]
    pub tiers: Option<Vec<PunishmentTier>>,
}

/// Command rate limiting policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Max invocations of any command type per actor in the rolling window.
    pub max_per_window: usize,
    pub window_ms: i64,
    /// Minimum gap between two invocations of the same command type.
    pub cooldown_ms: i64,
    /// Actors that bypass rate limiting entirely.
    #[serde(default)]
    pub exempt: HashSet<UserId>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_window: 10,
            window_ms: 60_000,
            cooldown_ms: 3_000,
            exempt: HashSet::new(),
        }
    }
}

/// Immutable engine configuration, injected at construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// The one actor allowed to operate the kill switch.
    pub supreme_owner: UserId,
    /// The engine's own bot account; audit entries executed by it are ignored.
    pub bot_user_id: UserId,
    /// Members holding this role are exempt from enforcement.
    #[serde(default)]
    pub staff_role: Option<RoleId>,
    /// Explicitly protected actors, exempt from enforcement.
    #[serde(default)]
    pub protected_users: HashSet<UserId>,
    /// Guild owner per guild; owners are exempt in their own guild.
    #[serde(default)]
    pub guild_owners: HashMap<GuildId, UserId>,
    #[serde(default)]
    pub categories: HashMap<ViolationCategory, CategoryPolicy>,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default = "default_attribution_freshness")]
    pub attribution_freshness_ms: i64,
    #[serde(default = "default_neutralize_timeout")]
    pub neutralize_timeout_ms: i64,
    #[serde(default = "default_kill_switch_ttl")]
    pub kill_switch_ttl_ms: i64,
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_ms: i64,
}

fn default_attribution_freshness() -> i64 {
    DEFAULT_ATTRIBUTION_FRESHNESS_MS
}
fn default_neutralize_timeout() -> i64 {
    DEFAULT_NEUTRALIZE_TIMEOUT_MS
}
fn default_kill_switch_ttl() -> i64 {
    DEFAULT_KILL_SWITCH_TTL_MS
}
fn default_sweep_interval() -> i64 {
    DEFAULT_SWEEP_INTERVAL_MS
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            supreme_owner: 0,
            bot_user_id: 0,
            staff_role: None,
            protected_users: HashSet::new(),
            guild_owners: HashMap::new(),
            categories: HashMap::new(),
            rate_limit: RateLimitConfig::default(),
            attribution_freshness_ms: DEFAULT_ATTRIBUTION_FRESHNESS_MS,
            neutralize_timeout_ms: DEFAULT_NEUTRALIZE_TIMEOUT_MS,
            kill_switch_ttl_ms: DEFAULT_KILL_SWITCH_TTL_MS,
            sweep_interval_ms: DEFAULT_SWEEP_INTERVAL_MS,
        }
    }
}

impl GuardConfig {
    /// Load deployment-specific ids from the environment (`.env` supported),
    /// everything else from defaults.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let supreme_owner = env::var("WARDEN_SUPREME_OWNER")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or_else(|| {
                tracing::warn!("WARDEN_SUPREME_OWNER not set, kill switch is unusable");
                0
            });
        let bot_user_id = env::var("WARDEN_BOT_USER_ID")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        let staff_role = env::var("WARDEN_STAFF_ROLE")
            .ok()
            .and_then(|v| v.parse().ok());

        Self {
            supreme_owner,
            bot_user_id,
            staff_role,
            ..Self::default()
        }
    }

    /// Parse a full configuration from JSON.
    pub fn from_json_str(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse guard configuration")
    }

    pub fn window_ms(&self, category: ViolationCategory) -> i64 {
        self.categories
            .get(&category)
            .and_then(|p| p.window_ms)
            .unwrap_or_else(|| category.window_ms())
    }

    pub fn retention_ms(&self, category: ViolationCategory) -> i64 {
        self.categories
            .get(&category)
            .and_then(|p| p.retention_ms)
            .unwrap_or_else(|| category.retention_ms())
    }

    pub fn nuke_threshold(&self, category: ViolationCategory) -> usize {
        self.categories
            .get(&category)
            .and_then(|p| p.nuke_threshold)
            .unwrap_or_else(|| category.default_nuke_threshold())
    }

    /// Configured tier table override for a category, if any.
    pub fn tier_override(&self, category: ViolationCategory) -> Option<&[PunishmentTier]> {
        self.categories
            .get(&category)
            .and_then(|p| p.tiers.as_deref())
    }

    /// Whether the actor is the owner of the given guild.
    pub fn is_guild_owner(&self, guild: GuildId, actor: UserId) -> bool {
        self.guild_owners.get(&guild) == Some(&actor)
    }
}
