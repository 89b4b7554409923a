//! Threat-detection and automated-response engine for guild moderation.
//!
//! The engine consumes normalized platform events, attributes them to an
//! actor through the audit trail, measures their rate against sliding time
//! windows and escalates punishment through deterministic tiers. It can also
//! reversibly lock down a channel with exact permission restoration and be
//! globally overridden by an owner-only kill switch.
//!
//! Everything platform-facing goes through the collaborator traits in
//! [`ports`]; the engine itself holds only ids and injected state, and every
//! time-dependent decision is a pure function of the injected [`clock::Clock`].

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod ports;
pub mod security;

pub use clock::{Clock, MockClock, SystemClock};
pub use config::{CategoryPolicy, GuardConfig, RateLimitConfig};
pub use engine::GuardEngine;
pub use error::GuardError;
pub use events::{
    AuditEventKind, ChannelId, GatewayEvent, GuildId, PrincipalId, RoleId, UserId,
    ViolationCategory, ViolationEvent,
};
pub use ports::{
    ActionRecord, AuditEntry, AuditLogReader, AuditSink, ChannelOverwrite, ModerationExecutor,
    OverwriteState, RoleInfo,
};
pub use security::{
    ChannelFreezeManager, CommandRateLimiter, EscalationEngine, EscalationReport, EventCorrelator,
    KillSwitch, KillSwitchState, PunishmentTier, ReclamationDaemon, ReclamationHandle,
    SlidingWindowTracker, TrackedKey, ViolationStore,
};
