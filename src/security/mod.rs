pub mod correlator;
pub mod escalation;
pub mod kill_switch;
pub mod rate_limiter;
pub mod reclamation;
pub mod snapshot;
pub mod violations;
pub mod window_tracker;

pub use correlator::EventCorrelator;
pub use escalation::{EscalationEngine, EscalationReport, PunishmentTier};
pub use kill_switch::{KillSwitch, KillSwitchState};
pub use rate_limiter::CommandRateLimiter;
pub use reclamation::{ReclamationDaemon, ReclamationHandle};
pub use snapshot::{ChannelFreezeManager, PermissionSnapshot};
pub use violations::{ViolationRecord, ViolationStore};
pub use window_tracker::{SlidingWindowTracker, TrackedKey};
