use crate::error::GuardError;
use crate::events::UserId;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

/// Live kill-switch activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KillSwitchState {
    pub activated_by: UserId,
    pub activated_at_ms: i64,
    pub expires_at_ms: i64,
}

/// Owner-only global enforcement override.
///
/// While active, detection and logging keep running but no punitive action is
/// dispatched. Activation always expires after the configured TTL; expiry is
/// lazy (evaluated on read) with the periodic sweep as an optimization only.
#[derive(Clone)]
pub struct KillSwitch {
    owner: UserId,
    ttl_ms: i64,
    state: Arc<Mutex<Option<KillSwitchState>>>,
}

impl KillSwitch {
    pub fn new(owner: UserId, ttl_ms: i64) -> Self {
        Self {
            owner,
            ttl_ms,
            state: Arc::new(Mutex::new(None)),
        }
    }

    /// Activate the switch. Repeated activation resets the TTL window.
    pub fn activate(&self, actor: UserId, now_ms: i64) -> Result<KillSwitchState, GuardError> {
        if actor != self.owner {
            return Err(GuardError::Unauthorized { actor });
        }
        let next = KillSwitchState {
            activated_by: actor,
            activated_at_ms: now_ms,
            expires_at_ms: now_ms + self.ttl_ms,
        };
        let mut state = self.state.lock().unwrap();
        *state = Some(next);
        tracing::warn!(actor, expires_at_ms = next.expires_at_ms, "kill switch activated");
        Ok(next)
    }

    /// Deactivate the switch. No-op success when already inactive.
    pub fn deactivate(&self, actor: UserId) -> Result<(), GuardError> {
        if actor != self.owner {
            return Err(GuardError::Unauthorized { actor });
        }
        let mut state = self.state.lock().unwrap();
        if state.take().is_some() {
            tracing::warn!(actor, "kill switch deactivated");
        }
        Ok(())
    }

    /// Whether enforcement is currently suppressed. Clears expired state as a
    /// side effect.
    pub fn is_active(&self, now_ms: i64) -> bool {
        let mut state = self.state.lock().unwrap();
        match *state {
            Some(current) if now_ms <= current.expires_at_ms => true,
            Some(_) => {
                *state = None;
                false
            }
            None => false,
        }
    }

    /// Current state, with the same lazy expiry as `is_active`.
    pub fn current(&self, now_ms: i64) -> Option<KillSwitchState> {
        let mut state = self.state.lock().unwrap();
        match *state {
            Some(current) if now_ms <= current.expires_at_ms => Some(current),
            Some(_) => {
                *state = None;
                None
            }
            None => None,
        }
    }

    /// Sweep entry point; equivalent to a discarded read.
    pub fn sweep(&self, now_ms: i64) {
        self.is_active(now_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: UserId = 42;
    const TTL: i64 = 86_400_000;

    fn switch() -> KillSwitch {
        KillSwitch::new(OWNER, TTL)
    }

    #[test]
    fn test_activation_sets_expiry() {
        let switch = switch();
        let state = switch.activate(OWNER, 1_000).unwrap();
        assert_eq!(state.expires_at_ms, 1_000 + TTL);
        assert!(switch.is_active(1_000));
        assert!(switch.is_active(1_000 + TTL));
        assert!(!switch.is_active(1_001 + TTL));
    }

    #[test]
    fn test_repeated_activation_resets_window() {
        let switch = switch();
        switch.activate(OWNER, 0).unwrap();
        let state = switch.activate(OWNER, 5_000).unwrap();
        assert_eq!(state.activated_at_ms, 5_000);
        assert_eq!(state.expires_at_ms, 5_000 + TTL);
    }

    #[test]
    fn test_non_owner_always_unauthorized() {
        let switch = switch();
        assert!(matches!(
            switch.activate(7, 0),
            Err(GuardError::Unauthorized { actor: 7 })
        ));
        assert!(matches!(
            switch.deactivate(7),
            Err(GuardError::Unauthorized { actor: 7 })
        ));
        // State unchanged by the failed attempts
        assert!(!switch.is_active(0));

        switch.activate(OWNER, 0).unwrap();
        assert!(switch.activate(7, 1).is_err());
        assert!(switch.is_active(1));
    }

    #[test]
    fn test_deactivate_inactive_is_noop_success() {
        let switch = switch();
        assert!(switch.deactivate(OWNER).is_ok());
        assert!(!switch.is_active(0));
    }

    #[test]
    fn test_lazy_expiry_clears_state() {
        let switch = switch();
        switch.activate(OWNER, 0).unwrap();
        assert!(!switch.is_active(TTL + 1));
        // Cleared, not just reported inactive
        assert!(switch.current(TTL + 1).is_none());
    }

    #[test]
    fn test_sweep_clears_expired() {
        let switch = switch();
        switch.activate(OWNER, 0).unwrap();
        switch.sweep(TTL + 1);
        assert!(switch.current(0).is_none());
    }
}
