use crate::events::{ChannelId, UserId};
use thiserror::Error;

/// Error taxonomy for the enforcement engine.
///
/// Attribution failures are deliberately absent: an event the correlator
/// cannot attribute is a silent no-escalate outcome (`Ok(None)`), not an error.
#[derive(Debug, Error)]
pub enum GuardError {
    /// Kill-switch operation attempted by anyone other than the supreme owner.
    #[error("actor {actor} is not authorized for this operation")]
    Unauthorized { actor: UserId },

    /// A live permission snapshot already exists for the channel.
    #[error("channel {channel} is already frozen")]
    FreezeConflict { channel: ChannelId },

    /// Unfreeze requested for a channel with no live snapshot.
    #[error("channel {channel} is not frozen")]
    NotFrozen { channel: ChannelId },

    /// Command invocation rejected by the rate limiter.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: i64 },

    /// One or more remediation sub-steps failed; the rest were still attempted.
    /// `failed` pairs each failed step name with its error text so staff can
    /// complete the remainder manually.
    #[error("remediation partially failed: {} of {} steps failed", failed.len(), completed.len() + failed.len())]
    ActionPartialFailure {
        completed: Vec<String>,
        failed: Vec<(String, String)>,
    },

    /// A collaborator (platform) call failed outright.
    #[error("platform action failed: {0}")]
    PlatformActionFailed(#[from] anyhow::Error),
}

impl GuardError {
    /// True when the error carries partial remediation results.
    pub fn is_partial_failure(&self) -> bool {
        matches!(self, GuardError::ActionPartialFailure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_failure_display_counts_steps() {
        let err = GuardError::ActionPartialFailure {
            completed: vec!["ban".to_string()],
            failed: vec![("lockdown".to_string(), "denied".to_string())],
        };
        assert!(err.is_partial_failure());
        assert_eq!(err.to_string(), "remediation partially failed: 1 of 2 steps failed");
    }

    #[test]
    fn test_platform_error_wraps_anyhow() {
        let err: GuardError = anyhow::anyhow!("timeout call refused").into();
        assert!(err.to_string().contains("timeout call refused"));
    }
}
