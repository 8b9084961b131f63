//! Domain error types

use crate::participant::lifecycle::LifecycleState;
use thiserror::Error;

/// Domain-level errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),

    #[error("Invalid participant identity: {0:?}")]
    InvalidParticipant(String),

    #[error("Invalid lifecycle transition: {from} -> {to}")]
    InvalidTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

impl DomainError {
    /// Check if this error was caused by a rejected state transition
    pub fn is_invalid_transition(&self) -> bool {
        matches!(self, DomainError::InvalidTransition { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_transition_display() {
        let error = DomainError::InvalidTransition {
            from: LifecycleState::Closed,
            to: LifecycleState::Ready,
        };
        assert_eq!(
            error.to_string(),
            "Invalid lifecycle transition: closed -> ready"
        );
    }

    #[test]
    fn test_is_invalid_transition_check() {
        assert!(
            DomainError::InvalidTransition {
                from: LifecycleState::Failed,
                to: LifecycleState::Closing,
            }
            .is_invalid_transition()
        );
        assert!(!DomainError::InvalidTask("empty".to_string()).is_invalid_transition());
    }
}
