//! Collaboration parameters for use case control.
//!
//! [`CollaborationParams`] groups the static parameters that control how
//! [`RunCollaborationUseCase`](crate::use_cases::run_collaboration::RunCollaborationUseCase)
//! runs a session. Per-request overrides arrive through the use case input.

use quorum_domain::ParticipantId;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// How the consensus phase is produced
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum ConsensusMode {
    /// Aggregate locally, no participant call
    #[default]
    Local,
    /// Ask one participant to synthesize
    Delegated { moderator: ParticipantId },
}

/// Collaboration control parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollaborationParams {
    /// Timeout applied to every participant call.
    pub call_timeout: Duration,
    /// Whether Phase 2 runs when a request does not say.
    pub cross_review: bool,
    /// Extra analysis attempts after a restartable failure.
    pub analysis_retries: usize,
    pub consensus: ConsensusMode,
}

impl Default for CollaborationParams {
    fn default() -> Self {
        Self {
            call_timeout: Duration::from_secs(120),
            cross_review: true,
            analysis_retries: 0,
            consensus: ConsensusMode::Local,
        }
    }
}

impl CollaborationParams {
    // ==================== Builder Methods ====================

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_cross_review(mut self, enabled: bool) -> Self {
        self.cross_review = enabled;
        self
    }

    pub fn with_analysis_retries(mut self, retries: usize) -> Self {
        self.analysis_retries = retries;
        self
    }

    pub fn with_moderator(mut self, moderator: ParticipantId) -> Self {
        self.consensus = ConsensusMode::Delegated { moderator };
        self
    }
}
