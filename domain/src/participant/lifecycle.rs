//! Participant client lifecycle.
//!
//! ```text
//! Spawning → Handshaking → Ready ⇄ InUse → Closing → Closed
//!     └───────────┴──────────┴───────┴────────┴──→ Failed
//! ```
//!
//! States only move forward, except for the Ready/InUse pair which a client
//! toggles as calls start and settle. `Closed` and `Failed` are terminal.

use crate::core::error::DomainError;
use serde::{Deserialize, Serialize};

/// Lifecycle state of one participant client
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LifecycleState {
    /// Process launch requested
    Spawning,
    /// `initialize` sent, waiting for the matching response
    Handshaking,
    /// Idle and available for calls
    Ready,
    /// One or more calls in flight
    InUse,
    /// Teardown in progress (pending calls already resolved)
    Closing,
    /// Torn down after an orderly close
    Closed,
    /// Torn down after a failure (spawn, handshake, crash, transport)
    Failed,
}

impl LifecycleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Spawning => "spawning",
            LifecycleState::Handshaking => "handshaking",
            LifecycleState::Ready => "ready",
            LifecycleState::InUse => "in-use",
            LifecycleState::Closing => "closing",
            LifecycleState::Closed => "closed",
            LifecycleState::Failed => "failed",
        }
    }

    /// `Closed` or `Failed`: no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, LifecycleState::Closed | LifecycleState::Failed)
    }

    /// Whether calls may be issued in this state
    pub fn accepts_calls(&self) -> bool {
        matches!(self, LifecycleState::Ready | LifecycleState::InUse)
    }

    /// Whether moving from `self` to `next` is allowed
    pub fn can_transition_to(&self, next: LifecycleState) -> bool {
        use LifecycleState::*;

        match (*self, next) {
            (from, Failed) => !from.is_terminal(),
            (Spawning, Handshaking) => true,
            (Handshaking, Ready) => true,
            (Ready, InUse) | (InUse, Ready) => true,
            (Spawning | Handshaking | Ready | InUse, Closing) => true,
            (Closing, Closed) => true,
            _ => false,
        }
    }

    /// Validate and perform a transition
    pub fn transition(self, next: LifecycleState) -> Result<LifecycleState, DomainError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(DomainError::InvalidTransition {
                from: self,
                to: next,
            })
        }
    }
}

impl std::fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
