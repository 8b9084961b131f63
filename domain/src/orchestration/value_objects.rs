//! Orchestration value objects - immutable result types for collaboration sessions.
//!
//! These types represent the outputs of each phase:
//! - [`ParticipantFailure`] - Why one participant produced no result
//! - [`Consensus`] - The synthesized outcome of the consensus phase
//! - [`SessionResult`] - Complete result containing all phases

use crate::core::task::Task;
use crate::participant::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Classification of a per-participant failure.
///
/// Mirrors the client error taxonomy so callers can tell a slow participant
/// (`call-timeout`) from a crashed one (`client-terminated`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureKind {
    SpawnError,
    HandshakeTimeout,
    TransportError,
    CallTimeout,
    RemoteError,
    ClientTerminated,
    DuplicateRequestId,
    UnknownParticipant,
    EncodingError,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::SpawnError => "spawn-error",
            FailureKind::HandshakeTimeout => "handshake-timeout",
            FailureKind::TransportError => "transport-error",
            FailureKind::CallTimeout => "call-timeout",
            FailureKind::RemoteError => "remote-error",
            FailureKind::ClientTerminated => "client-terminated",
            FailureKind::DuplicateRequestId => "duplicate-request-id",
            FailureKind::UnknownParticipant => "unknown-participant",
            FailureKind::EncodingError => "encoding-error",
        }
    }

    /// Failures after which a fresh process may succeed
    pub fn is_restartable(&self) -> bool {
        matches!(
            self,
            FailureKind::SpawnError | FailureKind::TransportError | FailureKind::ClientTerminated
        )
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A participant's failure as recorded in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantFailure {
    pub kind: FailureKind,
    pub message: String,
    /// Error code reported by the participant (remote errors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl ParticipantFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

/// How the consensus was produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "kebab-case")]
pub enum ConsensusStrategy {
    /// Aggregated locally, no participant call
    Local,
    /// Synthesized by a designated moderator participant
    Delegated { moderator: ParticipantId },
}

/// How much of the requested collaboration the consensus rests on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Perspective {
    /// Every requested participant contributed (and reviewed, if requested)
    Full,
    /// Some participants or reviewers are missing
    Partial,
    /// Only one participant contributed
    Single,
}

/// Outcome of the consensus phase
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Consensus {
    pub strategy: ConsensusStrategy,
    pub perspective: Perspective,
    /// Participants whose analysis fed the consensus
    pub contributors: Vec<ParticipantId>,
    /// Participants that delivered a cross review
    pub reviewers: Vec<ParticipantId>,
    /// Whether every contributor returned the same result
    pub agreement: bool,
    /// Structured synthesis (local aggregate or moderator output)
    pub synthesis: Value,
    /// Why a delegated synthesis fell back to local aggregation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

impl Consensus {
    /// Record why the delegated synthesis was replaced by a local one
    pub fn with_fallback_reason(mut self, reason: impl Into<String>) -> Self {
        self.fallback_reason = Some(reason.into());
        self
    }
}

/// Complete result of a collaboration session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResult {
    /// The task as submitted
    pub task: Task,
    /// Participants requested for this session, in request order
    pub participants: Vec<ParticipantId>,
    /// Phase 1: successful analyses
    pub results: BTreeMap<ParticipantId, Value>,
    /// Phase 1: failed participants
    pub errors: BTreeMap<ParticipantId, ParticipantFailure>,
    /// Phase 2: reviews keyed by reviewer
    pub reviews: BTreeMap<ParticipantId, Value>,
    /// Phase 2: failed reviewers
    pub review_errors: BTreeMap<ParticipantId, ParticipantFailure>,
    /// Whether the cross-review phase ran
    pub cross_review: bool,
    /// Phase 3: consensus
    pub consensus: Consensus,
    /// RFC 3339 timestamp of session start
    pub started_at: String,
    pub elapsed_ms: u64,
}

impl SessionResult {
    /// Returns `true` if at least one participant failed in Phase 1
    pub fn is_partial(&self) -> bool {
        !self.errors.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_kind_wire_names() {
        let json = serde_json::to_value(FailureKind::CallTimeout).unwrap();
        assert_eq!(json, "call-timeout");
        assert_eq!(FailureKind::ClientTerminated.to_string(), "client-terminated");
    }

    #[test]
    fn restartable_kinds() {
        assert!(FailureKind::ClientTerminated.is_restartable());
        assert!(FailureKind::SpawnError.is_restartable());
        assert!(!FailureKind::CallTimeout.is_restartable());
        assert!(!FailureKind::RemoteError.is_restartable());
    }

    #[test]
    fn failure_omits_missing_code() {
        let failure = ParticipantFailure::new(FailureKind::CallTimeout, "timed out");
        let json = serde_json::to_value(&failure).unwrap();
        assert!(json.get("code").is_none());

        let remote = ParticipantFailure::new(FailureKind::RemoteError, "bad").with_code(-32000);
        assert_eq!(serde_json::to_value(&remote).unwrap()["code"], -32000);
    }

    #[test]
    fn delegated_strategy_is_tagged() {
        let strategy = ConsensusStrategy::Delegated {
            moderator: ParticipantId::new("a").unwrap(),
        };
        let json = serde_json::to_value(&strategy).unwrap();
        assert_eq!(json, serde_json::json!({"mode": "delegated", "moderator": "a"}));
    }
}
