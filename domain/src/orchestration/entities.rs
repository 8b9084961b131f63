//! Orchestration domain entities

use super::value_objects::{Consensus, ParticipantFailure, SessionResult};
use crate::core::task::Task;
use crate::participant::identity::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Phase of a collaboration session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    /// Every participant analyzes the task in parallel
    Analysis,
    /// Each successful participant reviews the others' results
    CrossReview,
    /// Results and reviews are synthesized into one consensus
    Consensus,
}

impl Phase {
    pub fn as_str(&self) -> &str {
        match self {
            Phase::Analysis => "analysis",
            Phase::CrossReview => "cross-review",
            Phase::Consensus => "consensus",
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Phase::Analysis => "Parallel Analysis",
            Phase::CrossReview => "Cross Review",
            Phase::Consensus => "Consensus Synthesis",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// One end-to-end `invoke` execution and its accumulated results (Entity)
///
/// Lives only for the duration of a single orchestration run. Every map is
/// keyed by participant identity, never by arrival order, so the same set of
/// outcomes always yields the same session.
#[derive(Debug, Clone)]
pub struct CollaborationSession {
    task: Task,
    participants: Vec<ParticipantId>,
    cross_review_requested: bool,
    results: BTreeMap<ParticipantId, Value>,
    errors: BTreeMap<ParticipantId, ParticipantFailure>,
    reviews: BTreeMap<ParticipantId, Value>,
    review_errors: BTreeMap<ParticipantId, ParticipantFailure>,
}

impl CollaborationSession {
    /// Create a session; duplicate identities collapse to their first occurrence
    pub fn new(task: Task, participants: Vec<ParticipantId>, cross_review: bool) -> Self {
        let mut unique: Vec<ParticipantId> = Vec::with_capacity(participants.len());
        for id in participants {
            if !unique.contains(&id) {
                unique.push(id);
            }
        }

        Self {
            task,
            participants: unique,
            cross_review_requested: cross_review,
            results: BTreeMap::new(),
            errors: BTreeMap::new(),
            reviews: BTreeMap::new(),
            review_errors: BTreeMap::new(),
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn participants(&self) -> &[ParticipantId] {
        &self.participants
    }

    pub fn results(&self) -> &BTreeMap<ParticipantId, Value> {
        &self.results
    }

    pub fn errors(&self) -> &BTreeMap<ParticipantId, ParticipantFailure> {
        &self.errors
    }

    pub fn reviews(&self) -> &BTreeMap<ParticipantId, Value> {
        &self.reviews
    }

    pub fn review_errors(&self) -> &BTreeMap<ParticipantId, ParticipantFailure> {
        &self.review_errors
    }

    // ==================== Phase 1 ====================

    pub fn record_result(&mut self, id: ParticipantId, result: Value) {
        self.errors.remove(&id);
        self.results.insert(id, result);
    }

    pub fn record_failure(&mut self, id: ParticipantId, failure: ParticipantFailure) {
        self.results.remove(&id);
        self.errors.insert(id, failure);
    }

    /// Participants with a Phase 1 result, in identity order
    pub fn successful(&self) -> Vec<ParticipantId> {
        self.results.keys().cloned().collect()
    }

    pub fn has_success(&self) -> bool {
        !self.results.is_empty()
    }

    // ==================== Phase 2 ====================

    /// Cross review runs only when requested and at least two participants succeeded
    pub fn should_cross_review(&self) -> bool {
        self.cross_review_requested && self.results.len() >= 2
    }

    /// Phase 1 results of everyone except `reviewer`
    pub fn peer_results_for(&self, reviewer: &ParticipantId) -> BTreeMap<ParticipantId, Value> {
        self.results
            .iter()
            .filter(|(id, _)| *id != reviewer)
            .map(|(id, result)| (id.clone(), result.clone()))
            .collect()
    }

    pub fn record_review(&mut self, reviewer: ParticipantId, review: Value) {
        self.review_errors.remove(&reviewer);
        self.reviews.insert(reviewer, review);
    }

    pub fn record_review_failure(&mut self, reviewer: ParticipantId, failure: ParticipantFailure) {
        self.reviews.remove(&reviewer);
        self.review_errors.insert(reviewer, failure);
    }

    // ==================== Completion ====================

    /// Close the session into its immutable result
    pub fn into_result(
        self,
        consensus: Consensus,
        started_at: impl Into<String>,
        elapsed_ms: u64,
    ) -> SessionResult {
        let cross_review = self.should_cross_review();
        SessionResult {
            task: self.task,
            participants: self.participants,
            results: self.results,
            errors: self.errors,
            reviews: self.reviews,
            review_errors: self.review_errors,
            cross_review,
            consensus,
            started_at: started_at.into(),
            elapsed_ms,
        }
    }
}
