//! Consensus construction.
//!
//! Local aggregation never calls a participant: it packages the Phase 1
//! results and Phase 2 reviews into one structured synthesis and derives how
//! complete and how unanimous the collaboration was. Delegated consensus
//! reuses the same bookkeeping around a moderator's output.

use super::entities::CollaborationSession;
use super::value_objects::{Consensus, ConsensusStrategy, Perspective};
use crate::participant::identity::ParticipantId;
use serde_json::{Value, json};

/// Build a consensus by local aggregation
pub fn aggregate(session: &CollaborationSession) -> Consensus {
    let synthesis = json!({
        "results": session.results(),
        "reviews": session.reviews(),
    });
    build(session, ConsensusStrategy::Local, synthesis)
}

/// Build a consensus around a moderator's synthesis
pub fn delegated(
    session: &CollaborationSession,
    moderator: ParticipantId,
    synthesis: Value,
) -> Consensus {
    build(session, ConsensusStrategy::Delegated { moderator }, synthesis)
}

/// Assess how complete the collaboration behind a consensus is
pub fn perspective(session: &CollaborationSession) -> Perspective {
    if session.results().len() <= 1 {
        return Perspective::Single;
    }
    if !session.errors().is_empty() {
        return Perspective::Partial;
    }
    if session.should_cross_review() && session.reviews().len() < session.results().len() {
        return Perspective::Partial;
    }
    Perspective::Full
}

/// Whether every contributed result is the same JSON value
pub fn agreement(session: &CollaborationSession) -> bool {
    let mut results = session.results().values();
    match results.next() {
        Some(first) => results.all(|r| r == first),
        None => false,
    }
}

fn build(session: &CollaborationSession, strategy: ConsensusStrategy, synthesis: Value) -> Consensus {
    Consensus {
        strategy,
        perspective: perspective(session),
        contributors: session.results().keys().cloned().collect(),
        reviewers: session.reviews().keys().cloned().collect(),
        agreement: agreement(session),
        synthesis,
        fallback_reason: None,
    }
}
