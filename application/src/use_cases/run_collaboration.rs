//! Run Collaboration use case
//!
//! Orchestrates one collaboration session across participants:
//!
//! 1. **Analysis** - every participant analyzes the task in parallel
//! 2. **Cross review** - each successful participant reviews its peers (optional)
//! 3. **Consensus** - results and reviews are synthesized into one outcome
//!
//! Failures are isolated per participant. Only a session where nobody
//! produced a result is reported as an error.

use crate::config::{CollaborationParams, ConsensusMode};
use crate::ports::participant_gateway::{ParticipantError, ParticipantGateway};
use crate::ports::progress::{NoProgress, ProgressNotifier};
use crate::ports::spawn_spec::SpawnSpecProvider;
use quorum_domain::orchestration::consensus;
use quorum_domain::{
    CollaborationSession, Consensus, DomainError, FailureKind, ParticipantFailure, ParticipantId,
    Phase, SessionResult, Task,
};
use serde_json::{Value, json};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

/// Participant method for Phase 1
pub const METHOD_ANALYZE: &str = "analyze";
/// Participant method for Phase 2
pub const METHOD_REVIEW: &str = "review";
/// Participant method for delegated consensus
pub const METHOD_SYNTHESIZE: &str = "synthesize";

/// Errors that end a collaboration without a result
#[derive(Error, Debug)]
pub enum RunCollaborationError {
    #[error("No participants configured")]
    NoParticipants,

    #[error("All {} participants failed", errors.len())]
    AllParticipantsFailed {
        errors: BTreeMap<ParticipantId, ParticipantFailure>,
    },

    #[error("Invalid task: {0}")]
    InvalidTask(#[from] DomainError),
}

/// Input for the RunCollaboration use case
#[derive(Debug, Clone)]
pub struct RunCollaborationInput {
    pub task: Task,
    /// Requested participants; empty means every configured participant
    pub participants: Vec<ParticipantId>,
    /// Overrides [`CollaborationParams::cross_review`]
    pub cross_review: Option<bool>,
    /// Overrides [`CollaborationParams::call_timeout`]
    pub call_timeout: Option<Duration>,
}

impl RunCollaborationInput {
    pub fn new(task: Task) -> Self {
        Self {
            task,
            participants: Vec::new(),
            cross_review: None,
            call_timeout: None,
        }
    }

    /// Build from raw task text, rejecting blank tasks
    pub fn from_text(
        text: impl Into<String>,
        content: Option<String>,
    ) -> Result<Self, RunCollaborationError> {
        let task = Task::new(text)?;
        let task = match content {
            Some(content) => task.with_content(content),
            None => task,
        };
        Ok(Self::new(task))
    }

    pub fn with_participants(mut self, participants: Vec<ParticipantId>) -> Self {
        self.participants = participants;
        self
    }

    pub fn with_cross_review(mut self, enabled: bool) -> Self {
        self.cross_review = Some(enabled);
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }
}

/// Use case for running a collaboration session
pub struct RunCollaborationUseCase<G: ParticipantGateway + 'static> {
    gateway: Arc<G>,
    specs: Arc<dyn SpawnSpecProvider>,
    params: CollaborationParams,
}

impl<G: ParticipantGateway + 'static> RunCollaborationUseCase<G> {
    pub fn new(gateway: Arc<G>, specs: Arc<dyn SpawnSpecProvider>) -> Self {
        Self {
            gateway,
            specs,
            params: CollaborationParams::default(),
        }
    }

    pub fn with_params(mut self, params: CollaborationParams) -> Self {
        self.params = params;
        self
    }

    pub fn params(&self) -> &CollaborationParams {
        &self.params
    }

    /// Execute the use case with default (no-op) progress
    pub async fn execute(
        &self,
        input: RunCollaborationInput,
    ) -> Result<SessionResult, RunCollaborationError> {
        self.execute_with_progress(input, &NoProgress).await
    }

    /// Execute the use case with progress callbacks
    pub async fn execute_with_progress(
        &self,
        input: RunCollaborationInput,
        progress: &dyn ProgressNotifier,
    ) -> Result<SessionResult, RunCollaborationError> {
        let participants = if input.participants.is_empty() {
            self.specs.default_participants()
        } else {
            input.participants
        };
        if participants.is_empty() {
            return Err(RunCollaborationError::NoParticipants);
        }

        let cross_review = input.cross_review.unwrap_or(self.params.cross_review);
        let timeout = input.call_timeout.unwrap_or(self.params.call_timeout);
        let started_at = chrono::Utc::now().to_rfc3339();
        let started = Instant::now();

        let mut session = CollaborationSession::new(input.task, participants, cross_review);
        info!(
            "Starting collaboration with {} participants",
            session.participants().len()
        );

        // Phase 1: Analysis
        self.phase_analysis(&mut session, timeout, progress).await;

        if !session.has_success() {
            return Err(RunCollaborationError::AllParticipantsFailed {
                errors: session.errors().clone(),
            });
        }

        // Phase 2: Cross review (optional)
        if session.should_cross_review() {
            self.phase_review(&mut session, timeout, progress).await;
        } else {
            debug!("Skipping cross review phase");
        }

        // Phase 3: Consensus
        let consensus = self.phase_consensus(&session, timeout, progress).await;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            "Collaboration finished in {}ms ({} results, {} errors)",
            elapsed_ms,
            session.results().len(),
            session.errors().len()
        );
        Ok(session.into_result(consensus, started_at, elapsed_ms))
    }

    /// Phase 1: Every participant analyzes the task in parallel
    async fn phase_analysis(
        &self,
        session: &mut CollaborationSession,
        timeout: Duration,
        progress: &dyn ProgressNotifier,
    ) {
        info!("Phase 1: Analysis");
        let phase = Phase::Analysis;
        progress.on_phase_start(&phase, session.participants().len());

        let params = json!({
            "task": session.task().text(),
            "content": session.task().content(),
        });
        let retries = self.params.analysis_retries;
        let mut join_set = JoinSet::new();

        for participant in session.participants() {
            let gateway = Arc::clone(&self.gateway);
            let participant = participant.clone();
            let params = params.clone();

            join_set.spawn(async move {
                let result = Self::call_with_retries(
                    &gateway,
                    &participant,
                    METHOD_ANALYZE,
                    params,
                    timeout,
                    retries,
                )
                .await;
                (participant, result)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((participant, Ok(value))) => {
                    info!("Participant {} completed analysis", participant);
                    progress.on_task_complete(&phase, &participant, true);
                    session.record_result(participant, value);
                }
                Ok((participant, Err(e))) => {
                    warn!("Participant {} failed analysis: {}", participant, e);
                    progress.on_task_complete(&phase, &participant, false);
                    session.record_failure(participant, e.into_failure());
                }
                Err(e) => {
                    warn!("Task join error: {}", e);
                }
            }
        }

        // A panicked task loses its identity; whoever is unaccounted for failed
        let missing: Vec<ParticipantId> = session
            .participants()
            .iter()
            .filter(|id| !session.results().contains_key(*id) && !session.errors().contains_key(*id))
            .cloned()
            .collect();
        for participant in missing {
            progress.on_task_complete(&phase, &participant, false);
            session.record_failure(
                participant,
                ParticipantFailure::new(FailureKind::ClientTerminated, "analysis task aborted"),
            );
        }

        progress.on_phase_complete(&phase);
    }

    /// Phase 2: Each successful participant reviews the others' results
    async fn phase_review(
        &self,
        session: &mut CollaborationSession,
        timeout: Duration,
        progress: &dyn ProgressNotifier,
    ) {
        info!("Phase 2: Cross review");
        let phase = Phase::CrossReview;
        let reviewers = session.successful();
        progress.on_phase_start(&phase, reviewers.len());

        let mut join_set = JoinSet::new();

        for reviewer in reviewers {
            let gateway = Arc::clone(&self.gateway);
            let params = json!({
                "task": session.task().text(),
                "content": session.task().content(),
                "peerResults": session.peer_results_for(&reviewer),
            });

            join_set.spawn(async move {
                let result = gateway
                    .call(&reviewer, METHOD_REVIEW, params, timeout)
                    .await;
                (reviewer, result)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((reviewer, Ok(review))) => {
                    debug!("Participant {} delivered a review", reviewer);
                    progress.on_task_complete(&phase, &reviewer, true);
                    session.record_review(reviewer, review);
                }
                Ok((reviewer, Err(e))) => {
                    warn!("Participant {} failed review: {}", reviewer, e);
                    progress.on_task_complete(&phase, &reviewer, false);
                    session.record_review_failure(reviewer, e.into_failure());
                }
                Err(e) => {
                    warn!("Task join error: {}", e);
                }
            }
        }

        progress.on_phase_complete(&phase);
    }

    /// Phase 3: Synthesize a consensus, locally or through a moderator
    async fn phase_consensus(
        &self,
        session: &CollaborationSession,
        timeout: Duration,
        progress: &dyn ProgressNotifier,
    ) -> Consensus {
        info!("Phase 3: Consensus");
        let phase = Phase::Consensus;

        let consensus = match &self.params.consensus {
            ConsensusMode::Local => {
                progress.on_phase_start(&phase, 0);
                consensus::aggregate(session)
            }
            ConsensusMode::Delegated { moderator } => {
                progress.on_phase_start(&phase, 1);
                let params = json!({
                    "task": session.task().text(),
                    "content": session.task().content(),
                    "results": session.results(),
                    "reviews": session.reviews(),
                });

                match self
                    .gateway
                    .call(moderator, METHOD_SYNTHESIZE, params, timeout)
                    .await
                {
                    Ok(synthesis) => {
                        progress.on_task_complete(&phase, moderator, true);
                        consensus::delegated(session, moderator.clone(), synthesis)
                    }
                    Err(e) => {
                        warn!(
                            "Moderator {} failed, falling back to local aggregation: {}",
                            moderator, e
                        );
                        progress.on_task_complete(&phase, moderator, false);
                        consensus::aggregate(session)
                            .with_fallback_reason(format!("moderator {}: {}", moderator, e))
                    }
                }
            }
        };

        progress.on_phase_complete(&phase);
        consensus
    }

    /// Call a participant, retrying restartable failures up to `retries` times
    async fn call_with_retries(
        gateway: &G,
        participant: &ParticipantId,
        method: &str,
        params: Value,
        timeout: Duration,
        retries: usize,
    ) -> Result<Value, ParticipantError> {
        let mut attempt = 0;
        loop {
            match gateway.call(participant, method, params.clone(), timeout).await {
                Err(e) if e.kind.is_restartable() && attempt < retries => {
                    attempt += 1;
                    warn!(
                        "Retrying {} on {} (attempt {}/{}): {}",
                        method, participant, attempt, retries, e
                    );
                }
                outcome => return outcome,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::spawn_spec::StaticSpawnSpecs;
    use async_trait::async_trait;
    use quorum_domain::{Perspective, SpawnSpec};
    use std::collections::{HashMap, VecDeque};
    use std::sync::Mutex;

    // ==================== Test Mocks ====================

    type Outcome = Result<Value, ParticipantError>;

    /// Gateway answering from per (participant, method) scripts.
    ///
    /// A script with several outcomes is consumed front to back; its last
    /// outcome repeats. Unscripted calls succeed with a value naming the
    /// participant.
    #[derive(Default)]
    struct ScriptedGateway {
        scripts: Mutex<HashMap<(String, String), VecDeque<Outcome>>>,
        calls: Mutex<Vec<(ParticipantId, String, Value)>>,
    }

    impl ScriptedGateway {
        fn new() -> Self {
            Self::default()
        }

        fn script(self, participant: &str, method: &str, outcomes: Vec<Outcome>) -> Self {
            self.scripts
                .lock()
                .unwrap()
                .insert((participant.to_string(), method.to_string()), outcomes.into());
            self
        }

        fn calls_to(&self, method: &str) -> Vec<(ParticipantId, Value)> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(_, m, _)| m == method)
                .map(|(id, _, params)| (id.clone(), params.clone()))
                .collect()
        }
    }

    #[async_trait]
    impl ParticipantGateway for ScriptedGateway {
        async fn call(
            &self,
            participant: &ParticipantId,
            method: &str,
            params: Value,
            _timeout: Duration,
        ) -> Result<Value, ParticipantError> {
            self.calls
                .lock()
                .unwrap()
                .push((participant.clone(), method.to_string(), params));

            let mut scripts = self.scripts.lock().unwrap();
            match scripts.get_mut(&(participant.to_string(), method.to_string())) {
                Some(outcomes) if outcomes.len() > 1 => outcomes.pop_front().unwrap(),
                Some(outcomes) => outcomes.front().cloned().unwrap(),
                None => Ok(json!({ "from": participant.as_str(), "method": method })),
            }
        }

        async fn shutdown(&self) {}
    }

    // ==================== Helpers ====================

    fn id(s: &str) -> ParticipantId {
        ParticipantId::new(s).unwrap()
    }

    fn roster(ids: &[&str]) -> Arc<StaticSpawnSpecs> {
        let mut specs = StaticSpawnSpecs::new();
        for s in ids {
            specs.insert(id(s), SpawnSpec::new(format!("{}-bin", s)));
        }
        Arc::new(specs)
    }

    fn timeout_error() -> ParticipantError {
        ParticipantError::new(FailureKind::CallTimeout, "no response within 100ms")
    }

    fn terminated() -> ParticipantError {
        ParticipantError::new(FailureKind::ClientTerminated, "process exited")
    }

    fn input(text: &str) -> RunCollaborationInput {
        RunCollaborationInput::from_text(text, None).unwrap()
    }

    // ==================== Tests ====================

    #[tokio::test]
    async fn test_partial_failure_reviews_only_successes() {
        let gateway = Arc::new(
            ScriptedGateway::new().script("b", METHOD_ANALYZE, vec![Err(timeout_error())]),
        );
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b", "c"]));

        let result = use_case.execute(input("find bugs")).await.unwrap();

        assert_eq!(
            result.results.keys().cloned().collect::<Vec<_>>(),
            vec![id("a"), id("c")]
        );
        assert_eq!(result.errors.len(), 1);
        assert_eq!(result.errors[&id("b")].kind, FailureKind::CallTimeout);
        assert!(result.cross_review);
        assert!(result.is_partial());

        let reviews = gateway.calls_to(METHOD_REVIEW);
        assert_eq!(reviews.len(), 2);
        for (reviewer, params) in reviews {
            let peers = params["peerResults"].as_object().unwrap();
            assert_eq!(peers.len(), 1);
            assert!(!peers.contains_key(reviewer.as_str()));
            assert!(!peers.contains_key("b"));
        }
        assert_eq!(result.reviews.len(), 2);
        assert_eq!(result.consensus.perspective, Perspective::Partial);
    }

    #[tokio::test]
    async fn test_all_failed() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .script("a", METHOD_ANALYZE, vec![Err(timeout_error())])
                .script("b", METHOD_ANALYZE, vec![Err(ParticipantError::remote(-32000, "boom"))]),
        );
        let use_case = RunCollaborationUseCase::new(gateway, roster(&["a", "b"]));

        let err = use_case.execute(input("task")).await.unwrap_err();
        match err {
            RunCollaborationError::AllParticipantsFailed { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[&id("a")].kind, FailureKind::CallTimeout);
                assert_eq!(errors[&id("b")].kind, FailureKind::RemoteError);
                assert_eq!(errors[&id("b")].code, Some(-32000));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_no_participants() {
        let gateway = Arc::new(ScriptedGateway::new());
        let use_case = RunCollaborationUseCase::new(gateway, roster(&[]));

        let err = use_case.execute(input("task")).await.unwrap_err();
        assert!(matches!(err, RunCollaborationError::NoParticipants));
    }

    #[test]
    fn test_blank_task_rejected() {
        let err = RunCollaborationInput::from_text("   ", None).unwrap_err();
        assert!(matches!(err, RunCollaborationError::InvalidTask(_)));
    }

    #[tokio::test]
    async fn test_requested_participants_override_roster() {
        let gateway = Arc::new(ScriptedGateway::new());
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b", "c"]));

        let result = use_case
            .execute(input("task").with_participants(vec![id("c"), id("a"), id("c")]))
            .await
            .unwrap();

        assert_eq!(result.participants, vec![id("c"), id("a")]);
        assert_eq!(gateway.calls_to(METHOD_ANALYZE).len(), 2);
    }

    #[tokio::test]
    async fn test_cross_review_disabled() {
        let gateway = Arc::new(ScriptedGateway::new());
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b"]));

        let result = use_case
            .execute(input("task").with_cross_review(false))
            .await
            .unwrap();

        assert!(!result.cross_review);
        assert!(result.reviews.is_empty());
        assert!(gateway.calls_to(METHOD_REVIEW).is_empty());
        assert_eq!(result.consensus.perspective, Perspective::Full);
    }

    #[tokio::test]
    async fn test_single_success_skips_review() {
        let gateway = Arc::new(
            ScriptedGateway::new().script("b", METHOD_ANALYZE, vec![Err(terminated())]),
        );
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b"]));

        let result = use_case.execute(input("task")).await.unwrap();

        assert!(!result.cross_review);
        assert!(gateway.calls_to(METHOD_REVIEW).is_empty());
        assert_eq!(result.consensus.perspective, Perspective::Single);
    }

    #[tokio::test]
    async fn test_review_failure_is_recorded() {
        let gateway = Arc::new(
            ScriptedGateway::new().script("a", METHOD_REVIEW, vec![Err(timeout_error())]),
        );
        let use_case = RunCollaborationUseCase::new(gateway, roster(&["a", "b"]));

        let result = use_case.execute(input("task")).await.unwrap();

        assert_eq!(result.results.len(), 2);
        assert!(result.errors.is_empty());
        assert_eq!(result.reviews.keys().cloned().collect::<Vec<_>>(), vec![id("b")]);
        assert_eq!(result.review_errors[&id("a")].kind, FailureKind::CallTimeout);
        assert_eq!(result.consensus.perspective, Perspective::Partial);
    }

    #[tokio::test]
    async fn test_restartable_failure_is_retried() {
        let gateway = Arc::new(ScriptedGateway::new().script(
            "a",
            METHOD_ANALYZE,
            vec![Err(terminated()), Ok(json!("second try"))],
        ));
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a"]))
            .with_params(CollaborationParams::default().with_analysis_retries(1));

        let result = use_case.execute(input("task")).await.unwrap();

        assert_eq!(result.results[&id("a")], json!("second try"));
        assert_eq!(gateway.calls_to(METHOD_ANALYZE).len(), 2);
    }

    #[tokio::test]
    async fn test_timeout_is_not_retried() {
        let gateway = Arc::new(ScriptedGateway::new().script(
            "a",
            METHOD_ANALYZE,
            vec![Err(timeout_error()), Ok(json!("never"))],
        ));
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b"]))
            .with_params(CollaborationParams::default().with_analysis_retries(3));

        let result = use_case.execute(input("task")).await.unwrap();

        assert_eq!(result.errors[&id("a")].kind, FailureKind::CallTimeout);
        assert_eq!(
            gateway
                .calls_to(METHOD_ANALYZE)
                .iter()
                .filter(|(p, _)| *p == id("a"))
                .count(),
            1
        );
    }

    #[tokio::test]
    async fn test_analysis_params_carry_task_and_content() {
        let gateway = Arc::new(ScriptedGateway::new());
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a"]));

        let input = RunCollaborationInput::from_text("review this", Some("fn main() {}".into()))
            .unwrap();
        use_case.execute(input).await.unwrap();

        let calls = gateway.calls_to(METHOD_ANALYZE);
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].1,
            json!({ "task": "review this", "content": "fn main() {}" })
        );
    }

    #[tokio::test]
    async fn test_local_consensus_agreement() {
        let gateway = Arc::new(
            ScriptedGateway::new()
                .script("a", METHOD_ANALYZE, vec![Ok(json!({"verdict": "ok"}))])
                .script("b", METHOD_ANALYZE, vec![Ok(json!({"verdict": "ok"}))]),
        );
        let use_case = RunCollaborationUseCase::new(gateway, roster(&["a", "b"]));

        let result = use_case
            .execute(input("task").with_cross_review(false))
            .await
            .unwrap();

        assert!(result.consensus.agreement);
        assert_eq!(result.consensus.contributors, vec![id("a"), id("b")]);
        assert_eq!(
            result.consensus.synthesis["results"]["a"],
            json!({"verdict": "ok"})
        );
    }

    #[tokio::test]
    async fn test_delegated_consensus() {
        let gateway = Arc::new(ScriptedGateway::new().script(
            "a",
            METHOD_SYNTHESIZE,
            vec![Ok(json!("merged"))],
        ));
        let use_case = RunCollaborationUseCase::new(gateway.clone(), roster(&["a", "b"]))
            .with_params(CollaborationParams::default().with_moderator(id("a")));

        let result = use_case.execute(input("task")).await.unwrap();

        assert_eq!(result.consensus.synthesis, json!("merged"));
        assert!(result.consensus.fallback_reason.is_none());

        let calls = gateway.calls_to(METHOD_SYNTHESIZE);
        assert_eq!(calls.len(), 1);
        assert!(calls[0].1["results"].get("b").is_some());
        assert!(calls[0].1["reviews"].get("a").is_some());
    }

    #[tokio::test]
    async fn test_delegated_consensus_falls_back() {
        let gateway = Arc::new(ScriptedGateway::new().script(
            "judge",
            METHOD_SYNTHESIZE,
            vec![Err(timeout_error())],
        ));
        let use_case = RunCollaborationUseCase::new(gateway, roster(&["a", "b"]))
            .with_params(CollaborationParams::default().with_moderator(id("judge")));

        let result = use_case.execute(input("task")).await.unwrap();

        let reason = result.consensus.fallback_reason.as_deref().unwrap();
        assert!(reason.contains("judge"));
        assert!(reason.contains("call-timeout"));
        assert!(result.consensus.synthesis.get("results").is_some());
    }
}
