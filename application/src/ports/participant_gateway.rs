//! Participant gateway port
//!
//! Defines how the application layer talks to participants. The
//! infrastructure adapter owns process spawning, handshakes, correlation
//! and teardown; the use case only sees `call` and a typed failure.

use async_trait::async_trait;
use quorum_domain::{FailureKind, ParticipantFailure, ParticipantId};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Failure of a single participant call
///
/// Carries the [`FailureKind`] across the port boundary so the orchestrator
/// can record (and decide whether to retry) without knowing about
/// processes or transports.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct ParticipantError {
    pub kind: FailureKind,
    pub message: String,
    /// Error code reported by the participant (remote errors only)
    pub code: Option<i64>,
}

impl ParticipantError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            code: None,
        }
    }

    /// An error response sent back by the participant itself
    pub fn remote(code: i64, message: impl Into<String>) -> Self {
        Self {
            kind: FailureKind::RemoteError,
            message: message.into(),
            code: Some(code),
        }
    }

    /// Convert into the record stored in a session
    pub fn into_failure(self) -> ParticipantFailure {
        let failure = ParticipantFailure::new(self.kind, self.message);
        match self.code {
            Some(code) => failure.with_code(code),
            None => failure,
        }
    }
}

/// Gateway for participant communication
///
/// This port defines how the application layer reaches participants.
/// Implementations (adapters) live in the infrastructure layer.
#[async_trait]
pub trait ParticipantGateway: Send + Sync {
    /// Issue one request to a participant and wait for its result.
    ///
    /// The participant is started on demand. The result payload is returned
    /// unmodified; no retries happen behind this call.
    async fn call(
        &self,
        participant: &ParticipantId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ParticipantError>;

    /// Tear down every participant, resolving in-flight calls as terminated.
    async fn shutdown(&self);
}
