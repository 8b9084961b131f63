//! Error types for participant clients

use crate::rpc::{RpcError, TransportError};
use quorum_application::ParticipantError;
use quorum_domain::FailureKind;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for participant client operations
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors that can occur when talking to a participant process
#[derive(Error, Debug, Clone)]
pub enum ClientError {
    #[error("Failed to spawn participant {participant}: {message}")]
    Spawn { participant: String, message: String },

    #[error("Handshake with {participant} timed out after {after:?}")]
    HandshakeTimeout { participant: String, after: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{method} timed out after {after:?}")]
    CallTimeout { method: String, after: Duration },

    #[error("Remote error (code {code}): {message}")]
    Remote { code: i64, message: String },

    #[error("Client terminated: {0}")]
    ClientTerminated(String),

    #[error("Request id {0} is already in use")]
    DuplicateRequestId(u64),

    #[error("Unknown participant: {0}")]
    UnknownParticipant(String),

    #[error("Encoding error: {0}")]
    Encoding(String),
}

impl ClientError {
    /// Failure classification recorded in a collaboration session
    pub fn kind(&self) -> FailureKind {
        match self {
            ClientError::Spawn { .. } => FailureKind::SpawnError,
            ClientError::HandshakeTimeout { .. } => FailureKind::HandshakeTimeout,
            ClientError::Transport(_) => FailureKind::TransportError,
            ClientError::CallTimeout { .. } => FailureKind::CallTimeout,
            ClientError::Remote { .. } => FailureKind::RemoteError,
            ClientError::ClientTerminated(_) => FailureKind::ClientTerminated,
            ClientError::DuplicateRequestId(_) => FailureKind::DuplicateRequestId,
            ClientError::UnknownParticipant(_) => FailureKind::UnknownParticipant,
            ClientError::Encoding(_) => FailureKind::EncodingError,
        }
    }
}

impl From<RpcError> for ClientError {
    fn from(e: RpcError) -> Self {
        match e {
            RpcError::Timeout { method, after } => ClientError::CallTimeout { method, after },
            RpcError::Remote(error) => ClientError::Remote {
                code: error.code,
                message: error.message,
            },
            RpcError::Terminated(reason) => ClientError::ClientTerminated(reason),
            RpcError::DuplicateRequestId(id) => ClientError::DuplicateRequestId(id),
            RpcError::Transport(TransportError::Codec(e)) => ClientError::Encoding(e.to_string()),
            RpcError::Transport(TransportError::TransportClosed) => {
                ClientError::ClientTerminated("transport closed".to_string())
            }
            RpcError::Transport(e) => ClientError::Transport(e.to_string()),
        }
    }
}

impl From<ClientError> for ParticipantError {
    fn from(e: ClientError) -> Self {
        match e {
            ClientError::Remote { code, message } => ParticipantError::remote(code, message),
            other => ParticipantError::new(other.kind(), other.to_string()),
        }
    }
}
