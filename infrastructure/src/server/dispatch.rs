//! Method table of the gateway server.
//!
//! Parameter validation and the static `initialize` / `list-capabilities`
//! payloads live here; [`GatewayServer`](super::GatewayServer) only routes.

use crate::participant::client::PROTOCOL_VERSION;
use crate::rpc::{ErrorCode, ErrorObject};
use quorum_application::{RunCollaborationError, RunCollaborationInput};
use quorum_domain::ParticipantId;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::time::Duration;

pub const METHOD_INITIALIZE: &str = "initialize";
pub const METHOD_LIST_CAPABILITIES: &str = "list-capabilities";
pub const METHOD_INVOKE: &str = "invoke";
pub const METHOD_SHUTDOWN: &str = "shutdown";

/// Name and version reported by `initialize`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: "quorum-gateway".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Result of `initialize`
pub fn initialize_result(info: &ServerInfo) -> Value {
    json!({
        "serverInfo": info,
        "protocolVersion": PROTOCOL_VERSION,
        "capabilities": {
            "operations": [METHOD_INVOKE],
        },
    })
}

/// Result of `list-capabilities`
pub fn capabilities() -> Value {
    json!({
        "operations": [{
            "name": METHOD_INVOKE,
            "description": "Run one collaboration session: every participant analyzes the task \
                            in parallel, successful participants review each other's results, \
                            and a consensus is synthesized.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "task": {
                        "type": "string",
                        "minLength": 1,
                        "description": "The task every participant analyzes",
                    },
                    "content": {
                        "type": "string",
                        "description": "Material the task refers to",
                    },
                    "participants": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Participant ids; defaults to every configured participant",
                    },
                    "crossReview": {
                        "type": "boolean",
                        "description": "Whether to run the cross-review phase",
                    },
                    "timeoutMs": {
                        "type": "integer",
                        "minimum": 1,
                        "description": "Per-call timeout in milliseconds",
                    },
                },
                "required": ["task"],
            },
        }],
    })
}

/// Raw `invoke` params as they arrive on the wire
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvokeParams {
    pub task: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub participants: Option<Vec<String>>,
    #[serde(default)]
    pub cross_review: Option<bool>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn invalid_params(message: impl Into<String>) -> ErrorObject {
    ErrorObject::new(ErrorCode::InvalidParams, message)
}

/// Validate `invoke` params into a use case input
pub fn parse_invoke(params: Option<Value>) -> Result<RunCollaborationInput, ErrorObject> {
    let Some(params) = params else {
        return Err(invalid_params("missing params"));
    };
    let params: InvokeParams = serde_json::from_value(params)
        .map_err(|e| invalid_params(format!("invalid params: {}", e)))?;

    let mut input = RunCollaborationInput::from_text(params.task, params.content)
        .map_err(|e| invalid_params(e.to_string()))?;

    if let Some(participants) = params.participants {
        let participants = participants
            .into_iter()
            .map(ParticipantId::new)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| invalid_params(e.to_string()))?;
        input = input.with_participants(participants);
    }

    if let Some(enabled) = params.cross_review {
        input = input.with_cross_review(enabled);
    }

    match params.timeout_ms {
        Some(0) => return Err(invalid_params("timeoutMs must be positive")),
        Some(ms) => input = input.with_call_timeout(Duration::from_millis(ms)),
        None => {}
    }

    Ok(input)
}

/// Protocol error for a session that produced no result
pub fn session_error(e: &RunCollaborationError) -> ErrorObject {
    match e {
        RunCollaborationError::AllParticipantsFailed { errors } => {
            ErrorObject::new(ErrorCode::InternalError, e.to_string())
                .with_data(json!({ "errors": errors }))
        }
        RunCollaborationError::NoParticipants | RunCollaborationError::InvalidTask(_) => {
            invalid_params(e.to_string())
        }
    }
}
