//! Participant gateway implementation over spawned processes

use super::registry::{ClientRegistry, CloseSummary};
use async_trait::async_trait;
use quorum_application::ports::participant_gateway::{ParticipantError, ParticipantGateway};
use quorum_domain::ParticipantId;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Default deadline for closing every participant at shutdown
pub const DEFAULT_CLOSE_DEADLINE: Duration = Duration::from_secs(10);

/// [`ParticipantGateway`] backed by a [`ClientRegistry`]
pub struct ProcessParticipantGateway {
    registry: Arc<ClientRegistry>,
    close_deadline: Duration,
}

impl ProcessParticipantGateway {
    pub fn new(registry: Arc<ClientRegistry>) -> Self {
        Self {
            registry,
            close_deadline: DEFAULT_CLOSE_DEADLINE,
        }
    }

    pub fn with_close_deadline(mut self, deadline: Duration) -> Self {
        self.close_deadline = deadline;
        self
    }

    /// Get a reference to the underlying registry
    pub fn registry(&self) -> &Arc<ClientRegistry> {
        &self.registry
    }

    /// Close every participant and report how it went
    pub async fn close_all(&self) -> CloseSummary {
        self.registry.close_all(self.close_deadline).await
    }
}

#[async_trait]
impl ParticipantGateway for ProcessParticipantGateway {
    async fn call(
        &self,
        participant: &ParticipantId,
        method: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, ParticipantError> {
        let client = self.registry.get_or_create(participant).await?;
        let result = client.call(method, params, timeout).await;
        if let Err(e) = &result {
            debug!("{} on {} failed: {}", method, participant, e);
        }
        result.map_err(Into::into)
    }

    async fn shutdown(&self) {
        self.close_all().await;
    }
}
