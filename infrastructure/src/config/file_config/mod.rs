//! Raw TOML configuration data types
//!
//! These structs represent the exact structure of the TOML config file.
//! They are deserialized directly and converted into application types.

mod collaboration;
mod lifecycle;
mod participants;
mod server;

pub use collaboration::FileCollaborationConfig;
pub use lifecycle::FileLifecycleConfig;
pub use participants::FileParticipantConfig;
pub use server::FileServerConfig;

use crate::participant::ClientOptions;
use quorum_application::{CollaborationParams, StaticSpawnSpecs};
use quorum_domain::ConfigIssue;
use serde::{Deserialize, Serialize};

/// Complete file configuration (raw TOML structure)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    /// Participant catalog
    pub participants: Vec<FileParticipantConfig>,
    /// Collaboration settings
    pub collaboration: FileCollaborationConfig,
    /// Participant lifecycle timing
    pub lifecycle: FileLifecycleConfig,
    /// Inbound server settings
    pub server: FileServerConfig,
}

impl FileConfig {
    /// Validate the entire configuration, returning all detected issues.
    ///
    /// Checks the participant catalog, the collaboration settings (including
    /// the moderator), lifecycle timing and server limits.
    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = participants::validate(&self.participants);
        issues.extend(self.collaboration.to_params(&self.participant_ids()).1);
        issues.extend(self.lifecycle.validate());
        issues.extend(self.server.validate());
        issues
    }

    /// Configured participant ids, in declaration order
    pub fn participant_ids(&self) -> Vec<String> {
        self.participants.iter().map(|p| p.id.clone()).collect()
    }

    /// Spawn specs for every usable participant entry
    pub fn spawn_specs(&self) -> StaticSpawnSpecs {
        participants::to_spawn_specs(&self.participants)
    }

    pub fn collaboration_params(&self) -> CollaborationParams {
        self.collaboration.to_params(&self.participant_ids()).0
    }

    pub fn client_options(&self) -> ClientOptions {
        ClientOptions::default()
            .with_handshake_timeout(self.lifecycle.handshake_timeout())
            .with_grace_period(self.lifecycle.grace_period())
            .with_max_line_bytes(self.server.max_line_bytes)
    }
}
