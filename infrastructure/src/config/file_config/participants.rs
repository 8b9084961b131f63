//! Participant catalog from TOML (`[[participants]]` tables)
//!
//! Example configuration:
//!
//! ```toml
//! [[participants]]
//! id = "participant-a"
//! command = "my-analyzer"
//! args = ["--stdio"]
//! env = { LOG_LEVEL = "warn" }
//! working_dir = "/tmp"
//! ```

use quorum_application::StaticSpawnSpecs;
use quorum_domain::{ConfigIssue, ConfigIssueCode, ParticipantId, SpawnSpec};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// One participant entry
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileParticipantConfig {
    /// Stable participant identity
    pub id: String,
    /// Program to launch
    pub command: String,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,
}

impl FileParticipantConfig {
    pub fn to_spawn_spec(&self) -> SpawnSpec {
        SpawnSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            env: self.env.clone(),
            working_dir: self.working_dir.clone(),
        }
    }

    /// Whether the command can be resolved the way the OS would
    fn command_resolves(&self) -> bool {
        let command = Path::new(&self.command);
        if command.components().count() > 1 {
            let command = match &self.working_dir {
                Some(dir) if command.is_relative() => dir.join(command),
                _ => command.to_path_buf(),
            };
            return command.exists();
        }
        which::which(&self.command).is_ok()
    }
}

/// Build the spawn spec catalog, skipping entries that cannot work
pub fn to_spawn_specs(participants: &[FileParticipantConfig]) -> StaticSpawnSpecs {
    let mut specs = StaticSpawnSpecs::new();
    for entry in participants {
        if entry.command.trim().is_empty() {
            continue;
        }
        if let Ok(id) = ParticipantId::new(entry.id.clone()) {
            specs.insert(id, entry.to_spawn_spec());
        }
    }
    specs
}

/// Validate the participant catalog
pub fn validate(participants: &[FileParticipantConfig]) -> Vec<ConfigIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    if participants.is_empty() {
        issues.push(ConfigIssue::error(
            ConfigIssueCode::NoParticipants,
            "no participants configured; add at least one [[participants]] table",
        ));
    }

    for entry in participants {
        if ParticipantId::new(entry.id.clone()).is_err() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidParticipantId {
                    id: entry.id.clone(),
                },
                format!("participants: invalid id '{}'", entry.id),
            ));
            continue;
        }

        if !seen.insert(entry.id.as_str()) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::DuplicateParticipant {
                    id: entry.id.clone(),
                },
                format!("participants: '{}' is declared more than once", entry.id),
            ));
        }

        if entry.command.trim().is_empty() {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::EmptyCommand {
                    id: entry.id.clone(),
                },
                format!("participants.{}: command cannot be empty", entry.id),
            ));
        } else if !entry.command_resolves() {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::CommandNotFound {
                    id: entry.id.clone(),
                    command: entry.command.clone(),
                },
                format!(
                    "participants.{}: command '{}' not found; spawning it will fail",
                    entry.id, entry.command
                ),
            ));
        }
    }

    issues
}
