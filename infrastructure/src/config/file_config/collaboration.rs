//! Collaboration settings from TOML (`[collaboration]` section)
//!
//! Example configuration:
//!
//! ```toml
//! [collaboration]
//! cross_review = true
//! call_timeout_secs = 120
//! analysis_retries = 0
//! consensus = "delegated"      # or "local"
//! moderator = "participant-a"
//! ```

use quorum_application::{CollaborationParams, ConsensusMode};
use quorum_domain::{ConfigIssue, ConfigIssueCode, ParticipantId};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Raw `[collaboration]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCollaborationConfig {
    /// Run the cross-review phase unless a request says otherwise
    pub cross_review: bool,
    /// Timeout for every participant call
    pub call_timeout_secs: u64,
    /// Extra analysis attempts after a restartable failure
    pub analysis_retries: usize,
    /// "local" or "delegated"
    pub consensus: String,
    /// Participant that synthesizes in delegated mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub moderator: Option<String>,
}

impl Default for FileCollaborationConfig {
    fn default() -> Self {
        Self {
            cross_review: true,
            call_timeout_secs: 120,
            analysis_retries: 0,
            consensus: "local".to_string(),
            moderator: None,
        }
    }
}

impl FileCollaborationConfig {
    /// Parse the consensus mode.
    ///
    /// `known` lists the configured participant ids; a moderator outside it
    /// is reported. Unknown modes fall back to local aggregation.
    pub fn parse_consensus(&self, known: &[String]) -> (ConsensusMode, Vec<ConfigIssue>) {
        match self.consensus.to_lowercase().as_str() {
            "local" => (ConsensusMode::Local, vec![]),
            "delegated" => {
                let moderator = self
                    .moderator
                    .as_ref()
                    .filter(|m| known.contains(m))
                    .and_then(|m| ParticipantId::new(m.clone()).ok());
                match moderator {
                    Some(moderator) => (ConsensusMode::Delegated { moderator }, vec![]),
                    None => {
                        let message = match &self.moderator {
                            Some(m) => format!(
                                "collaboration.moderator: '{}' is not a configured participant",
                                m
                            ),
                            None => "collaboration.consensus = \"delegated\" requires a moderator"
                                .to_string(),
                        };
                        let issue = ConfigIssue::error(
                            ConfigIssueCode::InvalidModerator {
                                moderator: self.moderator.clone(),
                            },
                            message,
                        );
                        (ConsensusMode::Local, vec![issue])
                    }
                }
            }
            _ => {
                let issue = ConfigIssue::warning(
                    ConfigIssueCode::InvalidEnumValue {
                        field: "collaboration.consensus".to_string(),
                        value: self.consensus.clone(),
                        valid_values: vec!["local".to_string(), "delegated".to_string()],
                    },
                    format!(
                        "collaboration.consensus: unknown value '{}', falling back to 'local'",
                        self.consensus
                    ),
                );
                (ConsensusMode::Local, vec![issue])
            }
        }
    }

    /// Convert to use case parameters
    pub fn to_params(&self, known: &[String]) -> (CollaborationParams, Vec<ConfigIssue>) {
        let mut issues = Vec::new();
        if self.call_timeout_secs == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroDuration {
                    field: "collaboration.call_timeout_secs".to_string(),
                },
                "collaboration.call_timeout_secs cannot be 0",
            ));
        }

        let (consensus, consensus_issues) = self.parse_consensus(known);
        issues.extend(consensus_issues);

        let params = CollaborationParams {
            call_timeout: Duration::from_secs(self.call_timeout_secs),
            cross_review: self.cross_review,
            analysis_retries: self.analysis_retries,
            consensus,
        };
        (params, issues)
    }
}
