//! Participant lifecycle timing from TOML (`[lifecycle]` section)
//!
//! ```toml
//! [lifecycle]
//! handshake_timeout_secs = 15
//! grace_period_secs = 5
//! close_all_deadline_secs = 10
//! ```

use quorum_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileLifecycleConfig {
    /// Bound on the `initialize` handshake
    pub handshake_timeout_secs: u64,
    /// Time a participant gets to exit after SIGTERM
    pub grace_period_secs: u64,
    /// Overall bound on closing every participant at shutdown
    pub close_all_deadline_secs: u64,
}

impl Default for FileLifecycleConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_secs: 15,
            grace_period_secs: 5,
            close_all_deadline_secs: 10,
        }
    }
}

impl FileLifecycleConfig {
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    pub fn grace_period(&self) -> Duration {
        Duration::from_secs(self.grace_period_secs)
    }

    pub fn close_all_deadline(&self) -> Duration {
        Duration::from_secs(self.close_all_deadline_secs)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        for (field, value) in [
            ("lifecycle.handshake_timeout_secs", self.handshake_timeout_secs),
            ("lifecycle.close_all_deadline_secs", self.close_all_deadline_secs),
        ] {
            if value == 0 {
                issues.push(ConfigIssue::error(
                    ConfigIssueCode::ZeroDuration {
                        field: field.to_string(),
                    },
                    format!("{} cannot be 0", field),
                ));
            }
        }
        if self.close_all_deadline_secs < self.grace_period_secs {
            issues.push(ConfigIssue::warning(
                ConfigIssueCode::InvalidValue {
                    field: "lifecycle.close_all_deadline_secs".to_string(),
                },
                "lifecycle.close_all_deadline_secs is shorter than the grace period; \
                 participants will be killed before the grace period ends",
            ));
        }
        issues
    }
}
