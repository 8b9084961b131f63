//! Inbound server settings from TOML (`[server]` section)
//!
//! ```toml
//! [server]
//! session_timeout_secs = 600
//! max_line_bytes = 16777216
//! ```

use crate::rpc::transport::DEFAULT_MAX_LINE_BYTES;
use quorum_domain::{ConfigIssue, ConfigIssueCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileServerConfig {
    /// Overall deadline for one `invoke`; unbounded when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_timeout_secs: Option<u64>,
    /// Longest accepted line, inbound and from participants
    pub max_line_bytes: usize,
}

impl Default for FileServerConfig {
    fn default() -> Self {
        Self {
            session_timeout_secs: None,
            max_line_bytes: DEFAULT_MAX_LINE_BYTES,
        }
    }
}

impl FileServerConfig {
    pub fn session_timeout(&self) -> Option<Duration> {
        self.session_timeout_secs.map(Duration::from_secs)
    }

    pub fn validate(&self) -> Vec<ConfigIssue> {
        let mut issues = Vec::new();
        if self.session_timeout_secs == Some(0) {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::ZeroDuration {
                    field: "server.session_timeout_secs".to_string(),
                },
                "server.session_timeout_secs cannot be 0; omit it for no deadline",
            ));
        }
        if self.max_line_bytes == 0 {
            issues.push(ConfigIssue::error(
                ConfigIssueCode::InvalidValue {
                    field: "server.max_line_bytes".to_string(),
                },
                "server.max_line_bytes cannot be 0",
            ));
        }
        issues
    }
}
