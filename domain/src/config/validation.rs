//! Configuration validation results.
//!
//! Loaders check the participant catalog and the collaboration settings and
//! report structured issues with a severity, so the binary can abort on
//! errors and merely log warnings.

/// Severity level of a configuration issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Fatal: the configuration cannot work at all.
    Error,
    /// Non-fatal: the configuration works but may not behave as expected.
    Warning,
}

/// Identifies a specific configuration issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigIssueCode {
    /// The same participant id is declared more than once.
    DuplicateParticipant { id: String },
    /// A participant id is empty or padded with whitespace.
    InvalidParticipantId { id: String },
    /// A participant has an empty command.
    EmptyCommand { id: String },
    /// A participant's command cannot be found on `PATH`.
    CommandNotFound { id: String, command: String },
    /// A field holds a value outside its accepted set.
    InvalidEnumValue {
        field: String,
        value: String,
        valid_values: Vec<String>,
    },
    /// Delegated consensus without a moderator, or with an unknown one.
    InvalidModerator { moderator: Option<String> },
    /// A timeout or deadline is zero.
    ZeroDuration { field: String },
    /// A field holds a value that cannot work together with the rest.
    InvalidValue { field: String },
    /// No participants are configured at all.
    NoParticipants,
}

/// A detected issue in the configuration.
#[derive(Debug, Clone)]
pub struct ConfigIssue {
    pub severity: Severity,
    pub code: ConfigIssueCode,
    pub message: String,
}

impl ConfigIssue {
    pub fn error(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
        }
    }

    pub fn warning(code: ConfigIssueCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            code,
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}
