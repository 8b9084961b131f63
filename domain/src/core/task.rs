//! Task value object

use super::error::DomainError;
use serde::{Deserialize, Serialize};

/// The analysis request handed to every participant (Value Object)
///
/// Carries the task text and, optionally, the content the task refers to
/// (a document, a diff, a log excerpt). The text is never empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
}

impl Task {
    /// Create a new task, rejecting empty or whitespace-only text
    pub fn new(text: impl Into<String>) -> Result<Self, DomainError> {
        let text = text.into();
        if text.trim().is_empty() {
            return Err(DomainError::InvalidTask(
                "task text cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            text,
            content: None,
        })
    }

    /// Attach the content the task refers to
    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    /// Get the task text
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Get the attached content, if any
    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}
