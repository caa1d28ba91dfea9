use serde::{Deserialize, Serialize};

/// Severity of a user-visible notice.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoticeLevel {
    /// Degraded but usable, e.g. live updates unavailable.
    Warning,
    Error,
}

/// A message the presentation layer should show to the user.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
    /// Underlying cause, for a details view or console.
    pub detail: Option<String>,
}

impl Notice {
    pub fn error(message: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
            detail: Some(detail.to_string()),
        }
    }

    pub fn warning(message: impl Into<String>, detail: impl ToString) -> Self {
        Self {
            level: NoticeLevel::Warning,
            ..Self::error(message, detail)
        }
    }
}
