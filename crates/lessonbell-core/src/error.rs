//! Error types for LessonBell.

use thiserror::Error;

/// Every failure the notifier surfaces.
///
/// An unparsable deadline is deliberately absent: the calendar resolver
/// answers "not due" instead of failing.
#[derive(Debug, Error)]
pub enum LessonBellError {
    /// Incomplete or malformed trigger payload. No send was attempted.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The mail transport rejected or failed to deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Store connectivity, query or update failure.
    #[error("Store error: {0}")]
    Store(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl LessonBellError {
    /// Whether this error should abort a whole batch run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Store(_) | Self::Config(_) | Self::Io(_))
    }
}

pub type Result<T> = std::result::Result<T, LessonBellError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        assert!(LessonBellError::Store("down".into()).is_fatal());
        assert!(LessonBellError::Config("bad tz".into()).is_fatal());
        assert!(!LessonBellError::Transport("429".into()).is_fatal());
        assert!(!LessonBellError::Validation("missing".into()).is_fatal());
    }

    #[test]
    fn test_display() {
        let e = LessonBellError::Transport("SMTP send: timeout".into());
        assert_eq!(e.to_string(), "Transport error: SMTP send: timeout");
    }
}
