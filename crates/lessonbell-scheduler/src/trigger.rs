//! Trigger adapter — the on-demand "Timeline changed" notification.
//!
//! Independent of the batch: it never reads or writes the notified marker and
//! may fire any number of times for the same lesson.

use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::{EmailMessage, LessonFields, Mailer};

use crate::notify::{self, MessageKind};

/// Message used for every validation failure on this path.
pub const MISSING_LESSON_DATA: &str = "Missing lesson data";

/// Require a non-empty Customer and Timeline.
pub fn validate(payload: &LessonFields) -> Result<()> {
    if payload.customer().is_none() || payload.timeline().is_none() {
        return Err(LessonBellError::Validation(MISSING_LESSON_DATA.into()));
    }
    Ok(())
}

/// Validate, render and send one timeline-changed email. Returns what was sent.
///
/// Send failures are returned as-is; nothing is retried or persisted.
pub async fn handle_change(payload: &LessonFields, mailer: &dyn Mailer) -> Result<EmailMessage> {
    validate(payload)?;
    let message = notify::format_message(payload, MessageKind::TimelineChanged);
    mailer.send(&message).await?;
    tracing::info!(
        "📤 Timeline change notification sent for: {} | Timeline: {}",
        payload.customer().unwrap_or_default(),
        payload.timeline().unwrap_or_default()
    );
    Ok(message)
}
