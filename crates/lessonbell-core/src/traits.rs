//! Seams to the external collaborators: the record store and the mail transport.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::{EmailMessage, Lesson};

/// Persistent lesson store.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Backend name, for logs.
    fn name(&self) -> &str;

    /// Candidate lessons: not yet notified and with a non-empty Timeline.
    /// Callers must not rely on the filter being exact.
    async fn fetch_candidates(&self) -> Result<Vec<Lesson>>;

    /// Set `notified = true, notifiedAt = at` on one lesson.
    ///
    /// Only flips lessons that are not already notified; returns whether this
    /// call changed the record. An unknown id is a `Store` error.
    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> Result<bool>;
}

/// Outbound mail transport. Recipients and sender come from its own config.
#[async_trait]
pub trait Mailer: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, message: &EmailMessage) -> Result<()>;
}
