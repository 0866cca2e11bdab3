//! # LessonBell Core
//!
//! Shared building blocks for the LessonBell notifier: the typed lesson
//! record, configuration, the error taxonomy, and the traits behind which the
//! record store and the outbound mail transport live.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::NotifierConfig;
pub use error::{LessonBellError, Result};
pub use traits::{Mailer, RecordStore};
pub use types::{EmailMessage, Lesson, LessonField, LessonFields};
