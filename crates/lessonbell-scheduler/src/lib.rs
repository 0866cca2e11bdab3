//! # LessonBell Scheduler
//!
//! Deadline reminders, retried each run until the lesson is marked notified, plus the
//! on-demand "Timeline changed" notification.
//!
//! ## Architecture
//! ```text
//! Daily batch (external cron, or spawn_daily_batch "0 8 * * *")
//!   └── engine::run_batch
//!         ├── RecordStore::fetch_candidates   (not notified, Timeline set)
//!         ├── eligibility::select_due         (calendar::is_due_on, today + N in tz)
//!         └── per lesson: notify::format_message → Mailer::send → RecordStore::mark_notified
//!
//! Trigger (POST /api/notify-timeline-change)
//!   └── trigger::handle_change → notify::format_message → Mailer::send
//! ```

pub mod calendar;
pub mod cron;
pub mod eligibility;
pub mod engine;
pub mod notify;
pub mod persistence;
pub mod store;
pub mod trigger;

pub use eligibility::DueWindow;
pub use engine::{BatchReport, BatchSettings, DeliveryFailure, FailureStage};
pub use notify::MessageKind;
pub use persistence::SqliteLessonStore;
pub use store::{JsonFileStore, MemoryStore};

use std::path::Path;
use std::sync::Arc;

use lessonbell_core::RecordStore;
use lessonbell_core::config::StoreConfig;
use lessonbell_core::error::Result;

/// Open the store the config points at: a JSON document file or SQLite.
pub fn open_store(config: &StoreConfig) -> Result<Arc<dyn RecordStore>> {
    let uri = config.resolved_uri();
    if config.is_json_file() {
        tracing::info!("💾 Using JSON lesson file: {uri}");
        return Ok(Arc::new(JsonFileStore::new(Path::new(&uri))));
    }
    let store = SqliteLessonStore::open(Path::new(&uri), &config.database, &config.collection)?;
    tracing::info!("💾 Using SQLite lesson store: {uri} ({}.{})", config.database, config.collection);
    Ok(Arc::new(store))
}

/// Copy every readable lesson from a JSON document file (for example a
/// `mongoexport --jsonArray` dump) into SQLite. Returns how many were written.
pub fn import_json(source: &Path, target: &SqliteLessonStore) -> Result<usize> {
    if !source.exists() {
        return Err(lessonbell_core::LessonBellError::Store(format!(
            "Import source not found: {}",
            source.display()
        )));
    }
    let lessons = JsonFileStore::new(source).load()?;
    for lesson in &lessons {
        target.upsert(lesson)?;
    }
    tracing::info!("📥 Imported {} lesson(s) from {}", lessons.len(), source.display());
    Ok(lessons.len())
}
