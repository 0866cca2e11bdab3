//! Lightweight record stores.
//! `JsonFileStore` reads lessons from a JSON array of documents on disk (a `mongoexport --jsonArray` dump works).
//! `MemoryStore` keeps them in process, for dry runs and tests.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::types::id_text;
use lessonbell_core::{Lesson, RecordStore};
use serde_json::Value;

/// The store-side query: not notified, Timeline present and non-empty.
fn is_candidate(lesson: &Lesson) -> bool {
    !lesson.notified && lesson.timeline().is_some()
}

/// Apply the notified marker in place. Returns whether it flipped.
fn mark(lessons: &mut [Lesson], id: &str, at: DateTime<Utc>) -> Result<bool> {
    let lesson = lessons
        .iter_mut()
        .find(|l| l.id == id)
        .ok_or_else(|| LessonBellError::Store(format!("No lesson with id {id}")))?;
    if lesson.notified {
        return Ok(false);
    }
    lesson.notified = true;
    lesson.notified_at = Some(at);
    Ok(true)
}

/// File-based lesson store.
///
/// Documents stay as they were written by whoever owns the file. Reads decode
/// them into [`Lesson`]; marking edits only `notified` and `notifiedAt` on the
/// matching document and leaves every other key and document untouched.
pub struct JsonFileStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process.
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    /// Raw documents. A missing file is an empty store; a file that is not a
    /// JSON array is a store error.
    pub fn documents(&self) -> Result<Vec<Value>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&self.path)
            .map_err(|e| LessonBellError::Store(format!("Read {}: {e}", self.path.display())))?;
        serde_json::from_str(&json)
            .map_err(|e| LessonBellError::Store(format!("Parse {}: {e}", self.path.display())))
    }

    /// Every readable lesson. Documents that do not decode are skipped with a warning.
    pub fn load(&self) -> Result<Vec<Lesson>> {
        Ok(self
            .documents()?
            .into_iter()
            .enumerate()
            .filter_map(|(i, doc)| match serde_json::from_value::<Lesson>(doc) {
                Ok(lesson) => Some(lesson),
                Err(e) => {
                    tracing::warn!("⚠️ Skipping document #{i} in {}: {e}", self.path.display());
                    None
                }
            })
            .collect())
    }

    /// Overwrite the file with `documents`.
    fn write_documents(&self, documents: &[Value]) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(documents)?;
        // write-then-rename so a crash never leaves half a file
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, &json)
            .map_err(|e| LessonBellError::Store(format!("Write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &self.path)
            .map_err(|e| LessonBellError::Store(format!("Replace {}: {e}", self.path.display())))?;
        tracing::debug!("Saved {} documents to {}", documents.len(), self.path.display());
        Ok(())
    }
}

/// Set the marker on the document with `id`. Returns whether it flipped.
fn mark_document(documents: &mut [Value], id: &str, at: DateTime<Utc>) -> Result<bool> {
    let doc = documents
        .iter_mut()
        .filter_map(Value::as_object_mut)
        .find(|doc| {
            doc.get("_id")
                .or_else(|| doc.get("id"))
                .and_then(id_text)
                .is_some_and(|doc_id| doc_id == id)
        })
        .ok_or_else(|| LessonBellError::Store(format!("No lesson with id {id}")))?;
    if doc.get("notified") == Some(&Value::Bool(true)) {
        return Ok(false);
    }
    doc.insert("notified".into(), Value::Bool(true));
    doc.insert("notifiedAt".into(), Value::String(at.to_rfc3339()));
    Ok(true)
}

#[async_trait]
impl RecordStore for JsonFileStore {
    fn name(&self) -> &str {
        "json-file"
    }

    async fn fetch_candidates(&self) -> Result<Vec<Lesson>> {
        Ok(self.load()?.into_iter().filter(is_candidate).collect())
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| LessonBellError::Store("json store lock poisoned".into()))?;
        let mut documents = self.documents()?;
        let flipped = mark_document(&mut documents, id, at)?;
        if flipped {
            self.write_documents(&documents)?;
        }
        Ok(flipped)
    }
}

/// In-process lesson store.
#[derive(Default)]
pub struct MemoryStore {
    lessons: Mutex<Vec<Lesson>>,
    fail_fetch: Mutex<Option<String>>,
    fail_mark_for: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new(lessons: Vec<Lesson>) -> Self {
        Self {
            lessons: Mutex::new(lessons),
            ..Default::default()
        }
    }

    /// Snapshot of all lessons, including notified ones.
    pub fn all(&self) -> Vec<Lesson> {
        self.lessons.lock().map(|l| l.clone()).unwrap_or_default()
    }

    pub fn get(&self, id: &str) -> Option<Lesson> {
        self.all().into_iter().find(|l| l.id == id)
    }

    /// Make every subsequent fetch fail with `reason`.
    pub fn fail_fetches(&self, reason: &str) {
        if let Ok(mut f) = self.fail_fetch.lock() {
            *f = Some(reason.to_string());
        }
    }

    /// Make marking this id fail.
    pub fn fail_marks_for(&self, id: &str) {
        if let Ok(mut f) = self.fail_mark_for.lock() {
            f.push(id.to_string());
        }
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn fetch_candidates(&self) -> Result<Vec<Lesson>> {
        if let Some(reason) = self.fail_fetch.lock().ok().and_then(|f| f.clone()) {
            return Err(LessonBellError::Store(reason));
        }
        let lessons = self
            .lessons
            .lock()
            .map_err(|_| LessonBellError::Store("memory store lock poisoned".into()))?;
        Ok(lessons.iter().filter(|l| is_candidate(l)).cloned().collect())
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let failing = self
            .fail_mark_for
            .lock()
            .map(|f| f.iter().any(|x| x == id))
            .unwrap_or(false);
        if failing {
            return Err(LessonBellError::Store(format!("update rejected for {id}")));
        }
        let mut lessons = self
            .lessons
            .lock()
            .map_err(|_| LessonBellError::Store("memory store lock poisoned".into()))?;
        mark(&mut lessons, id, at)
    }
}
