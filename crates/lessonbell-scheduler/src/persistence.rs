//! SQLite-backed lesson store.
//! The database file is attached under the configured schema name and the
//! lessons live in the configured table, one column per register field.

use std::path::Path;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lessonbell_core::error::{LessonBellError, Result};
use lessonbell_core::{Lesson, LessonField, LessonFields, RecordStore};

/// Register field → column name.
const FIELD_COLUMNS: [(LessonField, &str); 10] = [
    (LessonField::Customer, "customer"),
    (LessonField::Platform, "platform"),
    (LessonField::Issue, "issue"),
    (LessonField::DetailedDescription, "detailed_description"),
    (LessonField::ImpactLevel, "impact_level"),
    (LessonField::LiableStakeholder, "liable_stakeholder"),
    (LessonField::PreventiveAction, "preventive_action"),
    (LessonField::LessonsLearned, "lessons_learned"),
    (LessonField::Status, "status"),
    (LessonField::Timeline, "timeline"),
];

fn db_err(context: &str) -> impl Fn(rusqlite::Error) -> LessonBellError + '_ {
    move |e| LessonBellError::Store(format!("{context}: {e}"))
}

/// SQLite lesson store.
pub struct SqliteLessonStore {
    conn: Mutex<rusqlite::Connection>,
    /// Fully qualified, quoted table name: "schema"."table".
    table: String,
}

impl SqliteLessonStore {
    /// Open (or create) `path`, attach it as `database`, and make sure
    /// `collection` exists. `:memory:` gives a throwaway store.
    pub fn open(path: &Path, database: &str, collection: &str) -> Result<Self> {
        for (what, ident) in [("database", database), ("collection", collection)] {
            let valid = !ident.is_empty()
                && ident.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return Err(LessonBellError::Config(format!("Invalid {what} name '{ident}'")));
            }
        }
        if matches!(database.to_lowercase().as_str(), "main" | "temp") {
            return Err(LessonBellError::Config(format!(
                "database name '{database}' is reserved by SQLite"
            )));
        }

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let conn = rusqlite::Connection::open_in_memory().map_err(db_err("DB open"))?;
        conn.execute(
            &format!("ATTACH DATABASE ?1 AS \"{database}\""),
            [path.to_string_lossy().as_ref()],
        )
        .map_err(db_err("DB attach"))?;

        let store = Self {
            conn: Mutex::new(conn),
            table: format!("\"{database}\".\"{collection}\""),
        };
        store.migrate()?;
        tracing::debug!("SQLite lesson store ready: {} ({})", path.display(), store.table);
        Ok(store)
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.conn
            .lock()
            .map_err(|_| LessonBellError::Store("sqlite connection lock poisoned".into()))
    }

    /// Create the lessons table.
    fn migrate(&self) -> Result<()> {
        let field_cols: Vec<String> = FIELD_COLUMNS
            .iter()
            .map(|(_, col)| format!("{col} TEXT"))
            .collect();
        let sql = format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                id TEXT PRIMARY KEY,
                {fields},
                notified INTEGER NOT NULL DEFAULT 0,
                notified_at TEXT,
                created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            )",
            table = self.table,
            fields = field_cols.join(",\n                "),
        );
        self.conn()?.execute_batch(&sql).map_err(db_err("Migration"))?;
        Ok(())
    }

    fn select_columns() -> String {
        let fields: Vec<&str> = FIELD_COLUMNS.iter().map(|(_, c)| *c).collect();
        format!("id, {}, notified, notified_at", fields.join(", "))
    }

    fn row_to_lesson(row: &rusqlite::Row<'_>) -> rusqlite::Result<Lesson> {
        let id: String = row.get(0)?;
        let mut fields = LessonFields::default();
        for (i, (field, _)) in FIELD_COLUMNS.iter().enumerate() {
            *fields.slot_mut(*field) = row.get(i + 1)?;
        }
        let notified: bool = row.get::<_, i64>(FIELD_COLUMNS.len() + 1)? != 0;
        let notified_at: Option<String> = row.get(FIELD_COLUMNS.len() + 2)?;
        Ok(Lesson {
            id,
            fields,
            notified,
            notified_at: notified_at
                .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
        })
    }

    /// Insert a lesson or update its fields. The notified marker only moves
    /// forward: an existing `notified = 1` and its timestamp are kept.
    pub fn upsert(&self, lesson: &Lesson) -> Result<()> {
        let cols: Vec<&str> = FIELD_COLUMNS.iter().map(|(_, c)| *c).collect();
        let placeholders: Vec<String> = (2..=cols.len() + 1).map(|i| format!("?{i}")).collect();
        let n = cols.len();
        let sql = format!(
            "INSERT INTO {table} (id, {cols}, notified, notified_at, created_at)
             VALUES (?1, {ph}, ?{a}, ?{b}, ?{c})
             ON CONFLICT(id) DO UPDATE SET {updates},
                 notified = MAX(notified, excluded.notified),
                 notified_at = COALESCE(notified_at, excluded.notified_at)",
            table = self.table,
            cols = cols.join(", "),
            ph = placeholders.join(", "),
            a = n + 2,
            b = n + 3,
            c = n + 4,
            updates = cols
                .iter()
                .map(|c| format!("{c} = excluded.{c}"))
                .collect::<Vec<_>>()
                .join(", "),
        );

        let mut values: Vec<Option<String>> = vec![Some(lesson.id.clone())];
        for (field, _) in FIELD_COLUMNS.iter() {
            values.push(lesson.fields.slot(*field).clone());
        }
        let notified = i64::from(lesson.notified);
        let notified_at = lesson.notified_at.map(|t| t.to_rfc3339());
        let created_at = Utc::now().to_rfc3339();

        let mut params: Vec<&dyn rusqlite::ToSql> =
            values.iter().map(|v| v as &dyn rusqlite::ToSql).collect();
        params.push(&notified);
        params.push(&notified_at);
        params.push(&created_at);

        self.conn()?
            .execute(&sql, params.as_slice())
            .map_err(db_err("Save lesson"))?;
        Ok(())
    }

    /// Every lesson, in insertion order.
    pub fn all(&self) -> Result<Vec<Lesson>> {
        self.query(&format!(
            "SELECT {} FROM {} ORDER BY created_at, rowid",
            Self::select_columns(),
            self.table
        ))
    }

    pub fn get(&self, id: &str) -> Result<Option<Lesson>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(&format!(
                "SELECT {} FROM {} WHERE id = ?1",
                Self::select_columns(),
                self.table
            ))
            .map_err(db_err("Query"))?;
        let mut rows = stmt
            .query_map([id], Self::row_to_lesson)
            .map_err(db_err("Query"))?;
        rows.next().transpose().map_err(db_err("Decode lesson"))
    }

    fn query(&self, sql: &str) -> Result<Vec<Lesson>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(sql).map_err(db_err("Query"))?;
        let rows = stmt
            .query_map([], Self::row_to_lesson)
            .map_err(db_err("Query"))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(db_err("Decode lesson"))
    }
}

#[async_trait]
impl RecordStore for SqliteLessonStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn fetch_candidates(&self) -> Result<Vec<Lesson>> {
        self.query(&format!(
            "SELECT {} FROM {} WHERE notified = 0 AND timeline IS NOT NULL AND timeline <> '' ORDER BY created_at, rowid",
            Self::select_columns(),
            self.table
        ))
    }

    async fn mark_notified(&self, id: &str, at: DateTime<Utc>) -> Result<bool> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                &format!(
                    "UPDATE {} SET notified = 1, notified_at = ?2 WHERE id = ?1 AND notified = 0",
                    self.table
                ),
                rusqlite::params![id, at.to_rfc3339()],
            )
            .map_err(db_err("Mark notified"))?;
        if changed > 0 {
            return Ok(true);
        }
        let exists: i64 = conn
            .query_row(
                &format!("SELECT COUNT(*) FROM {} WHERE id = ?1", self.table),
                [id],
                |row| row.get(0),
            )
            .map_err(db_err("Mark notified"))?;
        if exists == 0 {
            return Err(LessonBellError::Store(format!("No lesson with id {id}")));
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_store() -> SqliteLessonStore {
        SqliteLessonStore::open(Path::new(":memory:"), "lessonlearned", "lessons").unwrap()
    }

    fn lesson(id: &str, timeline: Option<&str>) -> Lesson {
        Lesson::with_id(
            id,
            LessonFields {
                customer: Some("Acme".into()),
                impact_level: Some("High".into()),
                detailed_description: Some("It's \"quoted\"".into()),
                timeline: timeline.map(String::from),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_round_trip_fields() {
        let store = memory_store();
        store.upsert(&lesson("a", Some("2024-03-10"))).unwrap();
        let back = store.get("a").unwrap().unwrap();
        assert_eq!(back, lesson("a", Some("2024-03-10")));
        assert!(store.get("missing").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_candidates_query() {
        let store = memory_store();
        store.upsert(&lesson("a", Some("2024-03-10"))).unwrap();
        store.upsert(&lesson("b", Some(""))).unwrap();
        store.upsert(&lesson("c", None)).unwrap();
        let mut notified = lesson("d", Some("2024-03-10"));
        notified.notified = true;
        notified.notified_at = Some(Utc::now());
        store.upsert(&notified).unwrap();

        let ids: Vec<_> = store
            .fetch_candidates()
            .await
            .unwrap()
            .into_iter()
            .map(|l| l.id)
            .collect();
        assert_eq!(ids, vec!["a"]);
        assert_eq!(store.all().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_mark_is_conditional() {
        let store = memory_store();
        store.upsert(&lesson("a", Some("2024-03-10"))).unwrap();
        let first = Utc::now();
        assert!(store.mark_notified("a", first).await.unwrap());
        assert!(!store.mark_notified("a", Utc::now()).await.unwrap());

        let back = store.get("a").unwrap().unwrap();
        assert!(back.notified);
        assert_eq!(
            back.notified_at.map(|t| t.timestamp_micros()),
            Some(first.timestamp_micros())
        );
        assert!(store.fetch_candidates().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_mark_unknown_id() {
        let store = memory_store();
        let err = store.mark_notified("ghost", Utc::now()).await.unwrap_err();
        assert!(matches!(err, LessonBellError::Store(_)));
    }

    #[tokio::test]
    async fn test_upsert_never_clears_marker() {
        let store = memory_store();
        store.upsert(&lesson("a", Some("2024-03-10"))).unwrap();
        let at = Utc::now();
        store.mark_notified("a", at).await.unwrap();

        let mut edited = lesson("a", Some("2024-04-01"));
        edited.fields.status = Some("Closed".into());
        store.upsert(&edited).unwrap();

        let back = store.get("a").unwrap().unwrap();
        assert!(back.notified);
        assert_eq!(
            back.notified_at.map(|t| t.timestamp_micros()),
            Some(at.timestamp_micros())
        );
        assert_eq!(back.timeline(), Some("2024-04-01"));
        assert_eq!(back.fields.status.as_deref(), Some("Closed"));
    }

    #[test]
    fn test_rejects_bad_identifiers() {
        assert!(SqliteLessonStore::open(Path::new(":memory:"), "db", "x; DROP TABLE y").is_err());
        assert!(SqliteLessonStore::open(Path::new(":memory:"), "main", "lessons").is_err());
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lessons.db");
        {
            let store = SqliteLessonStore::open(&path, "lessonlearned", "lessons").unwrap();
            store.upsert(&lesson("a", Some("2024-03-10"))).unwrap();
            store.mark_notified("a", Utc::now()).await.unwrap();
        }
        let store = SqliteLessonStore::open(&path, "lessonlearned", "lessons").unwrap();
        assert!(store.get("a").unwrap().unwrap().notified);
    }
}
