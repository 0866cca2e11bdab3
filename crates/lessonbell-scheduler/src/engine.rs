//! Delivery coordinator — one batch run: fetch candidates, pick the due ones,
//! send one reminder each, and mark each lesson notified right after its own
//! send confirms. A failing lesson never stops the rest of the batch.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use chrono_tz::Tz;
use futures::StreamExt;
use futures::future::BoxFuture;
use lessonbell_core::config::ReminderConfig;
use lessonbell_core::error::Result;
use lessonbell_core::{EmailMessage, Lesson, Mailer, RecordStore};
use serde::Serialize;

use crate::cron;
use crate::eligibility::{self, DueWindow};
use crate::notify::{self, MessageKind};

/// Per-run settings, resolved from config once.
#[derive(Debug, Clone, Copy)]
pub struct BatchSettings {
    pub tz: Tz,
    pub offset_days: u32,
    /// Sends in flight at once. 1 = strictly sequential.
    pub max_concurrent: usize,
}

impl BatchSettings {
    pub fn new(tz: Tz, offset_days: u32) -> Self {
        Self {
            tz,
            offset_days,
            max_concurrent: 1,
        }
    }

    pub fn from_config(config: &ReminderConfig) -> Result<Self> {
        Ok(Self {
            tz: config.tz()?,
            offset_days: config.offset_days,
            max_concurrent: config.max_concurrent.max(1),
        })
    }

    fn kind(&self) -> MessageKind {
        MessageKind::Reminder {
            days_ahead: self.offset_days,
        }
    }
}

/// Where a lesson's pipeline stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureStage {
    /// The mailer failed; nothing was delivered.
    Send,
    /// The mail went out but the notified marker could not be written, so the
    /// lesson stays eligible.
    Mark,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeliveryFailure {
    pub lesson_id: String,
    pub subject: String,
    pub stage: FailureStage,
    pub error: String,
}

/// Terminal state of one lesson's pipeline.
#[derive(Debug, Clone)]
pub enum DeliveryOutcome {
    Sent { lesson_id: String },
    Failed(DeliveryFailure),
}

/// Aggregate result of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub reference: Option<DateTime<Utc>>,
    /// The local day deadlines had to fall on.
    pub target_day: Option<NaiveDate>,
    /// Lessons the store returned.
    pub candidates: usize,
    pub attempted: usize,
    pub sent: usize,
    pub failed: usize,
    pub sent_ids: Vec<String>,
    pub failures: Vec<DeliveryFailure>,
}

impl BatchReport {
    fn record(&mut self, outcome: DeliveryOutcome) {
        match outcome {
            DeliveryOutcome::Sent { lesson_id } => {
                self.sent += 1;
                self.sent_ids.push(lesson_id);
            }
            DeliveryOutcome::Failed(failure) => {
                self.failed += 1;
                self.failures.push(failure);
            }
        }
    }

    /// No lesson failed.
    pub fn is_clean(&self) -> bool {
        self.failed == 0
    }

    /// One-line human summary.
    pub fn summary(&self) -> String {
        let day = self
            .target_day
            .map(|d| d.to_string())
            .unwrap_or_else(|| "-".into());
        format!(
            "target={day} candidates={} attempted={} sent={} failed={}",
            self.candidates, self.attempted, self.sent, self.failed
        )
    }
}

/// Run one batch against the current time.
pub async fn run_batch(
    store: &dyn RecordStore,
    mailer: &dyn Mailer,
    settings: &BatchSettings,
) -> Result<BatchReport> {
    run_batch_at(store, mailer, settings, Utc::now()).await
}

/// Run one batch as if "today" were `reference` (read in `settings.tz`).
///
/// Only fetching candidates can fail the run as a whole; per-lesson failures
/// are collected in the report.
pub async fn run_batch_at(
    store: &dyn RecordStore,
    mailer: &dyn Mailer,
    settings: &BatchSettings,
    reference: DateTime<Utc>,
) -> Result<BatchReport> {
    let window = DueWindow::new(settings.tz, reference, settings.offset_days);
    let candidates = store.fetch_candidates().await?;
    let due = eligibility::select_due(&candidates, &window);

    let mut report = BatchReport {
        reference: Some(reference),
        target_day: crate::calendar::target_day(settings.tz, reference, settings.offset_days),
        candidates: candidates.len(),
        attempted: due.len(),
        ..Default::default()
    };

    if due.is_empty() {
        tracing::info!("📭 No lessons to notify ({})", report.summary());
        return Ok(report);
    }

    tracing::info!(
        "📅 {} lesson(s) due on {} via {} → {}",
        due.len(),
        report.target_day.map(|d| d.to_string()).unwrap_or_default(),
        store.name(),
        mailer.name()
    );

    let kind = settings.kind();
    let deliveries: Vec<BoxFuture<'_, DeliveryOutcome>> = due
        .into_iter()
        .map(|lesson| -> BoxFuture<'_, DeliveryOutcome> {
            Box::pin(deliver_one(store, mailer, lesson, kind))
        })
        .collect();
    let outcomes: Vec<DeliveryOutcome> = futures::stream::iter(deliveries)
        .buffered(settings.max_concurrent.max(1))
        .collect()
        .await;

    for outcome in outcomes {
        report.record(outcome);
    }

    tracing::info!("✅ Batch finished: {}", report.summary());
    Ok(report)
}

/// Pending → Sending → Sent | Failed for one lesson.
async fn deliver_one(
    store: &dyn RecordStore,
    mailer: &dyn Mailer,
    lesson: &Lesson,
    kind: MessageKind,
) -> DeliveryOutcome {
    let message = notify::format_message(&lesson.fields, kind);
    let subject = message.subject.clone();
    let failed = |stage, error: String| {
        DeliveryOutcome::Failed(DeliveryFailure {
            lesson_id: lesson.id.clone(),
            subject: subject.clone(),
            stage,
            error,
        })
    };

    if let Err(e) = mailer.send(&message).await {
        tracing::warn!("⚠️ Failed to send reminder for lesson {}: {e}", lesson.id);
        return failed(FailureStage::Send, e.to_string());
    }

    match store.mark_notified(&lesson.id, Utc::now()).await {
        Ok(true) => {
            tracing::info!("📤 Reminder sent for lesson {}: {}", lesson.id, subject);
            DeliveryOutcome::Sent {
                lesson_id: lesson.id.clone(),
            }
        }
        Ok(false) => {
            // another run marked it between our read and our send
            tracing::warn!(
                "⚠️ Lesson {} was already marked notified by another run; reminder was sent again",
                lesson.id
            );
            DeliveryOutcome::Sent {
                lesson_id: lesson.id.clone(),
            }
        }
        Err(e) => {
            tracing::warn!(
                "⚠️ Reminder sent for lesson {} but marking it notified failed: {e}",
                lesson.id
            );
            failed(FailureStage::Mark, e.to_string())
        }
    }
}

/// What a batch would send right now, without sending or writing anything.
pub async fn preview_at(
    store: &dyn RecordStore,
    settings: &BatchSettings,
    reference: DateTime<Utc>,
) -> Result<Vec<(Lesson, EmailMessage)>> {
    let window = DueWindow::new(settings.tz, reference, settings.offset_days);
    let candidates = store.fetch_candidates().await?;
    let kind = settings.kind();
    Ok(eligibility::select_due(&candidates, &window)
        .into_iter()
        .map(|l| (l.clone(), notify::format_message(&l.fields, kind)))
        .collect())
}

/// Run the batch every day on `expression` (local time in `settings.tz`).
/// Runs never overlap: the next sleep starts only after the current run ends.
pub async fn spawn_daily_batch(
    store: Arc<dyn RecordStore>,
    mailer: Arc<dyn Mailer>,
    settings: BatchSettings,
    expression: String,
) {
    tracing::info!(
        "⏰ Daily reminder batch scheduled: '{}' ({})",
        expression,
        settings.tz
    );

    loop {
        let now = Utc::now();
        let Some(next) = cron::next_run_in_tz(&expression, now, settings.tz) else {
            tracing::error!("Schedule '{expression}' never fires; daily batch stopped");
            return;
        };
        let wait = (next - now).to_std().unwrap_or_default();
        tracing::debug!("Next reminder batch at {next} (in {}s)", wait.as_secs());
        tokio::time::sleep(wait).await;

        match run_batch(store.as_ref(), mailer.as_ref(), &settings).await {
            Ok(report) => {
                for failure in &report.failures {
                    tracing::warn!(
                        "  ❌ {} [{:?}] {}",
                        failure.lesson_id,
                        failure.stage,
                        failure.error
                    );
                }
            }
            Err(e) => tracing::error!("❌ Reminder batch aborted: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use chrono_tz::Asia::Riyadh;
    use lessonbell_core::LessonFields;
    use lessonbell_core::error::LessonBellError;
    use std::sync::Mutex;

    /// Records every subject; fails for subjects containing `fail_on`.
    #[derive(Default)]
    struct FakeMailer {
        sent: Mutex<Vec<String>>,
        fail_on: Option<String>,
    }

    #[async_trait]
    impl Mailer for FakeMailer {
        fn name(&self) -> &str {
            "fake"
        }

        async fn send(&self, message: &EmailMessage) -> Result<()> {
            if let Some(bad) = &self.fail_on
                && message.subject.contains(bad.as_str())
            {
                return Err(LessonBellError::Transport("503 from upstream".into()));
            }
            self.sent.lock().unwrap().push(message.subject.clone());
            Ok(())
        }
    }

    fn lesson(id: &str, customer: &str, timeline: &str) -> Lesson {
        Lesson::with_id(
            id,
            LessonFields {
                customer: Some(customer.into()),
                issue: Some(format!("issue-{id}")),
                timeline: Some(timeline.into()),
                ..Default::default()
            },
        )
    }

    fn reference() -> DateTime<Utc> {
        Riyadh
            .with_ymd_and_hms(2024, 3, 7, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[tokio::test]
    async fn test_batch_sends_and_marks() {
        let store = MemoryStore::new(vec![
            lesson("a", "Acme", "2024-03-10"),
            lesson("b", "Beta", "2024-03-12"),
        ]);
        let mailer = FakeMailer::default();
        let settings = BatchSettings::new(Riyadh, 3);

        let report = run_batch_at(&store, &mailer, &settings, reference()).await.unwrap();
        assert_eq!(report.candidates, 2);
        assert_eq!(report.attempted, 1);
        assert_eq!(report.sent, 1);
        assert_eq!(report.sent_ids, vec!["a"]);
        assert_eq!(report.target_day, NaiveDate::from_ymd_opt(2024, 3, 10));
        assert!(report.is_clean());
        assert_eq!(*mailer.sent.lock().unwrap(), vec!["Acme, issue-a"]);

        let a = store.get("a").unwrap();
        assert!(a.notified);
        assert!(a.notified_at.is_some());
        assert!(!store.get("b").unwrap().notified);
    }

    #[tokio::test]
    async fn test_mark_failure_keeps_lesson_eligible() {
        let store = MemoryStore::new(vec![lesson("a", "Acme", "2024-03-10")]);
        store.fail_marks_for("a");
        let mailer = FakeMailer::default();
        let settings = BatchSettings::new(Riyadh, 3);

        let report = run_batch_at(&store, &mailer, &settings, reference()).await.unwrap();
        assert_eq!(report.sent, 0);
        assert_eq!(report.failed, 1);
        assert_eq!(report.failures[0].stage, FailureStage::Mark);
        assert_eq!(mailer.sent.lock().unwrap().len(), 1);
        assert!(!store.get("a").unwrap().notified);
    }

    #[tokio::test]
    async fn test_fetch_failure_aborts_run() {
        let store = MemoryStore::new(vec![lesson("a", "Acme", "2024-03-10")]);
        store.fail_fetches("connection refused");
        let mailer = FakeMailer::default();
        let err = run_batch_at(&store, &mailer, &BatchSettings::new(Riyadh, 3), reference())
            .await
            .unwrap_err();
        assert!(err.is_fatal());
        assert!(mailer.sent.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_sends_keep_report_order() {
        let lessons: Vec<_> = (0..6)
            .map(|i| lesson(&format!("l{i}"), &format!("C{i}"), "2024-03-10"))
            .collect();
        let store = MemoryStore::new(lessons);
        let mailer = FakeMailer {
            fail_on: Some("C3".into()),
            ..Default::default()
        };
        let settings = BatchSettings {
            max_concurrent: 3,
            ..BatchSettings::new(Riyadh, 3)
        };

        let report = run_batch_at(&store, &mailer, &settings, reference()).await.unwrap();
        assert_eq!(report.sent, 5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.sent_ids, vec!["l0", "l1", "l2", "l4", "l5"]);
        assert_eq!(report.failures[0].lesson_id, "l3");
        assert_eq!(report.failures[0].stage, FailureStage::Send);
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let store = MemoryStore::new(vec![lesson("a", "Acme", "2024-03-10")]);
        let settings = BatchSettings::new(Riyadh, 3);
        let preview = preview_at(&store, &settings, reference()).await.unwrap();
        assert_eq!(preview.len(), 1);
        assert_eq!(preview[0].1.subject, "Acme, issue-a");
        assert!(preview[0].1.text_body.contains("is in 3 days."));
        assert!(!store.get("a").unwrap().notified);
    }

    #[test]
    fn test_summary_line() {
        let report = BatchReport {
            target_day: NaiveDate::from_ymd_opt(2024, 3, 10),
            candidates: 4,
            attempted: 3,
            sent: 2,
            failed: 1,
            ..Default::default()
        };
        assert_eq!(
            report.summary(),
            "target=2024-03-10 candidates=4 attempted=3 sent=2 failed=1"
        );
        assert!(!report.is_clean());
    }
}
