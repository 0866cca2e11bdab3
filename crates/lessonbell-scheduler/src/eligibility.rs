//! Eligibility filter — picks the lessons a batch run should remind about.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use lessonbell_core::Lesson;

use crate::calendar;

/// When a batch is looking, and how far ahead.
#[derive(Debug, Clone, Copy)]
pub struct DueWindow {
    pub tz: Tz,
    pub reference: DateTime<Utc>,
    pub offset_days: u32,
}

impl DueWindow {
    pub fn new(tz: Tz, reference: DateTime<Utc>, offset_days: u32) -> Self {
        Self {
            tz,
            reference,
            offset_days,
        }
    }

    /// Not notified, has a Timeline, and that Timeline is exactly on the target day.
    pub fn admits(&self, lesson: &Lesson) -> bool {
        if lesson.notified {
            return false;
        }
        match lesson.timeline() {
            Some(deadline) => {
                calendar::is_due_on(deadline, self.tz, self.reference, self.offset_days)
            }
            None => false,
        }
    }
}

/// The notify-set: every admitted lesson, in input order.
///
/// Does not trust any pre-filtering the store may have applied.
pub fn select_due<'a>(lessons: &'a [Lesson], window: &DueWindow) -> Vec<&'a Lesson> {
    lessons.iter().filter(|l| window.admits(l)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Asia::Riyadh;
    use lessonbell_core::LessonFields;

    fn lesson(id: &str, timeline: Option<&str>, notified: bool) -> Lesson {
        let mut l = Lesson::with_id(
            id,
            LessonFields {
                customer: Some(format!("Customer {id}")),
                timeline: timeline.map(String::from),
                ..Default::default()
            },
        );
        l.notified = notified;
        l
    }

    fn window() -> DueWindow {
        let reference = Riyadh
            .with_ymd_and_hms(2024, 3, 7, 8, 0, 0)
            .unwrap()
            .with_timezone(&Utc);
        DueWindow::new(Riyadh, reference, 3)
    }

    #[test]
    fn test_selects_only_due_unnotified() {
        let lessons = vec![
            lesson("a", Some("2024-03-10"), false),
            lesson("b", Some("2024-03-10"), true),
            lesson("c", Some("2024-03-11"), false),
            lesson("d", None, false),
            lesson("e", Some(""), false),
            lesson("f", Some("not-a-date"), false),
            lesson("g", Some("2024-03-10T23:59:00"), false),
        ];
        let due: Vec<_> = select_due(&lessons, &window()).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(due, vec!["a", "g"]);
    }

    #[test]
    fn test_order_follows_input() {
        let lessons = vec![
            lesson("z", Some("2024-03-10"), false),
            lesson("m", Some("2024-03-10"), false),
            lesson("a", Some("2024-03-10"), false),
        ];
        let due: Vec<_> = select_due(&lessons, &window()).iter().map(|l| l.id.as_str()).collect();
        assert_eq!(due, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_notified_excluded_regardless_of_deadline() {
        let mut l = lesson("x", Some("2024-03-10"), true);
        l.notified_at = Some(Utc::now());
        assert!(!window().admits(&l));
    }

    #[test]
    fn test_empty_input() {
        assert!(select_due(&[], &window()).is_empty());
    }
}
