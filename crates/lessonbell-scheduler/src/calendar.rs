//! Calendar resolver — turns a free-form Timeline string into a calendar day
//! in the configured timezone and answers "is it due N days from today?".
//!
//! All comparisons are by local calendar date; time-of-day is dropped, so DST
//! shifts and month/year rollovers need no special casing.

use chrono::{DateTime, Days, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// Naive date-time layouts read as wall-clock time in the target timezone.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Date-only layouts. Slash dates are month-first, as most mail clients and
/// spreadsheets export them.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
];

/// Parse a deadline into its calendar day in `tz`.
///
/// Values carrying an offset (RFC 3339, RFC 2822) are converted into `tz`
/// first; everything else is already local to `tz`. Returns `None` for empty
/// or unrecognised input.
pub fn parse_deadline(raw: &str, tz: Tz) -> Option<NaiveDate> {
    let text = raw.trim();
    if text.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    if let Ok(dt) = DateTime::parse_from_rfc2822(text) {
        return Some(dt.with_timezone(&tz).date_naive());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(ndt) = NaiveDateTime::parse_from_str(text, fmt) {
            return Some(ndt.date());
        }
    }
    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(text, fmt) {
            return Some(date);
        }
    }
    None
}

/// Local calendar day `offset_days` after `reference` in `tz`.
pub fn target_day(tz: Tz, reference: DateTime<Utc>, offset_days: u32) -> Option<NaiveDate> {
    reference
        .with_timezone(&tz)
        .date_naive()
        .checked_add_days(Days::new(u64::from(offset_days)))
}

/// True iff the deadline falls exactly on `today(tz) + offset_days`.
/// Unparsable deadlines are never due.
pub fn is_due_on(deadline: &str, tz: Tz, reference: DateTime<Utc>, offset_days: u32) -> bool {
    let Some(day) = parse_deadline(deadline, tz) else {
        tracing::debug!("Unparsable Timeline '{deadline}', skipping");
        return false;
    };
    target_day(tz, reference, offset_days) == Some(day)
}
