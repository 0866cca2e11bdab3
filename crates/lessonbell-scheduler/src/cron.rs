//! Lightweight cron expression parser for the daily batch.
//! Supports: "MIN HOUR DOM MON DOW" (5-field, no seconds)
//! Wildcards: *, */N, N, a,b — in MIN and HOUR; the other fields must be "*".
//! Example: "0 8 * * *" = every day at 08:00 local time.
//!
//! Matching is done on the local wall clock of the configured timezone.

use chrono::{DateTime, Duration, Timelike, Utc};
use chrono_tz::Tz;

/// Next instant after `after` whose local time in `tz` matches `expression`.
///
/// Walks UTC minutes and tests each one's local wall clock, so a slot that
/// does not exist on a spring-forward day is simply skipped.
pub fn next_run_in_tz(expression: &str, after: DateTime<Utc>, tz: Tz) -> Option<DateTime<Utc>> {
    let parts: Vec<&str> = expression.split_whitespace().collect();
    if parts.len() != 5 {
        tracing::warn!(
            "Invalid cron expression: '{}' (need 5 fields: MIN HOUR DOM MON DOW)",
            expression
        );
        return None;
    }
    if parts[2..].iter().any(|p| *p != "*") {
        tracing::warn!(
            "Unsupported cron expression: '{}' (day, month and weekday must be '*')",
            expression
        );
        return None;
    }

    let minutes = parse_field(parts[0], 0, 59)?;
    let hours = parse_field(parts[1], 0, 23)?;
    if minutes.is_empty() || hours.is_empty() {
        return None;
    }

    let mut candidate = after + Duration::minutes(1);
    candidate = candidate
        .with_second(0)
        .and_then(|c| c.with_nanosecond(0))
        .unwrap_or(candidate);

    // Try up to 48 hours ahead
    for _ in 0..(48 * 60) {
        let local = candidate.with_timezone(&tz);
        if minutes.contains(&local.minute()) && hours.contains(&local.hour()) {
            return Some(candidate);
        }
        candidate += Duration::minutes(1);
    }

    None
}

/// Parse a cron field into a list of matching values.
fn parse_field(field: &str, min: u32, max: u32) -> Option<Vec<u32>> {
    if field == "*" {
        return Some((min..=max).collect());
    }

    // */N — every N
    if let Some(step) = field.strip_prefix("*/") {
        let n: u32 = step.parse().ok()?;
        if n == 0 {
            return None;
        }
        return Some((min..=max).step_by(n as usize).collect());
    }

    // Comma-separated: "0,15,30,45"
    if field.contains(',') {
        let vals: Result<Vec<u32>, _> = field.split(',').map(|s| s.trim().parse()).collect();
        return vals
            .ok()
            .map(|v| v.into_iter().filter(|x| *x >= min && *x <= max).collect());
    }

    // Single number
    let n: u32 = field.parse().ok()?;
    if n >= min && n <= max {
        Some(vec![n])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::{America::New_York, Asia::Riyadh};

    #[test]
    fn test_daily_in_riyadh() {
        // 04:00 UTC = 07:00 Riyadh → next 08:00 local is 05:00 UTC
        let after = Utc.with_ymd_and_hms(2024, 3, 7, 4, 0, 0).unwrap();
        let next = next_run_in_tz("0 8 * * *", after, Riyadh).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 7, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_rolls_to_next_day() {
        let after = Utc.with_ymd_and_hms(2024, 3, 7, 5, 0, 0).unwrap();
        let next = next_run_in_tz("0 8 * * *", after, Riyadh).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 8, 5, 0, 0).unwrap());
    }

    #[test]
    fn test_follows_dst_shift() {
        // 08:00 New York is 13:00 UTC before 2024-03-10 and 12:00 UTC after.
        let before = Utc.with_ymd_and_hms(2024, 3, 9, 14, 0, 0).unwrap();
        let next = next_run_in_tz("0 8 * * *", before, New_York).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap());
        assert_eq!(next.with_timezone(&New_York).hour(), 8);
    }

    #[test]
    fn test_every_15_minutes() {
        let after = Utc.with_ymd_and_hms(2026, 2, 22, 10, 2, 0).unwrap();
        let next = next_run_in_tz("*/15 * * * *", after, Riyadh).unwrap();
        assert_eq!(next.minute(), 15);
    }

    #[test]
    fn test_invalid_expression() {
        let after = Utc::now();
        assert!(next_run_in_tz("bad", after, Riyadh).is_none());
        assert!(next_run_in_tz("0 8 1 * *", after, Riyadh).is_none());
        assert!(next_run_in_tz("0 25 * * *", after, Riyadh).is_none());
        assert!(next_run_in_tz("*/0 * * * *", after, Riyadh).is_none());
    }
}
