use crate::types::{Recurrence, Schedule};
use chrono::{DateTime, Datelike, Duration, Months, Utc};
use std::str::FromStr;
use taskloom_core::{TaskloomError, TaskloomResult};

/// Parse a cron expression into a [`cron::Schedule`].
///
/// Uses the 7-field cron format: sec min hour day-of-month month day-of-week year.
pub fn parse_cron(cron_expr: &str) -> TaskloomResult<cron::Schedule> {
    cron::Schedule::from_str(cron_expr).map_err(|e| {
        TaskloomError::Validation(format!("Invalid cron expression '{cron_expr}': {e}"))
    })
}

/// Next run of a recurring schedule after a run that finished at `after`.
///
/// Interval patterns stay on the anchor grid `start_at + k * period` (k >= 1)
/// and return the first grid point strictly after `after`, so a slow run
/// never shifts later runs. Months use calendar arithmetic, clamping to the
/// last day of shorter months. Cron patterns return the first fire time
/// strictly after `after`.
pub fn next_after(
    start_at: DateTime<Utc>,
    recurrence: &Recurrence,
    after: DateTime<Utc>,
) -> TaskloomResult<DateTime<Utc>> {
    match recurrence {
        Recurrence::Daily => next_on_grid(start_at, Duration::days(1), after),
        Recurrence::Weekly => next_on_grid(start_at, Duration::weeks(1), after),
        Recurrence::Monthly => next_month(start_at, after),
        Recurrence::Cron(expr) => parse_cron(expr)?.after(&after).next().ok_or_else(|| {
            TaskloomError::Validation(format!("Cron expression '{expr}' has no upcoming fire times"))
        }),
    }
}

fn next_on_grid(
    start_at: DateTime<Utc>,
    period: Duration,
    after: DateTime<Utc>,
) -> TaskloomResult<DateTime<Utc>> {
    let period_secs = period.num_seconds();
    let elapsed = after.signed_duration_since(start_at).num_seconds();
    let k = if elapsed < 0 {
        1
    } else {
        elapsed / period_secs + 1
    };
    period_secs
        .checked_mul(k)
        .and_then(Duration::try_seconds)
        .and_then(|offset| start_at.checked_add_signed(offset))
        .ok_or_else(out_of_range)
}

fn out_of_range() -> TaskloomError {
    TaskloomError::Validation("schedule is out of range".into())
}

fn next_month(start_at: DateTime<Utc>, after: DateTime<Utc>) -> TaskloomResult<DateTime<Utc>> {
    let month_index = |d: DateTime<Utc>| i64::from(d.year()) * 12 + i64::from(d.month0());
    let mut k = (month_index(after) - month_index(start_at)).max(1);
    loop {
        let months = u32::try_from(k).map_err(|_| out_of_range())?;
        let candidate = start_at
            .checked_add_months(Months::new(months))
            .ok_or_else(out_of_range)?;
        if candidate > after {
            return Ok(candidate);
        }
        k += 1;
    }
}

/// Whether a new task with this schedule waits (`scheduled`) or runs now.
pub fn starts_scheduled(schedule: &Schedule, now: DateTime<Utc>) -> bool {
    schedule.start_at.is_some_and(|start| start > now)
}

/// `next_run` for a freshly created task.
///
/// A future start time is the first run. A start time already in the past
/// means the task runs immediately, so recurring tasks get their next grid
/// point after `now`.
pub fn initial_next_run(
    schedule: &Schedule,
    now: DateTime<Utc>,
) -> TaskloomResult<Option<DateTime<Utc>>> {
    match (schedule.start_at, &schedule.recurring_pattern) {
        (Some(start), _) if start > now => Ok(Some(start)),
        (Some(start), Some(pattern)) => next_after(start, pattern, now).map(Some),
        _ => Ok(None),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, m: u32, d: u32, h: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, h, 0, 0).unwrap()
    }

    #[test]
    fn test_daily_anchors_to_start_not_completion() {
        let start = at(2025, 3, 10, 9);
        let completed = start + Duration::hours(5);
        let next = next_after(start, &Recurrence::Daily, completed).unwrap();
        assert_eq!(next, start + Duration::days(1));
    }

    #[test]
    fn test_daily_skips_missed_slots() {
        let start = at(2025, 3, 10, 9);
        let completed = start + Duration::days(3) + Duration::minutes(1);
        let next = next_after(start, &Recurrence::Daily, completed).unwrap();
        assert_eq!(next, at(2025, 3, 14, 9));
    }

    #[test]
    fn test_next_is_strictly_after_completion() {
        let start = at(2025, 3, 10, 9);
        let exactly_on_grid = start + Duration::days(1);
        let next = next_after(start, &Recurrence::Daily, exactly_on_grid).unwrap();
        assert_eq!(next, start + Duration::days(2));
    }

    #[test]
    fn test_weekly() {
        let start = at(2025, 3, 10, 9);
        let next = next_after(start, &Recurrence::Weekly, start + Duration::hours(1)).unwrap();
        assert_eq!(next, at(2025, 3, 17, 9));
    }

    #[test]
    fn test_monthly_clamps_end_of_month() {
        let start = at(2025, 1, 31, 9);
        let next = next_after(start, &Recurrence::Monthly, start + Duration::hours(1)).unwrap();
        assert_eq!(next, at(2025, 2, 28, 9));

        let next = next_after(start, &Recurrence::Monthly, at(2025, 3, 1, 0)).unwrap();
        assert_eq!(next, at(2025, 3, 31, 9));
    }

    #[test]
    fn test_monthly_across_year_boundary() {
        let start = at(2024, 11, 15, 8);
        let next = next_after(start, &Recurrence::Monthly, at(2025, 1, 20, 0)).unwrap();
        assert_eq!(next, at(2025, 2, 15, 8));
    }

    #[test]
    fn test_cron_first_fire_after() {
        let start = at(2025, 3, 10, 0);
        let every_hour = Recurrence::Cron("0 0 * * * * *".into());
        let next = next_after(start, &every_hour, at(2025, 3, 10, 5) + Duration::minutes(30)).unwrap();
        assert_eq!(next, at(2025, 3, 10, 6));
    }

    #[test]
    fn test_grid_overflow_is_a_validation_error() {
        let start = DateTime::<Utc>::MAX_UTC - Duration::hours(1);
        let err = next_after(start, &Recurrence::Daily, start).unwrap_err();
        assert!(matches!(err, TaskloomError::Validation(_)));
        let err = next_after(start, &Recurrence::Monthly, start).unwrap_err();
        assert!(matches!(err, TaskloomError::Validation(_)));
    }

    #[test]
    fn test_parse_invalid_cron() {
        assert!(parse_cron("not a cron expression").is_err());
        assert!(parse_cron("0 * * * * * *").is_ok());
    }

    #[test]
    fn test_initial_next_run() {
        let now = at(2025, 3, 10, 12);
        let future = Schedule::recurring(at(2025, 3, 11, 9), Recurrence::Daily);
        assert_eq!(initial_next_run(&future, now).unwrap(), Some(at(2025, 3, 11, 9)));
        assert!(starts_scheduled(&future, now));

        let past = Schedule::recurring(at(2025, 3, 9, 9), Recurrence::Daily);
        assert_eq!(initial_next_run(&past, now).unwrap(), Some(at(2025, 3, 11, 9)));
        assert!(!starts_scheduled(&past, now));

        let once_past = Schedule::at(at(2025, 3, 9, 9));
        assert_eq!(initial_next_run(&once_past, now).unwrap(), None);
    }
}
