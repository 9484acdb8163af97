use chrono::{Datelike, Duration, NaiveDate};

use crate::limits::WEEKLY_BOOKING_LIMIT;

use super::EngineError;

/// Monday..=Sunday of the ISO week containing `today`.
pub fn week_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    (monday, monday + Duration::days(6))
}

/// How many of `dates` fall inside the current week.
pub fn count_in_week(dates: impl IntoIterator<Item = NaiveDate>, today: NaiveDate) -> usize {
    let (start, end) = week_window(today);
    dates
        .into_iter()
        .filter(|d| (start..=end).contains(d))
        .count()
}

/// Reject when the user already holds the weekly limit.
pub fn check_quota(count: usize) -> Result<(), EngineError> {
    if count >= WEEKLY_BOOKING_LIMIT {
        return Err(EngineError::QuotaExceeded {
            limit: WEEKLY_BOOKING_LIMIT,
        });
    }
    Ok(())
}
