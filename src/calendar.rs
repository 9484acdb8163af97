use chrono::{Datelike, NaiveDate, NaiveTime, Weekday};

/// First bookable hour of the day.
pub const OPEN_HOUR: u32 = 10;

/// Last bookable hour of the day (inclusive).
pub const LAST_SLOT_HOUR: u32 = 18;

/// Bookable days shown to users and to the operator.
pub const HORIZON_DAYS: usize = 7;

/// Monday through Saturday open; Sunday closed.
pub fn is_bookable_day(date: NaiveDate) -> bool {
    date.weekday() != Weekday::Sun
}

/// The fixed hourly slot set, 10:00 through 18:00.
pub fn slot_times() -> impl Iterator<Item = NaiveTime> {
    (OPEN_HOUR..=LAST_SLOT_HOUR).filter_map(|h| NaiveTime::from_hms_opt(h, 0, 0))
}

pub fn is_slot_time(time: NaiveTime) -> bool {
    slot_times().any(|t| t == time)
}

/// Scan forward from `today`, skipping closed days, until `count` bookable
/// days are collected. `today` itself is included when bookable.
pub fn bookable_days(today: NaiveDate, count: usize) -> Vec<NaiveDate> {
    today
        .iter_days()
        .filter(|d| is_bookable_day(*d))
        .take(count)
        .collect()
}
