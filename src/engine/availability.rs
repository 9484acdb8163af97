use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

use crate::calendar::{is_bookable_day, slot_times};

// ── Slot Availability ──────────────────────────────────────────────

/// Which filters apply to today's slots.
///
/// `View` drops slots at or before now, so the date list shows how many
/// slots remain in principle. `Select` also drops anything starting within
/// the next hour, leaving only slots a new booking could still target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotFilter {
    View,
    Select,
}

/// Minimum lead time between "now" and a slot offered for selection.
pub fn booking_lead() -> Duration {
    Duration::hours(1)
}

/// A bookable day and how many of its slots are still open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub open: usize,
}

/// A bookable day and its raw booking count, for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayLoad {
    pub date: NaiveDate,
    pub booked: usize,
}

/// Fixed slot set minus booked times, minus what `filter` excludes today.
/// Closed days and days already gone have nothing open.
pub fn open_times(
    date: NaiveDate,
    booked: &[NaiveTime],
    now: NaiveDateTime,
    filter: SlotFilter,
) -> Vec<NaiveTime> {
    if !is_bookable_day(date) || date < now.date() {
        return Vec::new();
    }
    let today = date == now.date();
    slot_times()
        .filter(|t| !booked.contains(t))
        .filter(|t| {
            if !today {
                return true;
            }
            match filter {
                SlotFilter::View => *t > now.time(),
                SlotFilter::Select => date.and_time(*t) > now + booking_lead(),
            }
        })
        .collect()
}

pub fn day_availability(
    date: NaiveDate,
    booked: &[NaiveTime],
    now: NaiveDateTime,
) -> DayAvailability {
    DayAvailability {
        date,
        open: open_times(date, booked, now, SlotFilter::View).len(),
    }
}
