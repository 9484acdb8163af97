use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::calendar::{is_bookable_day, is_slot_time};

use super::store::DayBook;
use super::EngineError;

/// Wall-clock time in the business's (the host's) zone.
pub fn now_local() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// The slot must exist on the calendar and must not have started yet.
pub(crate) fn validate_slot(
    date: NaiveDate,
    time: NaiveTime,
    now: NaiveDateTime,
) -> Result<(), EngineError> {
    if !is_bookable_day(date) || !is_slot_time(time) {
        return Err(EngineError::OutsideCalendar { date, time });
    }
    if date.and_time(time) <= now {
        return Err(EngineError::SlotInPast { date, time });
    }
    Ok(())
}

/// Caller holds the day's write lock, so a free answer stays true until
/// the insert that follows it.
pub(crate) fn check_slot_free(day: &DayBook, time: NaiveTime) -> Result<(), EngineError> {
    if day.slots.contains_key(&time) {
        return Err(EngineError::SlotTaken {
            date: day.date,
            time,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    #[test]
    fn rejects_sunday_and_off_grid_times() {
        let now = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap().and_hms_opt(8, 0, 0).unwrap();
        let sunday = NaiveDate::from_ymd_opt(2024, 6, 9).unwrap();
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        assert!(matches!(
            validate_slot(sunday, at(12), now),
            Err(EngineError::OutsideCalendar { .. })
        ));
        assert!(matches!(
            validate_slot(monday, at(19), now),
            Err(EngineError::OutsideCalendar { .. })
        ));
        assert!(validate_slot(monday, at(18), now).is_ok());
    }

    #[test]
    fn rejects_started_slots() {
        let monday = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        let now = monday.and_hms_opt(14, 0, 0).unwrap();
        assert!(matches!(
            validate_slot(monday, at(14), now),
            Err(EngineError::SlotInPast { .. })
        ));
        assert!(validate_slot(monday, at(15), now).is_ok());
    }
}
