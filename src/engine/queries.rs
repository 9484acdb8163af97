use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::calendar::{HORIZON_DAYS, bookable_days};
use crate::model::*;

use super::availability::{DayAvailability, DayLoad, SlotFilter, day_availability, open_times};
use super::quota::count_in_week;
use super::Engine;

impl Engine {
    pub async fn get(&self, id: AppointmentId) -> Option<Appointment> {
        let date = self.store.date_for(&id)?;
        let day = self.store.day(&date)?;
        let guard = day.read().await;
        guard.find(id).cloned()
    }

    pub async fn booked_times(&self, date: NaiveDate) -> Vec<NaiveTime> {
        match self.store.day(&date) {
            Some(day) => day.read().await.booked_times(),
            None => Vec::new(),
        }
    }

    /// Every appointment on `date`, ordered by time.
    pub async fn on_date(&self, date: NaiveDate) -> Vec<Appointment> {
        match self.store.day(&date) {
            Some(day) => day.read().await.slots.values().cloned().collect(),
            None => Vec::new(),
        }
    }

    pub async fn count_on_date(&self, date: NaiveDate) -> usize {
        match self.store.day(&date) {
            Some(day) => day.read().await.slots.len(),
            None => 0,
        }
    }

    /// Every appointment, ordered by date then time.
    pub async fn all(&self) -> Vec<Appointment> {
        let mut out = Vec::new();
        for date in self.store.dates() {
            out.extend(self.on_date(date).await);
        }
        out
    }

    /// A user's appointments, past ones included, ordered by date then time.
    pub async fn for_user(&self, user_id: UserId) -> Vec<Appointment> {
        let mut out = Vec::new();
        for (_, _, id) in self.store.user_keys(&user_id) {
            if let Some(appt) = self.get(id).await {
                out.push(appt);
            }
        }
        out
    }

    /// A user's appointments strictly after `now`, ordered by date then time.
    pub async fn upcoming_for_user(&self, user_id: UserId, now: NaiveDateTime) -> Vec<Appointment> {
        let mut out = self.for_user(user_id).await;
        out.retain(|a| a.is_upcoming(now));
        out
    }

    /// The user's latest appointment by (date, time).
    pub async fn last_for_user(&self, user_id: UserId) -> Option<Appointment> {
        let (_, _, id) = self.store.user_keys(&user_id).pop()?;
        self.get(id).await
    }

    pub fn count_bookings_in_current_week(&self, user_id: UserId, now: NaiveDateTime) -> usize {
        count_in_week(self.store.user_dates(&user_id), now.date())
    }

    pub fn appointment_count(&self) -> usize {
        self.store.appointment_count()
    }

    /// Appointments whose reminder has not been sent yet.
    pub async fn pending_reminders(&self) -> Vec<Appointment> {
        let mut out = Vec::new();
        for date in self.store.dates() {
            let Some(day) = self.store.day(&date) else { continue };
            let guard = day.read().await;
            out.extend(guard.slots.values().filter(|a| !a.reminded).cloned());
        }
        out
    }

    // ── Availability ─────────────────────────────────────────

    /// The next bookable days from today, each with its open-slot count.
    /// Days with nothing left are still listed.
    pub async fn available_days(&self, now: NaiveDateTime) -> Vec<DayAvailability> {
        let mut out = Vec::with_capacity(HORIZON_DAYS);
        for date in bookable_days(now.date(), HORIZON_DAYS) {
            let booked = self.booked_times(date).await;
            out.push(day_availability(date, &booked, now));
        }
        out
    }

    /// Times a new booking on `date` could still target.
    pub async fn available_times(&self, date: NaiveDate, now: NaiveDateTime) -> Vec<NaiveTime> {
        let booked = self.booked_times(date).await;
        open_times(date, &booked, now, SlotFilter::Select)
    }

    /// The same bookable days, annotated with raw booking counts.
    pub async fn operator_days(&self, today: NaiveDate) -> Vec<DayLoad> {
        let mut out = Vec::with_capacity(HORIZON_DAYS);
        for date in bookable_days(today, HORIZON_DAYS) {
            out.push(DayLoad {
                date,
                booked: self.count_on_date(date).await,
            });
        }
        out
    }
}
