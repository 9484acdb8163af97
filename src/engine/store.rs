use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use dashmap::DashMap;
use tokio::sync::RwLock;

use crate::model::*;

pub type SharedDay = Arc<RwLock<DayBook>>;

/// Every appointment on one calendar day, keyed by start time.
/// The map key makes a second booking of the same slot unrepresentable.
#[derive(Debug, Clone)]
pub struct DayBook {
    pub date: NaiveDate,
    pub slots: BTreeMap<NaiveTime, Appointment>,
}

impl DayBook {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            slots: BTreeMap::new(),
        }
    }

    pub fn booked_times(&self) -> Vec<NaiveTime> {
        self.slots.keys().copied().collect()
    }

    pub fn find(&self, id: AppointmentId) -> Option<&Appointment> {
        self.slots.values().find(|a| a.id == id)
    }

    fn find_mut(&mut self, id: AppointmentId) -> Option<&mut Appointment> {
        self.slots.values_mut().find(|a| a.id == id)
    }
}

/// Sort key of a user's appointment in the per-user index.
type UserKey = (NaiveDate, NaiveTime, AppointmentId);

pub struct InMemoryStore {
    days: DashMap<NaiveDate, SharedDay>,
    id_to_date: DashMap<AppointmentId, NaiveDate>,
    by_user: DashMap<UserId, BTreeSet<UserKey>>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
            id_to_date: DashMap::new(),
            by_user: DashMap::new(),
        }
    }

    // ── Days ─────────────────────────────────────────────────

    pub fn day(&self, date: &NaiveDate) -> Option<SharedDay> {
        self.days.get(date).map(|e| e.value().clone())
    }

    pub fn day_or_insert(&self, date: NaiveDate) -> SharedDay {
        self.days
            .entry(date)
            .or_insert_with(|| Arc::new(RwLock::new(DayBook::new(date))))
            .clone()
    }

    /// Dates that have (or had) bookings, ascending.
    pub fn dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self.days.iter().map(|e| *e.key()).collect();
        dates.sort();
        dates
    }

    // ── Indexes ──────────────────────────────────────────────

    pub fn appointment_count(&self) -> usize {
        self.id_to_date.len()
    }

    pub fn date_for(&self, id: &AppointmentId) -> Option<NaiveDate> {
        self.id_to_date.get(id).map(|e| *e.value())
    }

    pub fn user_keys(&self, user_id: &UserId) -> Vec<UserKey> {
        self.by_user
            .get(user_id)
            .map(|e| e.value().iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn user_dates(&self, user_id: &UserId) -> Vec<NaiveDate> {
        self.user_keys(user_id).into_iter().map(|(d, _, _)| d).collect()
    }

    fn index(&self, appt: &Appointment) {
        self.id_to_date.insert(appt.id, appt.date);
        self.by_user
            .entry(appt.user_id)
            .or_default()
            .insert((appt.date, appt.time, appt.id));
    }

    fn unindex(&self, appt: &Appointment) {
        self.id_to_date.remove(&appt.id);
        if let Some(mut keys) = self.by_user.get_mut(&appt.user_id) {
            keys.remove(&(appt.date, appt.time, appt.id));
        }
        self.by_user.remove_if(&appt.user_id, |_, keys| keys.is_empty());
    }

    // ── Event application ────────────────────────────────────

    /// Apply an event to its day. No locking here: the caller holds the
    /// day's write lock.
    pub fn apply_event(&self, day: &mut DayBook, event: &Event) {
        match event {
            Event::AppointmentBooked(appt) => {
                self.index(appt);
                day.slots.insert(appt.time, appt.clone());
            }
            Event::AppointmentCancelled { id, .. } => {
                if let Some(appt) = day.find(*id).cloned() {
                    day.slots.remove(&appt.time);
                    self.unindex(&appt);
                }
            }
            Event::ReminderMarked { id, .. } => {
                if let Some(appt) = day.find_mut(*id) {
                    appt.reminded = true;
                }
            }
            Event::IdsReserved { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appt(id: AppointmentId, user_id: UserId, hour: u32) -> Appointment {
        Appointment {
            id,
            user_id,
            date: NaiveDate::from_ymd_opt(2024, 6, 10).unwrap(),
            time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
            name: Name::parse("Anna").unwrap(),
            phone: Phone::parse("+37369123456").unwrap(),
            reminded: false,
        }
    }

    #[test]
    fn apply_maintains_indexes() {
        let store = InMemoryStore::new();
        let a = appt(1, 7, 10);
        let b = appt(2, 7, 12);
        let mut day = DayBook::new(a.date);

        store.apply_event(&mut day, &Event::AppointmentBooked(a.clone()));
        store.apply_event(&mut day, &Event::AppointmentBooked(b.clone()));
        assert_eq!(store.appointment_count(), 2);
        assert_eq!(store.date_for(&1), Some(a.date));
        assert_eq!(store.user_keys(&7).len(), 2);
        assert_eq!(day.booked_times(), vec![a.time, b.time]);

        store.apply_event(
            &mut day,
            &Event::AppointmentCancelled { id: 1, user_id: 7, date: a.date },
        );
        assert_eq!(store.appointment_count(), 1);
        assert_eq!(store.date_for(&1), None);
        assert_eq!(store.user_keys(&7), vec![(b.date, b.time, 2)]);
        assert!(day.find(1).is_none());
    }

    #[test]
    fn reminder_flag_sticks() {
        let store = InMemoryStore::new();
        let a = appt(1, 7, 10);
        let mut day = DayBook::new(a.date);
        store.apply_event(&mut day, &Event::AppointmentBooked(a.clone()));
        let marked = Event::ReminderMarked { id: 1, user_id: 7, date: a.date };
        store.apply_event(&mut day, &marked);
        store.apply_event(&mut day, &marked);
        assert!(day.find(1).unwrap().reminded);
    }

    #[test]
    fn cancel_unknown_id_is_noop() {
        let store = InMemoryStore::new();
        let a = appt(1, 7, 10);
        let mut day = DayBook::new(a.date);
        store.apply_event(&mut day, &Event::AppointmentBooked(a.clone()));
        store.apply_event(
            &mut day,
            &Event::AppointmentCancelled { id: 99, user_id: 7, date: a.date },
        );
        assert_eq!(day.slots.len(), 1);
        assert_eq!(store.user_keys(&7).len(), 1);
    }

    #[test]
    fn last_cancel_clears_user_entry() {
        let store = InMemoryStore::new();
        let a = appt(1, 7, 10);
        let mut day = DayBook::new(a.date);
        store.apply_event(&mut day, &Event::AppointmentBooked(a.clone()));
        store.apply_event(
            &mut day,
            &Event::AppointmentCancelled { id: 1, user_id: 7, date: a.date },
        );
        assert!(store.user_keys(&7).is_empty());
        assert!(store.user_dates(&7).is_empty());
    }
}
