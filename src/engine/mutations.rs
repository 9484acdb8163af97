use std::sync::atomic::Ordering;

use chrono::NaiveDateTime;
use tokio::sync::oneshot;

use crate::limits::MAX_APPOINTMENTS;
use crate::model::*;

use super::conflict::{check_slot_free, validate_slot};
use super::quota::check_quota;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    /// Atomically re-check quota and slot, then insert.
    ///
    /// The per-user mutex makes the quota count authoritative; the day's
    /// write lock makes the free-slot check and the insert one step.
    pub async fn book(
        &self,
        request: NewAppointment,
        now: NaiveDateTime,
    ) -> Result<Appointment, EngineError> {
        validate_slot(request.date, request.time, now)?;

        let user_lock = self.user_lock(request.user_id);
        let _user = user_lock.lock().await;
        check_quota(self.count_bookings_in_current_week(request.user_id, now))?;

        let _gate = self.commit_gate.read().await;
        let day = self.store.day_or_insert(request.date);
        let mut guard = day.write().await;
        check_slot_free(&guard, request.time)?;
        if self.store.appointment_count() >= MAX_APPOINTMENTS {
            return Err(EngineError::LimitExceeded("too many appointments"));
        }

        let appointment = Appointment {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            user_id: request.user_id,
            date: request.date,
            time: request.time,
            name: request.name,
            phone: request.phone,
            reminded: false,
        };
        let event = Event::AppointmentBooked(appointment.clone());
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!(
            "booked appointment {} for user {} at {} {}",
            appointment.id,
            appointment.user_id,
            appointment.date,
            appointment.time.format("%H:%M")
        );
        Ok(appointment)
    }

    /// Delete by id. `NotFound` if it is already gone.
    pub async fn cancel(&self, id: AppointmentId) -> Result<Appointment, EngineError> {
        self.cancel_checked(id, |_| true).await
    }

    /// Delete by id if `allowed` accepts the row as it stands under the
    /// day lock; otherwise `NotCancellable`.
    pub async fn cancel_checked(
        &self,
        id: AppointmentId,
        allowed: impl FnOnce(&Appointment) -> bool,
    ) -> Result<Appointment, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_write(id).await?;
        let appointment = guard.find(id).cloned().ok_or(EngineError::NotFound(id))?;
        if !allowed(&appointment) {
            return Err(EngineError::NotCancellable(id));
        }

        let event = Event::AppointmentCancelled {
            id,
            user_id: appointment.user_id,
            date: appointment.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        tracing::info!("cancelled appointment {id} of user {}", appointment.user_id);
        Ok(appointment)
    }

    /// Conditional per-row update of the reminded flag.
    /// `Ok(true)` if this call flipped it, `Ok(false)` if it was already set.
    pub async fn mark_reminded(&self, id: AppointmentId) -> Result<bool, EngineError> {
        let _gate = self.commit_gate.read().await;
        let mut guard = self.resolve_write(id).await?;
        let appointment = guard.find(id).ok_or(EngineError::NotFound(id))?;
        if appointment.reminded {
            return Ok(false);
        }
        let event = Event::ReminderMarked {
            id,
            user_id: appointment.user_id,
            date: appointment.date,
        };
        self.persist_and_apply(&mut guard, &event).await?;
        Ok(true)
    }

    /// Rewrite the WAL with just the events that rebuild the current state.
    /// Holds the commit gate exclusively, so the snapshot and the rewrite
    /// see the same store.
    pub async fn compact_wal(&self) -> Result<usize, EngineError> {
        let _gate = self.commit_gate.write().await;

        let mut events = vec![Event::IdsReserved {
            next_id: self.next_id.load(Ordering::SeqCst),
        }];
        for date in self.store.dates() {
            let Some(day) = self.store.day(&date) else { continue };
            let guard = day.read().await;
            events.extend(guard.slots.values().cloned().map(Event::AppointmentBooked));
        }
        let written = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Rewrite { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        Ok(written)
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
