use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use dashmap::DashMap;

use crate::dialogue::Answer;
use crate::engine::{Engine, EngineError};
use crate::limits::MAX_PENDING_CANCELLATIONS;
use crate::model::*;
use crate::observability::CANCELLATIONS_TOTAL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelScope {
    /// The customer's own future appointments.
    Own(UserId),
    /// Everything on one day, operator only.
    OnDate(NaiveDate),
}

impl CancelScope {
    fn label(&self) -> &'static str {
        match self {
            CancelScope::Own(_) => "own",
            CancelScope::OnDate(_) => "operator",
        }
    }

    /// Whether `appt` may be cancelled under this scope at `now`.
    fn covers(&self, appt: &Appointment, now: NaiveDateTime) -> bool {
        match self {
            CancelScope::Own(user_id) => appt.user_id == *user_id && appt.is_upcoming(now),
            CancelScope::OnDate(date) => appt.date == *date,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelStep {
    AwaitingConfirmation(Appointment),
    AlreadyGone(AppointmentId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled(Appointment),
    AlreadyGone(AppointmentId),
    Kept { listing: Vec<Appointment> },
    NothingPending,
}

#[derive(Debug)]
pub enum CancelError {
    Unauthorized,
    NotCancellable(AppointmentId),
    Store(EngineError),
}

impl std::fmt::Display for CancelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CancelError::Unauthorized => write!(f, "not allowed to cancel in this scope"),
            CancelError::NotCancellable(id) => {
                write!(f, "appointment {id} cannot be cancelled here")
            }
            CancelError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for CancelError {}

#[derive(Debug, Clone, Copy)]
struct PendingCancel {
    scope: CancelScope,
    id: AppointmentId,
}

/// Two-step cancellation shared by customers and the operator.
///
/// `request_confirmation` parks the target per actor, `confirm` either
/// deletes it or hands back the listing. A row that vanished in between is
/// reported as `AlreadyGone`, never as an error.
pub struct Cancellations {
    engine: Arc<Engine>,
    operator: Option<UserId>,
    pending: DashMap<UserId, PendingCancel>,
    max_pending: usize,
}

impl Cancellations {
    pub fn new(engine: Arc<Engine>, operator: Option<UserId>) -> Self {
        Self::with_pending_limit(engine, operator, MAX_PENDING_CANCELLATIONS)
    }

    pub fn with_pending_limit(
        engine: Arc<Engine>,
        operator: Option<UserId>,
        max_pending: usize,
    ) -> Self {
        Self {
            engine,
            operator,
            pending: DashMap::new(),
            max_pending,
        }
    }

    fn authorize(&self, actor: UserId, scope: CancelScope) -> Result<(), CancelError> {
        let allowed = match scope {
            CancelScope::Own(user_id) => actor == user_id,
            CancelScope::OnDate(_) => self.operator == Some(actor),
        };
        if allowed { Ok(()) } else { Err(CancelError::Unauthorized) }
    }

    /// Appointments the actor may cancel under `scope`, ordered by date then time.
    pub async fn list(
        &self,
        actor: UserId,
        scope: CancelScope,
        now: NaiveDateTime,
    ) -> Result<Vec<Appointment>, CancelError> {
        self.authorize(actor, scope)?;
        Ok(match scope {
            CancelScope::Own(user_id) => self.engine.upcoming_for_user(user_id, now).await,
            CancelScope::OnDate(date) => self.engine.on_date(date).await,
        })
    }

    /// Park `id` as the actor's pending target and return it for a yes/no
    /// prompt. Replaces any earlier pending target of the same actor.
    pub async fn request_confirmation(
        &self,
        actor: UserId,
        scope: CancelScope,
        id: AppointmentId,
        now: NaiveDateTime,
    ) -> Result<CancelStep, CancelError> {
        self.authorize(actor, scope)?;
        let Some(appt) = self.engine.get(id).await else {
            return Ok(CancelStep::AlreadyGone(id));
        };
        if !scope.covers(&appt, now) {
            return Err(CancelError::NotCancellable(id));
        }
        if !self.pending.contains_key(&actor) && self.pending.len() >= self.max_pending {
            return Err(CancelError::Store(EngineError::LimitExceeded(
                "too many pending cancellations",
            )));
        }
        self.pending.insert(actor, PendingCancel { scope, id });
        Ok(CancelStep::AwaitingConfirmation(appt))
    }

    /// Resolve the actor's pending request. `Answer::Change` keeps the
    /// appointment and returns the listing it was picked from.
    pub async fn confirm(
        &self,
        actor: UserId,
        answer: Answer,
        now: NaiveDateTime,
    ) -> Result<CancelOutcome, CancelError> {
        let Some((_, pending)) = self.pending.remove(&actor) else {
            return Ok(CancelOutcome::NothingPending);
        };
        match answer {
            Answer::Yes => self.cancel_appointment(actor, pending.scope, pending.id, now).await,
            Answer::Change => Ok(CancelOutcome::Kept {
                listing: self.list(actor, pending.scope, now).await?,
            }),
        }
    }

    /// Scoped delete without the confirmation step.
    pub async fn cancel_appointment(
        &self,
        actor: UserId,
        scope: CancelScope,
        id: AppointmentId,
        now: NaiveDateTime,
    ) -> Result<CancelOutcome, CancelError> {
        self.authorize(actor, scope)?;
        let result = self.engine.cancel_checked(id, |appt| scope.covers(appt, now)).await;
        let (status, outcome) = match result {
            Ok(appt) => ("ok", Ok(CancelOutcome::Cancelled(appt))),
            Err(EngineError::NotFound(id)) => {
                tracing::warn!("appointment {id} already gone when {actor} tried to cancel it");
                ("already_gone", Ok(CancelOutcome::AlreadyGone(id)))
            }
            Err(EngineError::NotCancellable(id)) => {
                ("rejected", Err(CancelError::NotCancellable(id)))
            }
            Err(e) => ("error", Err(CancelError::Store(e))),
        };
        metrics::counter!(CANCELLATIONS_TOTAL, "scope" => scope.label(), "status" => status)
            .increment(1);
        outcome
    }

    pub fn has_pending(&self, actor: UserId) -> bool {
        self.pending.contains_key(&actor)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use chrono::NaiveTime;

    use super::*;

    const OPERATOR: UserId = 99;

    fn test_wal_path(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join("weekslot_test_cancel");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(name);
        let _ = std::fs::remove_file(&path);
        path
    }

    fn setup(name: &str) -> (Arc<Engine>, Cancellations) {
        let engine = Arc::new(Engine::open(test_wal_path(name)).unwrap());
        (engine.clone(), Cancellations::new(engine, Some(OPERATOR)))
    }

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, day).unwrap()
    }

    fn at(h: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, 0, 0).unwrap()
    }

    /// Friday 2024-06-07, 09:00.
    fn now() -> NaiveDateTime {
        d(7).and_hms_opt(9, 0, 0).unwrap()
    }

    async fn book(engine: &Engine, user: UserId, day: u32, hour: u32) -> Appointment {
        let request = NewAppointment {
            user_id: user,
            date: d(day),
            time: at(hour),
            name: Name::parse("Anna").unwrap(),
            phone: Phone::parse("+37369123456").unwrap(),
        };
        engine.book(request, now()).await.unwrap()
    }

    #[tokio::test]
    async fn own_cancellation_confirmed() {
        let (engine, cancels) = setup("own_confirmed.wal");
        let appt = book(&engine, 1, 10, 14).await;

        let listing = cancels.list(1, CancelScope::Own(1), now()).await.unwrap();
        assert_eq!(listing, vec![appt.clone()]);

        let step = cancels
            .request_confirmation(1, CancelScope::Own(1), appt.id, now())
            .await
            .unwrap();
        assert_eq!(step, CancelStep::AwaitingConfirmation(appt.clone()));
        assert!(cancels.has_pending(1));

        let outcome = cancels.confirm(1, Answer::Yes, now()).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled(appt.clone()));
        assert!(!cancels.has_pending(1));
        assert!(engine.upcoming_for_user(1, now()).await.is_empty());
        assert!(engine.on_date(d(10)).await.is_empty());
    }

    #[tokio::test]
    async fn declining_keeps_and_relists() {
        let (engine, cancels) = setup("declining_keeps.wal");
        let appt = book(&engine, 1, 10, 14).await;
        cancels
            .request_confirmation(1, CancelScope::Own(1), appt.id, now())
            .await
            .unwrap();

        let outcome = cancels.confirm(1, Answer::Change, now()).await.unwrap();
        assert_eq!(outcome, CancelOutcome::Kept { listing: vec![appt] });
        assert_eq!(engine.appointment_count(), 1);
        assert_eq!(
            cancels.confirm(1, Answer::Yes, now()).await.unwrap(),
            CancelOutcome::NothingPending
        );
    }

    #[tokio::test]
    async fn vanished_row_reported_as_gone() {
        let (engine, cancels) = setup("vanished_row.wal");
        let appt = book(&engine, 1, 10, 14).await;
        cancels
            .request_confirmation(OPERATOR, CancelScope::OnDate(d(10)), appt.id, now())
            .await
            .unwrap();
        // The customer cancels first.
        cancels.cancel_appointment(1, CancelScope::Own(1), appt.id, now()).await.unwrap();

        let outcome = cancels.confirm(OPERATOR, Answer::Yes, now()).await.unwrap();
        assert_eq!(outcome, CancelOutcome::AlreadyGone(appt.id));
        let step = cancels
            .request_confirmation(1, CancelScope::Own(1), appt.id, now())
            .await
            .unwrap();
        assert_eq!(step, CancelStep::AlreadyGone(appt.id));
    }

    #[tokio::test]
    async fn customers_limited_to_own_future_rows() {
        let (engine, cancels) = setup("own_future_only.wal");
        let mine = book(&engine, 1, 7, 10).await;
        let theirs = book(&engine, 2, 10, 14).await;

        let err = cancels.list(1, CancelScope::Own(2), now()).await.unwrap_err();
        assert!(matches!(err, CancelError::Unauthorized));
        let err = cancels
            .request_confirmation(1, CancelScope::Own(1), theirs.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, CancelError::NotCancellable(id) if id == theirs.id));

        // 10:00 today has started by 10:30.
        let later = d(7).and_hms_opt(10, 30, 0).unwrap();
        assert!(cancels.list(1, CancelScope::Own(1), later).await.unwrap().is_empty());
        let err = cancels
            .cancel_appointment(1, CancelScope::Own(1), mine.id, later)
            .await
            .unwrap_err();
        assert!(matches!(err, CancelError::NotCancellable(_)));
        assert_eq!(engine.appointment_count(), 2);
    }

    #[tokio::test]
    async fn operator_scope_requires_operator() {
        let (engine, cancels) = setup("operator_scope.wal");
        let appt = book(&engine, 1, 10, 14).await;

        let err = cancels.list(1, CancelScope::OnDate(d(10)), now()).await.unwrap_err();
        assert!(matches!(err, CancelError::Unauthorized));

        let listing = cancels.list(OPERATOR, CancelScope::OnDate(d(10)), now()).await.unwrap();
        assert_eq!(listing, vec![appt.clone()]);

        // Wrong day for the scope.
        let err = cancels
            .cancel_appointment(OPERATOR, CancelScope::OnDate(d(11)), appt.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, CancelError::NotCancellable(_)));

        let outcome = cancels
            .cancel_appointment(OPERATOR, CancelScope::OnDate(d(10)), appt.id, now())
            .await
            .unwrap();
        assert_eq!(outcome, CancelOutcome::Cancelled(appt));
    }

    #[tokio::test]
    async fn operator_may_cancel_past_rows() {
        let (engine, cancels) = setup("operator_past_rows.wal");
        let appt = book(&engine, 1, 7, 10).await;
        let evening = d(7).and_hms_opt(20, 0, 0).unwrap();
        let outcome = cancels
            .cancel_appointment(OPERATOR, CancelScope::OnDate(d(7)), appt.id, evening)
            .await
            .unwrap();
        assert!(matches!(outcome, CancelOutcome::Cancelled(_)));
    }

    #[tokio::test]
    async fn no_operator_configured_denies_scope() {
        let engine = Arc::new(Engine::open(test_wal_path("no_operator.wal")).unwrap());
        let cancels = Cancellations::new(engine, None);
        let err = cancels.list(OPERATOR, CancelScope::OnDate(d(10)), now()).await.unwrap_err();
        assert!(matches!(err, CancelError::Unauthorized));
    }

    #[tokio::test]
    async fn pending_cap_refuses_new_actors_only() {
        let engine = Arc::new(Engine::open(test_wal_path("pending_cap.wal")).unwrap());
        let cancels = Cancellations::with_pending_limit(engine.clone(), Some(OPERATOR), 1);
        let first = book(&engine, 1, 10, 14).await;
        let second = book(&engine, 2, 10, 15).await;

        cancels.request_confirmation(1, CancelScope::Own(1), first.id, now()).await.unwrap();
        let err = cancels
            .request_confirmation(2, CancelScope::Own(2), second.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, CancelError::Store(EngineError::LimitExceeded(_))));
        assert!(!cancels.has_pending(2));

        let err = cancels
            .request_confirmation(OPERATOR, CancelScope::OnDate(d(10)), second.id, now())
            .await
            .unwrap_err();
        assert!(matches!(err, CancelError::Store(EngineError::LimitExceeded(_))));

        // The actor already pending may ask again at the cap.
        assert_eq!(
            cancels.request_confirmation(1, CancelScope::Own(1), first.id, now()).await.unwrap(),
            CancelStep::AwaitingConfirmation(first.clone())
        );

        // Resolving frees the slot for someone else.
        cancels.confirm(1, Answer::Change, now()).await.unwrap();
        let step = cancels.request_confirmation(2, CancelScope::Own(2), second.id, now()).await;
        assert_eq!(step.unwrap(), CancelStep::AwaitingConfirmation(second));
    }
}
