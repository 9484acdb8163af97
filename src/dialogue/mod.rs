mod machine;
mod session;

pub use machine::{
    Answer, Booking, Draft, DraftValue, Effect, Field, Input, PendingConfirmation, State,
    Transition, transition,
};
pub use session::{Session, SessionRegistry, SharedSession};

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::engine::{DayAvailability, Engine, EngineError, check_quota};
use crate::limits::MAX_ACTIVE_SESSIONS;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, DIALOGUE_TURNS_TOTAL, input_label};

#[derive(Debug)]
pub enum DialogueError {
    Validation(ValidationError),
    QuotaExceeded { limit: usize },
    DateNotOffered(NaiveDate),
    SlotUnavailable { date: NaiveDate, times: Vec<NaiveTime> },
    UnexpectedInput { state: &'static str, input: &'static str },
    TooManySessions,
    Store(EngineError),
}

impl std::fmt::Display for DialogueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DialogueError::Validation(e) => write!(f, "{e}"),
            DialogueError::QuotaExceeded { limit } => {
                write!(f, "at most {limit} bookings per week")
            }
            DialogueError::DateNotOffered(date) => write!(f, "{date} is not on offer"),
            DialogueError::SlotUnavailable { date, times } => {
                write!(f, "slot on {date} is no longer available ({} left)", times.len())
            }
            DialogueError::UnexpectedInput { state, input } => {
                write!(f, "unexpected {input} input in state {state}")
            }
            DialogueError::TooManySessions => write!(f, "too many open dialogues"),
            DialogueError::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for DialogueError {}

impl From<ValidationError> for DialogueError {
    fn from(e: ValidationError) -> Self {
        DialogueError::Validation(e)
    }
}

impl From<EngineError> for DialogueError {
    fn from(e: EngineError) -> Self {
        DialogueError::Store(e)
    }
}

/// What the transport should render after a successful turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    ChooseDate(Vec<DayAvailability>),
    ChooseTime { date: NaiveDate, times: Vec<NaiveTime> },
    Confirm(DraftValue),
    AskName,
    AskPhone,
    Booked(Appointment),
}

/// The booking dialogue service: one session per user, turns executed
/// against the shared engine.
pub struct Conversations {
    engine: Arc<Engine>,
    sessions: SessionRegistry,
}

impl Conversations {
    pub fn new(engine: Arc<Engine>, session_ttl: Duration) -> Self {
        Self::with_session_limit(engine, session_ttl, MAX_ACTIVE_SESSIONS)
    }

    pub fn with_session_limit(
        engine: Arc<Engine>,
        session_ttl: Duration,
        max_sessions: usize,
    ) -> Self {
        Self {
            engine,
            sessions: SessionRegistry::new(session_ttl, max_sessions),
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub async fn start_dialogue(
        &self,
        user_id: UserId,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Start, now).await
    }

    pub async fn select_date(
        &self,
        user_id: UserId,
        date: NaiveDate,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Date(date), now).await
    }

    pub async fn select_time(
        &self,
        user_id: UserId,
        time: NaiveTime,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Time(time), now).await
    }

    pub async fn submit_name(
        &self,
        user_id: UserId,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Name(text.to_string()), now).await
    }

    pub async fn submit_phone(
        &self,
        user_id: UserId,
        text: &str,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Phone(text.to_string()), now).await
    }

    pub async fn confirm_or_change(
        &self,
        user_id: UserId,
        answer: Answer,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        self.turn(user_id, Input::Answer(answer), now).await
    }

    /// Current state; `Idle` for users without a session.
    pub async fn state(&self, user_id: UserId) -> State {
        match self.sessions.get(user_id) {
            Some(session) => session.lock().await.state.clone(),
            None => State::Idle,
        }
    }

    pub async fn last_appointment(&self, user_id: UserId) -> Option<Appointment> {
        self.engine.last_for_user(user_id).await
    }

    pub async fn booking_history(&self, user_id: UserId) -> Vec<Appointment> {
        self.engine.for_user(user_id).await
    }

    async fn turn(
        &self,
        user_id: UserId,
        input: Input,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        let label = input_label(&input);
        let result = self.run_turn(user_id, input, now).await;
        let status = match &result {
            Ok(_) => "ok",
            Err(DialogueError::Store(_)) => "error",
            Err(_) => "rejected",
        };
        metrics::counter!(DIALOGUE_TURNS_TOTAL, "input" => label, "status" => status).increment(1);
        if let Err(e) = &result {
            tracing::debug!("user {user_id}: {label} turn rejected: {e}");
        }
        result
    }

    async fn run_turn(
        &self,
        user_id: UserId,
        input: Input,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        // Only Start opens a session, and only within quota. Anything else
        // from a stranger is rejected without allocating one.
        let mut session = if matches!(input, Input::Start) {
            self.check_weekly_quota(user_id, now)?;
            self.sessions.lock_or_create(user_id).await?
        } else {
            self.sessions.lock(user_id).await.ok_or(DialogueError::UnexpectedInput {
                state: State::Idle.label(),
                input: input_label(&input),
            })?
        };

        let Transition { effect, next, draft } =
            transition(&session.state, &session.draft, input)?;
        let reply = match effect {
            Effect::Begin | Effect::OfferDays => {
                Reply::ChooseDate(self.engine.available_days(now).await)
            }
            Effect::OfferTimes(date) => Reply::ChooseTime {
                date,
                times: self.engine.available_times(date, now).await,
            },
            Effect::Confirm(value) => {
                self.check_offered(&value, &draft, now).await?;
                Reply::Confirm(value)
            }
            Effect::AskName => Reply::AskName,
            Effect::AskPhone => Reply::AskPhone,
            Effect::Book(booking) => return self.book(&mut session, user_id, booking, now).await,
        };

        session.state = next;
        session.draft = draft;
        Ok(reply)
    }

    fn check_weekly_quota(&self, user_id: UserId, now: NaiveDateTime) -> Result<(), DialogueError> {
        let count = self.engine.count_bookings_in_current_week(user_id, now);
        check_quota(count).map_err(|e| match e {
            EngineError::QuotaExceeded { limit } => DialogueError::QuotaExceeded { limit },
            other => DialogueError::Store(other),
        })
    }

    /// Dates and times must still be on offer when proposed.
    async fn check_offered(
        &self,
        value: &DraftValue,
        draft: &Draft,
        now: NaiveDateTime,
    ) -> Result<(), DialogueError> {
        match value {
            DraftValue::Date(date) => {
                let listed = self.engine.available_days(now).await.iter().any(|d| d.date == *date);
                if !listed || self.engine.available_times(*date, now).await.is_empty() {
                    return Err(DialogueError::DateNotOffered(*date));
                }
            }
            DraftValue::Time(time) => {
                let Some(date) = draft.date else {
                    return Err(DialogueError::UnexpectedInput {
                        state: "awaiting_time",
                        input: "time",
                    });
                };
                let times = self.engine.available_times(date, now).await;
                if !times.contains(time) {
                    return Err(DialogueError::SlotUnavailable { date, times });
                }
            }
            DraftValue::Name(_) | DraftValue::Phone(_) => {}
        }
        Ok(())
    }

    /// Write-through on the final "yes". The session is still locked, so the
    /// outcome is committed to it before anyone else can take a turn.
    async fn book(
        &self,
        session: &mut Session,
        user_id: UserId,
        booking: Booking,
        now: NaiveDateTime,
    ) -> Result<Reply, DialogueError> {
        let request = NewAppointment {
            user_id,
            date: booking.date,
            time: booking.time,
            name: booking.name.clone(),
            phone: booking.phone.clone(),
        };
        match self.engine.book(request, now).await {
            Ok(appointment) => {
                metrics::counter!(BOOKINGS_TOTAL, "status" => "ok").increment(1);
                session.state = State::MainMenu;
                session.draft = Draft::default();
                Ok(Reply::Booked(appointment))
            }
            Err(
                EngineError::SlotTaken { date, .. }
                | EngineError::SlotInPast { date, .. }
                | EngineError::OutsideCalendar { date, .. },
            ) => {
                metrics::counter!(BOOKINGS_TOTAL, "status" => "slot_taken").increment(1);
                tracing::warn!("user {user_id} lost {date} {} to another booking", booking.time);
                session.state = State::AwaitingTime;
                session.draft = Draft {
                    date: Some(booking.date),
                    time: None,
                    name: Some(booking.name),
                    phone: Some(booking.phone),
                };
                let times = self.engine.available_times(date, now).await;
                Err(DialogueError::SlotUnavailable { date, times })
            }
            Err(EngineError::QuotaExceeded { limit }) => {
                metrics::counter!(BOOKINGS_TOTAL, "status" => "quota").increment(1);
                session.state = State::MainMenu;
                session.draft = Draft::default();
                Err(DialogueError::QuotaExceeded { limit })
            }
            Err(e) => {
                metrics::counter!(BOOKINGS_TOTAL, "status" => "error").increment(1);
                tracing::warn!("booking for user {user_id} failed: {e}");
                Err(DialogueError::Store(e))
            }
        }
    }
}
