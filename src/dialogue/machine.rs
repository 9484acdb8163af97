use chrono::{NaiveDate, NaiveTime};

use crate::model::{Name, Phone};

use super::DialogueError;

/// The draft field currently under yes/no confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Date,
    Time,
    Name,
    Phone,
}

/// A proposed, already validated value for one draft field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftValue {
    Date(NaiveDate),
    Time(NaiveTime),
    Name(Name),
    Phone(Phone),
}

impl DraftValue {
    pub fn field(&self) -> Field {
        match self {
            DraftValue::Date(_) => Field::Date,
            DraftValue::Time(_) => Field::Time,
            DraftValue::Name(_) => Field::Name,
            DraftValue::Phone(_) => Field::Phone,
        }
    }
}

/// Drives the single confirmation handler shared by all four fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConfirmation {
    pub field: Field,
    pub value: DraftValue,
}

impl PendingConfirmation {
    pub fn new(value: DraftValue) -> Self {
        Self {
            field: value.field(),
            value,
        }
    }
}

/// Values accepted so far. A field is set only after the user said "yes".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Draft {
    pub date: Option<NaiveDate>,
    pub time: Option<NaiveTime>,
    pub name: Option<Name>,
    pub phone: Option<Phone>,
}

impl Draft {
    fn accept(&mut self, value: DraftValue) {
        match value {
            DraftValue::Date(d) => self.date = Some(d),
            DraftValue::Time(t) => self.time = Some(t),
            DraftValue::Name(n) => self.name = Some(n),
            DraftValue::Phone(p) => self.phone = Some(p),
        }
    }

    fn complete(&self) -> Option<Booking> {
        Some(Booking {
            date: self.date?,
            time: self.time?,
            name: self.name.clone()?,
            phone: self.phone.clone()?,
        })
    }
}

/// A fully confirmed draft, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Booking {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: Name,
    pub phone: Phone,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum State {
    #[default]
    Idle,
    AwaitingDate,
    AwaitingTime,
    AwaitingName,
    AwaitingPhone,
    Confirming(PendingConfirmation),
    MainMenu,
}

impl State {
    pub fn label(&self) -> &'static str {
        match self {
            State::Idle => "idle",
            State::AwaitingDate => "awaiting_date",
            State::AwaitingTime => "awaiting_time",
            State::AwaitingName => "awaiting_name",
            State::AwaitingPhone => "awaiting_phone",
            State::Confirming(_) => "confirming",
            State::MainMenu => "main_menu",
        }
    }

    /// Whether a booking dialogue is in progress.
    pub fn is_open(&self) -> bool {
        !matches!(self, State::Idle | State::MainMenu)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    Change,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Start,
    Date(NaiveDate),
    Time(NaiveTime),
    Name(String),
    Phone(String),
    Answer(Answer),
}

/// What the caller must do before the transition may be committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Offer days to a fresh dialogue. The weekly quota is checked before
    /// the session is opened.
    Begin,
    OfferDays,
    OfferTimes(NaiveDate),
    /// Verify the value is still on offer, then ask yes/no.
    Confirm(DraftValue),
    AskName,
    AskPhone,
    Book(Booking),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub effect: Effect,
    pub next: State,
    pub draft: Draft,
}

/// The booking dialogue as a pure table:
/// `(state, draft, input) → (effect, next state, next draft)`.
///
/// Nothing here touches the store. The caller executes the effect and
/// commits the next state only if the effect succeeds.
pub fn transition(
    state: &State,
    draft: &Draft,
    input: Input,
) -> Result<Transition, DialogueError> {
    match (state, input) {
        (_, Input::Start) => Ok(Transition {
            effect: Effect::Begin,
            next: State::AwaitingDate,
            draft: Draft::default(),
        }),
        (State::AwaitingDate, Input::Date(date)) => Ok(propose(draft, DraftValue::Date(date))),
        (State::AwaitingTime, Input::Time(time)) => Ok(propose(draft, DraftValue::Time(time))),
        (State::AwaitingName, Input::Name(raw)) => {
            Ok(propose(draft, DraftValue::Name(Name::parse(&raw)?)))
        }
        (State::AwaitingPhone, Input::Phone(raw)) => {
            Ok(propose(draft, DraftValue::Phone(Phone::parse(&raw)?)))
        }
        (State::Confirming(pending), Input::Answer(Answer::Yes)) => advance(state, draft, pending),
        (State::Confirming(pending), Input::Answer(Answer::Change)) => {
            revisit(state, draft, pending.field)
        }
        (state, input) => Err(unexpected(state, &input)),
    }
}

fn unexpected(state: &State, input: &Input) -> DialogueError {
    DialogueError::UnexpectedInput {
        state: state.label(),
        input: crate::observability::input_label(input),
    }
}

fn propose(draft: &Draft, value: DraftValue) -> Transition {
    Transition {
        effect: Effect::Confirm(value.clone()),
        next: State::Confirming(PendingConfirmation::new(value)),
        draft: draft.clone(),
    }
}

/// "Yes": accept the pending value and move to the next collection step.
fn advance(
    state: &State,
    draft: &Draft,
    pending: &PendingConfirmation,
) -> Result<Transition, DialogueError> {
    let mut draft = draft.clone();
    draft.accept(pending.value.clone());
    let (effect, next) = match &pending.value {
        DraftValue::Date(date) => (Effect::OfferTimes(*date), State::AwaitingTime),
        DraftValue::Time(_) => (Effect::AskName, State::AwaitingName),
        DraftValue::Name(_) => (Effect::AskPhone, State::AwaitingPhone),
        DraftValue::Phone(_) => {
            let booking = draft
                .complete()
                .ok_or_else(|| unexpected(state, &Input::Answer(Answer::Yes)))?;
            return Ok(Transition {
                effect: Effect::Book(booking),
                next: State::MainMenu,
                draft: Draft::default(),
            });
        }
    };
    Ok(Transition { effect, next, draft })
}

/// "Change": drop the pending value and ask for the same field again.
fn revisit(state: &State, draft: &Draft, field: Field) -> Result<Transition, DialogueError> {
    let (effect, next) = match field {
        Field::Date => (Effect::OfferDays, State::AwaitingDate),
        Field::Time => {
            let date = draft
                .date
                .ok_or_else(|| unexpected(state, &Input::Answer(Answer::Change)))?;
            (Effect::OfferTimes(date), State::AwaitingTime)
        }
        Field::Name => (Effect::AskName, State::AwaitingName),
        Field::Phone => (Effect::AskPhone, State::AwaitingPhone),
    };
    Ok(Transition {
        effect,
        next,
        draft: draft.clone(),
    })
}
