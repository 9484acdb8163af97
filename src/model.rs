use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::limits::MAX_NAME_LEN;

/// Transport-level user identifier (chat id).
pub type UserId = i64;

/// Store-assigned appointment id, monotonic and never reused.
pub type AppointmentId = i64;

// ── Validated fields ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    EmptyName,
    NameNotAlphabetic,
    NameTooLong,
    PhoneMissingPlus,
    PhoneNotDigits,
    PhoneWrongLength(usize),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::EmptyName => write!(f, "name must not be empty"),
            ValidationError::NameNotAlphabetic => write!(f, "name should contain only letters"),
            ValidationError::NameTooLong => {
                write!(f, "name longer than {MAX_NAME_LEN} characters")
            }
            ValidationError::PhoneMissingPlus => write!(f, "phone number must start with '+'"),
            ValidationError::PhoneNotDigits => {
                write!(f, "phone number must contain only digits after '+'")
            }
            ValidationError::PhoneWrongLength(len) => {
                write!(f, "phone number must be '+' and 11 digits, got {len} characters")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// Customer name: letters only, non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let name = raw.trim();
        if name.is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(ValidationError::NameTooLong);
        }
        if !name.chars().all(char::is_alphabetic) {
            return Err(ValidationError::NameNotAlphabetic);
        }
        Ok(Self(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Name {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Phone number in the form `+` followed by exactly 11 digits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Phone(String);

impl Phone {
    pub const LEN: usize = 12;

    pub fn parse(raw: &str) -> Result<Self, ValidationError> {
        let phone = raw.trim();
        let Some(digits) = phone.strip_prefix('+') else {
            return Err(ValidationError::PhoneMissingPlus);
        };
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(ValidationError::PhoneNotDigits);
        }
        let len = phone.chars().count();
        if len != Self::LEN {
            return Err(ValidationError::PhoneWrongLength(len));
        }
        Ok(Self(phone.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Phone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ── Appointments ─────────────────────────────────────────────────

/// A stored reservation. One per (date, time).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: AppointmentId,
    pub user_id: UserId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: Name,
    pub phone: Phone,
    /// Flips false → true once, after a confirmed reminder send.
    pub reminded: bool,
}

impl Appointment {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.date.and_time(self.time)
    }

    /// Strictly after `now`: later day, or same day and a later time.
    pub fn is_upcoming(&self, now: NaiveDateTime) -> bool {
        self.date > now.date() || (self.date == now.date() && self.time > now.time())
    }
}

/// A fully collected booking request, ready for the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAppointment {
    pub user_id: UserId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub name: Name,
    pub phone: Phone,
}

/// WAL record format. Each variant is one committed store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked(Appointment),
    AppointmentCancelled {
        id: AppointmentId,
        user_id: UserId,
        date: NaiveDate,
    },
    ReminderMarked {
        id: AppointmentId,
        user_id: UserId,
        date: NaiveDate,
    },
    /// Written first by compaction so the id sequence survives the rewrite.
    IdsReserved { next_id: AppointmentId },
}

impl Event {
    /// The calendar day an event mutates, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            Event::AppointmentBooked(appt) => Some(appt.date),
            Event::AppointmentCancelled { date, .. } | Event::ReminderMarked { date, .. } => {
                Some(*date)
            }
            Event::IdsReserved { .. } => None,
        }
    }
}
