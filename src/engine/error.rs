use chrono::{NaiveDate, NaiveTime};

use crate::model::AppointmentId;

#[derive(Debug)]
pub enum EngineError {
    NotFound(AppointmentId),
    SlotTaken { date: NaiveDate, time: NaiveTime },
    QuotaExceeded { limit: usize },
    OutsideCalendar { date: NaiveDate, time: NaiveTime },
    SlotInPast { date: NaiveDate, time: NaiveTime },
    NotCancellable(AppointmentId),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "appointment not found: {id}"),
            EngineError::SlotTaken { date, time } => {
                write!(f, "slot {date} {} is already booked", time.format("%H:%M"))
            }
            EngineError::QuotaExceeded { limit } => {
                write!(f, "weekly limit of {limit} bookings reached")
            }
            EngineError::OutsideCalendar { date, time } => {
                write!(f, "{date} {} is not a bookable slot", time.format("%H:%M"))
            }
            EngineError::SlotInPast { date, time } => {
                write!(f, "slot {date} {} has already started", time.format("%H:%M"))
            }
            EngineError::NotCancellable(id) => {
                write!(f, "appointment {id} cannot be cancelled by this caller")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
