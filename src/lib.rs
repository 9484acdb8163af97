pub mod calendar;
pub mod cancel;
pub mod config;
pub mod dialogue;
pub mod engine;
pub mod limits;
pub mod model;
pub mod observability;
pub mod operator;
pub mod reaper;
pub mod reminder;
pub mod wal;
