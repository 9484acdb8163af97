use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

use crate::engine::{Engine, EngineError, now_local};
use crate::model::{Appointment, AppointmentId, UserId};
use crate::observability::{REMINDER_SWEEP_DURATION_SECONDS, REMINDERS_TOTAL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError(pub String);

impl std::fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "reminder delivery failed: {}", self.0)
    }
}

impl std::error::Error for DeliveryError {}

/// Outbound channel to the customer.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_reminder(&self, appointment: &Appointment) -> Result<(), DeliveryError>;
}

/// One reminder as handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderMessage {
    pub user_id: UserId,
    pub appointment_id: AppointmentId,
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub text: String,
}

impl ReminderMessage {
    pub fn for_appointment(appointment: &Appointment) -> Self {
        Self {
            user_id: appointment.user_id,
            appointment_id: appointment.id,
            date: appointment.date,
            time: appointment.time,
            text: format!(
                "Reminder: {}, you are booked for tomorrow, {} at {}.",
                appointment.name,
                appointment.date.format("%Y-%m-%d"),
                appointment.time.format("%H:%M")
            ),
        }
    }
}

/// Writes each reminder as one JSON line, for a transport process to relay.
pub struct JsonLinesNotifier<W> {
    out: Mutex<W>,
}

impl<W> JsonLinesNotifier<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

#[async_trait]
impl<W: AsyncWrite + Unpin + Send> Notifier for JsonLinesNotifier<W> {
    async fn send_reminder(&self, appointment: &Appointment) -> Result<(), DeliveryError> {
        let mut line = serde_json::to_vec(&ReminderMessage::for_appointment(appointment))
            .map_err(|e| DeliveryError(e.to_string()))?;
        line.push(b'\n');
        let mut out = self.out.lock().await;
        out.write_all(&line).await.map_err(|e| DeliveryError(e.to_string()))?;
        out.flush().await.map_err(|e| DeliveryError(e.to_string()))
    }
}

/// Earliest lead time at which a reminder goes out.
pub fn window_start() -> TimeDelta {
    TimeDelta::hours(23) + TimeDelta::minutes(59)
}

pub fn window_end() -> TimeDelta {
    TimeDelta::hours(24) + TimeDelta::minutes(1)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ReminderPolicy {
    /// Send only while the lead time is inside `[23h59m, 24h1m]`.
    /// A failure near the end of the window drops the reminder.
    #[default]
    Window,
    /// Once inside `24h1m`, keep retrying until a send succeeds or the
    /// appointment starts.
    UntilDue,
}

impl ReminderPolicy {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "window" => Some(ReminderPolicy::Window),
            "until-due" => Some(ReminderPolicy::UntilDue),
            _ => None,
        }
    }

    pub fn is_due(&self, appointment: &Appointment, now: NaiveDateTime) -> bool {
        let lead = appointment.starts_at() - now;
        match self {
            ReminderPolicy::Window => lead >= window_start() && lead <= window_end(),
            ReminderPolicy::UntilDue => lead > TimeDelta::zero() && lead <= window_end(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Day-ahead reminders. Each sweep notifies the owner of every unreminded
/// appointment that falls due under the active policy. The flag is set only
/// after the notifier reports success.
pub struct Reminders {
    engine: Arc<Engine>,
    notifier: Arc<dyn Notifier>,
    policy: ReminderPolicy,
    in_flight: DashSet<AppointmentId>,
}

impl Reminders {
    pub fn new(engine: Arc<Engine>, notifier: Arc<dyn Notifier>, policy: ReminderPolicy) -> Self {
        Self {
            engine,
            notifier,
            policy,
            in_flight: DashSet::new(),
        }
    }

    pub fn policy(&self) -> ReminderPolicy {
        self.policy
    }

    /// One pass over every unreminded appointment.
    pub async fn sweep(&self, now: NaiveDateTime) -> SweepReport {
        let start = std::time::Instant::now();
        let mut report = SweepReport::default();

        for appt in self.engine.pending_reminders().await {
            if !self.policy.is_due(&appt, now) {
                continue;
            }
            if !self.in_flight.insert(appt.id) {
                report.skipped += 1;
                continue;
            }
            self.remind(appt.id, &mut report).await;
            self.in_flight.remove(&appt.id);
        }

        metrics::histogram!(REMINDER_SWEEP_DURATION_SECONDS).record(start.elapsed().as_secs_f64());
        report
    }

    /// Caller holds the in-flight claim for `id`.
    async fn remind(&self, id: AppointmentId, report: &mut SweepReport) {
        // The scan may be stale: another sweep can have finished this one
        // before our claim, or the customer cancelled.
        let Some(appt) = self.engine.get(id).await.filter(|a| !a.reminded) else {
            report.skipped += 1;
            return;
        };

        if let Err(e) = self.notifier.send_reminder(&appt).await {
            tracing::warn!("reminder for appointment {id} to user {}: {e}", appt.user_id);
            metrics::counter!(REMINDERS_TOTAL, "status" => "failed").increment(1);
            report.failed += 1;
            return;
        }

        match self.engine.mark_reminded(id).await {
            Ok(true) => {
                tracing::info!("reminded user {} of appointment {id}", appt.user_id);
                metrics::counter!(REMINDERS_TOTAL, "status" => "sent").increment(1);
                report.sent += 1;
            }
            Ok(false) | Err(EngineError::NotFound(_)) => {
                tracing::debug!("appointment {id} changed while its reminder was in flight");
                report.skipped += 1;
            }
            Err(e) => {
                tracing::warn!("reminder for appointment {id} sent but not recorded: {e}");
                metrics::counter!(REMINDERS_TOTAL, "status" => "unrecorded").increment(1);
                report.failed += 1;
            }
        }
    }
}

/// Background task: sweep on a fixed period against the local clock.
pub async fn run_reminder(reminders: Arc<Reminders>, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let report = reminders.sweep(now_local()).await;
        if report.sent > 0 || report.failed > 0 {
            tracing::info!(
                "reminder sweep: {} sent, {} failed, {} skipped",
                report.sent,
                report.failed,
                report.skipped
            );
        }
    }
}
