use std::net::SocketAddr;

use crate::dialogue::Input;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: booking attempts reaching the store. Labels: status.
pub const BOOKINGS_TOTAL: &str = "weekslot_bookings_total";

/// Counter: cancellations. Labels: scope, status.
pub const CANCELLATIONS_TOTAL: &str = "weekslot_cancellations_total";

/// Counter: dialogue turns. Labels: input, status.
pub const DIALOGUE_TURNS_TOTAL: &str = "weekslot_dialogue_turns_total";

/// Counter: reminder delivery attempts. Labels: status.
pub const REMINDERS_TOTAL: &str = "weekslot_reminders_total";

/// Histogram: reminder sweep duration in seconds.
pub const REMINDER_SWEEP_DURATION_SECONDS: &str = "weekslot_reminder_sweep_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Gauge: open booking dialogues.
pub const SESSIONS_ACTIVE: &str = "weekslot_sessions_active";

/// Counter: dialogues evicted for inactivity.
pub const SESSIONS_EVICTED_TOTAL: &str = "weekslot_sessions_evicted_total";

/// Gauge: appointments currently stored.
pub const APPOINTMENTS_STORED: &str = "weekslot_appointments_stored";

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "weekslot_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "weekslot_wal_flush_batch_size";

/// Install Prometheus metrics exporter on the given port. No-op if port is None.
pub fn init(port: Option<u16>) -> Result<(), metrics_exporter_prometheus::BuildError> {
    let Some(port) = port else { return Ok(()) };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()?;
    tracing::info!("metrics endpoint: http://0.0.0.0:{port}/metrics");
    Ok(())
}

/// Map a dialogue input to a short label for metrics.
pub fn input_label(input: &Input) -> &'static str {
    match input {
        Input::Start => "start",
        Input::Date(_) => "date",
        Input::Time(_) => "time",
        Input::Name(_) => "name",
        Input::Phone(_) => "phone",
        Input::Answer(_) => "answer",
    }
}
