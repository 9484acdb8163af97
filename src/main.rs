use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use weekslot::config::Config;
use weekslot::dialogue::Conversations;
use weekslot::engine::Engine;
use weekslot::reminder::{JsonLinesNotifier, Reminders, run_reminder};

/// How often the session reaper and the compactor wake up.
const MAINTENANCE_PERIOD: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env file is normal in production.
    let _ = dotenvy::dotenv();
    // Stdout carries the reminder stream, so logs go to stderr.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let config = Config::from_env()?;
    weekslot::observability::init(config.metrics_port)?;

    std::fs::create_dir_all(&config.data_dir)?;
    let engine = Arc::new(Engine::open(config.wal_path())?);
    let conversations = Arc::new(Conversations::new(engine.clone(), config.session_ttl));

    let notifier = Arc::new(JsonLinesNotifier::new(tokio::io::stdout()));
    let reminders = Arc::new(Reminders::new(engine.clone(), notifier, config.reminder_policy));

    info!("weekslot started");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  appointments: {}", engine.appointment_count());
    info!("  operator: {}", config.operator_id.map_or("none".to_string(), |id| id.to_string()));
    info!("  reminders: {:?} every {}s", config.reminder_policy, config.reminder_period.as_secs());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    let tasks = [
        tokio::spawn(run_reminder(reminders, config.reminder_period)),
        tokio::spawn(weekslot::reaper::run_session_reaper(
            conversations,
            engine.clone(),
            MAINTENANCE_PERIOD,
        )),
        tokio::spawn(weekslot::reaper::run_compactor(
            engine.clone(),
            config.compact_threshold,
            MAINTENANCE_PERIOD,
        )),
    ];

    shutdown_signal().await?;
    info!("shutdown signal received, stopping background tasks");
    for task in &tasks {
        task.abort();
    }

    // Leave a compact log behind so the next start replays quickly.
    match engine.compact_wal().await {
        Ok(written) => info!("final compaction wrote {written} events"),
        Err(e) => tracing::warn!("final compaction failed: {e}"),
    }
    info!("weekslot stopped");
    Ok(())
}

async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            r = tokio::signal::ctrl_c() => r,
            _ = sigterm.recv() => Ok(()),
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}
