use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use crate::dialogue::Conversations;
use crate::engine::Engine;
use crate::observability::SESSIONS_EVICTED_TOTAL;

/// One housekeeping pass: drop finished and idle dialogues, then any
/// per-user state nobody references any more. Returns the number of evicted sessions.
pub fn reap_once(conversations: &Conversations, engine: &Engine, now: Instant) -> usize {
    let evicted = conversations.sessions().evict_idle(now);
    if evicted > 0 {
        metrics::counter!(SESSIONS_EVICTED_TOTAL).increment(evicted as u64);
        info!("evicted {evicted} idle dialogues");
    }
    let locks = engine.prune_user_locks();
    if locks > 0 {
        tracing::debug!("pruned {locks} user locks");
    }
    evicted
}

/// Background task that periodically evicts idle sessions.
pub async fn run_session_reaper(
    conversations: Arc<Conversations>,
    engine: Arc<Engine>,
    period: Duration,
) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        reap_once(&conversations, &engine, Instant::now());
    }
}

/// Background task that compacts the WAL once enough appends pile up.
pub async fn run_compactor(engine: Arc<Engine>, threshold: u64, period: Duration) {
    let mut interval = tokio::time::interval(period);
    loop {
        interval.tick().await;
        let appends = engine.wal_appends_since_compact().await;
        if appends < threshold {
            continue;
        }
        match engine.compact_wal().await {
            Ok(written) => info!("compacted WAL: {appends} appends down to {written} events"),
            Err(e) => tracing::warn!("WAL compaction failed: {e}"),
        }
    }
}
