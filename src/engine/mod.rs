mod availability;
mod conflict;
mod error;
mod mutations;
mod queries;
mod quota;
mod store;

pub use availability::{
    DayAvailability, DayLoad, SlotFilter, booking_lead, day_availability, open_times,
};
pub use conflict::now_local;
pub use error::EngineError;
pub use quota::{check_quota, count_in_week, week_window};
pub use store::{DayBook, SharedDay};

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use dashmap::DashMap;
use tokio::sync::{Mutex, RwLock, mpsc, oneshot};

use crate::limits::WAL_CHANNEL_CAPACITY;
use crate::model::*;
use crate::wal::Wal;

use store::InMemoryStore;

// ── Group-commit WAL channel ─────────────────────────────

enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Rewrite {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Background task that owns the WAL and batches appends for group commit:
/// block for the first append, drain whatever else is already queued, then
/// fsync once and answer every sender with the shared result.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let WalCommand::Append { event, response } = cmd else {
            handle_non_append(&mut wal, cmd);
            continue;
        };
        let mut batch = vec![(event, response)];
        let mut deferred = None;
        loop {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => {
                    deferred = Some(other);
                    break;
                }
                Err(_) => break,
            }
        }

        metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
        let flush_start = std::time::Instant::now();
        let result = flush_batch(&mut wal, &batch);
        metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
            .record(flush_start.elapsed().as_secs_f64());
        respond_batch(batch, &result);

        if let Some(cmd) = deferred {
            handle_non_append(&mut wal, cmd);
        }
    }
}

fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    let mut append_err = None;
    for (event, _) in batch {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Flush even after an append error so partial bytes don't leak into
    // the next batch.
    let flush_err = wal.flush_sync().err();
    match (append_err, flush_err) {
        (Some(e), _) | (None, Some(e)) => Err(e),
        (None, None) => Ok(()),
    }
}

fn respond_batch(batch: Vec<PendingAppend>, result: &io::Result<()>) {
    for (_, tx) in batch {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Rewrite { events, response } => {
            let _ = response.send(wal.rewrite(&events));
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!("appends are batched by the writer loop"),
    }
}

/// The appointment store: in-memory day books made durable by the WAL.
///
/// Lock order for writers: per-user mutex, then the commit gate (read), then
/// the day's write lock. Compaction takes the commit gate for writing, so no
/// mutation can land between its snapshot and the rewrite.
pub struct Engine {
    store: InMemoryStore,
    wal_tx: mpsc::Sender<WalCommand>,
    next_id: AtomicI64,
    user_locks: DashMap<UserId, Arc<Mutex<()>>>,
    commit_gate: RwLock<()>,
    wal_path: PathBuf,
}

impl Engine {
    /// Replay the WAL at `wal_path` and start its writer task.
    /// Must be called inside a tokio runtime.
    pub fn open(wal_path: PathBuf) -> io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(WAL_CHANNEL_CAPACITY);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            store: InMemoryStore::new(),
            wal_tx,
            next_id: AtomicI64::new(1),
            user_locks: DashMap::new(),
            commit_gate: RwLock::new(()),
            wal_path,
        };

        // Sole owner of every day lock during replay, so try_write always
        // succeeds. Never block here: open may run inside an async context.
        for event in &events {
            match event {
                Event::IdsReserved { next_id } => {
                    engine.next_id.fetch_max(*next_id, Ordering::SeqCst);
                }
                Event::AppointmentBooked(appt) => {
                    engine.next_id.fetch_max(appt.id + 1, Ordering::SeqCst);
                }
                _ => {}
            }
            if let Some(date) = event.date() {
                let day = engine.store.day_or_insert(date);
                let mut guard = day.try_write().map_err(io::Error::other)?;
                engine.store.apply_event(&mut guard, event);
            }
        }

        tracing::info!(
            "replayed {} events from {}: {} appointments",
            events.len(),
            engine.wal_path.display(),
            engine.store.appointment_count()
        );
        metrics::gauge!(crate::observability::APPOINTMENTS_STORED)
            .set(engine.store.appointment_count() as f64);
        Ok(engine)
    }

    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }

    /// Write event to WAL via the background group-commit writer.
    async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// WAL-append, then apply. Nothing is applied if the
    /// append fails, so a failed write leaves no half-stored appointment.
    async fn persist_and_apply(
        &self,
        day: &mut DayBook,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.store.apply_event(day, event);
        metrics::gauge!(crate::observability::APPOINTMENTS_STORED)
            .set(self.store.appointment_count() as f64);
        Ok(())
    }

    /// The per-user booking mutex, created on first use.
    fn user_lock(&self, user_id: UserId) -> Arc<Mutex<()>> {
        self.user_locks.entry(user_id).or_default().clone()
    }

    /// Drop per-user mutexes nobody is holding.
    pub fn prune_user_locks(&self) -> usize {
        let before = self.user_locks.len();
        self.user_locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        before - self.user_locks.len()
    }

    /// Day lookup by appointment id, then the day's write lock.
    async fn resolve_write(
        &self,
        id: AppointmentId,
    ) -> Result<tokio::sync::OwnedRwLockWriteGuard<DayBook>, EngineError> {
        let date = self.store.date_for(&id).ok_or(EngineError::NotFound(id))?;
        let day = self.store.day(&date).ok_or(EngineError::NotFound(id))?;
        Ok(day.write_owned().await)
    }
}
