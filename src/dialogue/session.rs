use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::model::UserId;

use super::DialogueError;
use super::machine::{Draft, State};

/// One user's open dialogue.
#[derive(Debug)]
pub struct Session {
    pub state: State,
    pub draft: Draft,
    touched: Instant,
}

impl Session {
    fn new() -> Self {
        Self {
            state: State::Idle,
            draft: Draft::default(),
            touched: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.touched = Instant::now();
    }

    pub fn idle_since(&self) -> Instant {
        self.touched
    }
}

/// Turns for one user serialize on this mutex.
pub type SharedSession = Arc<Mutex<Session>>;

pub struct SessionRegistry {
    sessions: DashMap<UserId, SharedSession>,
    ttl: Duration,
    max_sessions: usize,
}

impl SessionRegistry {
    pub fn new(ttl: Duration, max_sessions: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
            max_sessions,
        }
    }

    pub fn get(&self, user_id: UserId) -> Option<SharedSession> {
        self.sessions.get(&user_id).map(|s| s.clone())
    }

    /// Existing session, or a fresh `Idle` one if under the cap.
    pub fn get_or_create(&self, user_id: UserId) -> Result<SharedSession, DialogueError> {
        if let Some(session) = self.get(user_id) {
            return Ok(session);
        }
        if self.sessions.len() >= self.max_sessions {
            return Err(DialogueError::TooManySessions);
        }
        let session = self
            .sessions
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Session::new())))
            .clone();
        metrics::gauge!(crate::observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        Ok(session)
    }

    /// Lock the user's session for one turn. `None` if there is none.
    pub async fn lock(&self, user_id: UserId) -> Option<OwnedMutexGuard<Session>> {
        loop {
            let session = self.get(user_id)?;
            if let Some(guard) = self.lock_registered(user_id, session).await {
                return Some(guard);
            }
        }
    }

    /// Lock the user's session for one turn, opening one if needed.
    pub async fn lock_or_create(
        &self,
        user_id: UserId,
    ) -> Result<OwnedMutexGuard<Session>, DialogueError> {
        loop {
            let session = self.get_or_create(user_id)?;
            if let Some(guard) = self.lock_registered(user_id, session).await {
                return Ok(guard);
            }
        }
    }

    /// Lock `session`, touch it, and check it is still the one registered
    /// for `user_id`. An eviction that ran between lookup and lock is undone
    /// by putting the session back. `None` if another session took its place.
    async fn lock_registered(
        &self,
        user_id: UserId,
        session: SharedSession,
    ) -> Option<OwnedMutexGuard<Session>> {
        let mut guard = session.clone().lock_owned().await;
        guard.touch();
        let current = self
            .sessions
            .entry(user_id)
            .or_insert_with(|| session.clone())
            .clone();
        Arc::ptr_eq(&current, &session).then_some(guard)
    }

    /// Drop finished sessions, and open ones idle for longer than the TTL
    /// as of `now`. A session whose turn is in progress is never evicted.
    pub fn evict_idle(&self, now: Instant) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, session| match session.try_lock() {
            Ok(s) => {
                s.state.is_open() && now.saturating_duration_since(s.idle_since()) <= self.ttl
            }
            Err(_) => true,
        });
        let evicted = before.saturating_sub(self.sessions.len());
        metrics::gauge!(crate::observability::SESSIONS_ACTIVE).set(self.sessions.len() as f64);
        evicted
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }
}
