use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::SessionSettings;
use crate::session::model::{Session, SessionState};

/// Errors that can occur with session store operations
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session not found for user {0}")]
    NotFound(String),

    #[error("Failed to decode session: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode session: {0}")]
    Encode(#[source] serde_json::Error),

    #[error("Background cleanup requires a Tokio runtime")]
    NoRuntime,

    #[error("Cleanup interval must be greater than zero")]
    ZeroInterval,
}

struct CleanupTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Concurrent TTL store of per-user conversational state
///
/// The whole map sits behind one reader/writer lock. Every public method
/// takes the lock for its own body only and never calls back into the store
/// while holding it. Expiry slides forward on every write and on
/// [`get_or_create`](Self::get_or_create); plain reads leave it alone.
///
/// A session past its expiry behaves as absent even before the sweep
/// removes it.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    ttl: chrono::Duration,
    cleanup: Mutex<Option<CleanupTask>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        // Clamp absurd TTLs so `now + ttl` can never overflow
        let ttl = chrono::Duration::from_std(ttl)
            .ok()
            .filter(|ttl| *ttl <= chrono::Duration::weeks(52 * 100))
            .unwrap_or_else(|| chrono::Duration::weeks(52 * 100));

        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
            cleanup: Mutex::new(None),
        }
    }

    pub fn from_settings(settings: &SessionSettings) -> Self {
        Self::new(settings.ttl())
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Session>> {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, Session>> {
        self.sessions.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `f` to a live session under one write lock and refresh its expiry
    ///
    /// Returns `None` without touching anything if the user has no live
    /// session.
    pub(crate) fn mutate_live<T, F>(&self, user_id: &str, f: F) -> Option<T>
    where
        F: FnOnce(&mut Session) -> T,
    {
        let now = Utc::now();
        let mut sessions = self.write();
        match sessions.get_mut(user_id) {
            Some(session) if !session.is_expired_at(now) => {
                let out = f(session);
                session.touch(now, self.ttl);
                Some(out)
            }
            _ => None,
        }
    }

    /// Current session of a user, created fresh if absent or expired
    ///
    /// Refreshes the expiry and records the latest chat id. Returns a snapshot;
    /// later changes go through the store.
    pub fn get_or_create(&self, user_id: &str, chat_id: i64) -> Session {
        let now = Utc::now();
        let mut sessions = self.write();

        match sessions.get_mut(user_id) {
            Some(session) if !session.is_expired_at(now) => {
                session.touch(now, self.ttl);
                session.chat_id = chat_id;
                tracing::trace!("Session refreshed: {}", user_id);
                session.clone()
            }
            _ => {
                let session = Session::new(user_id, chat_id, now, self.ttl);
                sessions.insert(user_id.to_string(), session.clone());
                tracing::debug!("Session created: {}", user_id);
                session
            }
        }
    }

    /// Snapshot of a live session without refreshing it
    pub fn get(&self, user_id: &str) -> Option<Session> {
        let now = Utc::now();
        self.read()
            .get(user_id)
            .filter(|session| !session.is_expired_at(now))
            .cloned()
    }

    /// Set the state tag; `false` if the user has no live session
    pub fn set_state(&self, user_id: &str, state: SessionState) -> bool {
        let applied = self.mutate_live(user_id, |session| session.state = state).is_some();
        if !applied {
            tracing::debug!("set_state ignored, no session for {}", user_id);
        }
        applied
    }

    /// Store a scratch value; `false` if the user has no live session
    pub fn set_data(&self, user_id: &str, key: &str, value: Value) -> bool {
        let applied = self
            .mutate_live(user_id, |session| {
                session.data.insert(key.to_string(), value);
            })
            .is_some();
        if !applied {
            tracing::debug!("set_data({}) ignored, no session for {}", key, user_id);
        }
        applied
    }

    /// Read a scratch value; does not refresh the expiry
    pub fn get_data(&self, user_id: &str, key: &str) -> Option<Value> {
        let now = Utc::now();
        self.read()
            .get(user_id)
            .filter(|session| !session.is_expired_at(now))
            .and_then(|session| session.data.get(key).cloned())
    }

    /// Remove a scratch value; `false` if the user has no live session
    pub fn clear_data(&self, user_id: &str, key: &str) -> bool {
        self.mutate_live(user_id, |session| {
            session.data.remove(key);
        })
        .is_some()
    }

    /// Remove a user's session unconditionally; `true` if one existed
    pub fn clear(&self, user_id: &str) -> bool {
        let removed = self.write().remove(user_id).is_some();
        if removed {
            tracing::debug!("Session cleared: {}", user_id);
        }
        removed
    }

    /// Remove every expired session, returning how many were removed
    pub fn cleanup_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.write();
        let before = sessions.len();
        sessions.retain(|_, session| !session.is_expired_at(now));
        before - sessions.len()
    }

    /// Number of stored sessions, including expired ones not yet swept
    pub fn active_session_count(&self) -> usize {
        self.read().len()
    }

    /// Export one live session as an opaque byte snapshot
    pub fn serialize(&self, user_id: &str) -> Result<Vec<u8>, SessionError> {
        let session = self
            .get(user_id)
            .ok_or_else(|| SessionError::NotFound(user_id.to_string()))?;
        serde_json::to_vec(&session).map_err(SessionError::Encode)
    }

    /// Import a snapshot as `user_id`'s session, replacing any existing one
    ///
    /// Malformed input fails with [`SessionError::Decode`] and leaves the store
    /// untouched. The stored user id is always `user_id`.
    pub fn deserialize(&self, user_id: &str, bytes: &[u8]) -> Result<(), SessionError> {
        let mut session: Session = serde_json::from_slice(bytes).map_err(SessionError::Decode)?;
        session.user_id = user_id.to_string();

        self.write().insert(user_id.to_string(), session);
        tracing::debug!("Session imported: {}", user_id);
        Ok(())
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) every `interval` until stopped
    ///
    /// Returns `Ok(false)` if a sweep task is already running. The task holds
    /// only a weak reference, so dropping the last handle to the store also
    /// ends it.
    pub fn start_background_cleanup(self: &Arc<Self>, interval: Duration) -> Result<bool, SessionError> {
        if interval.is_zero() {
            return Err(SessionError::ZeroInterval);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| SessionError::NoRuntime)?;

        let mut slot = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.as_ref() {
            if !task.handle.is_finished() {
                return Ok(false);
            }
        }

        let cancel = CancellationToken::new();
        let handle = runtime.spawn(run_cleanup(Arc::downgrade(self), interval, cancel.clone()));
        *slot = Some(CleanupTask { cancel, handle });

        tracing::info!("Session cleanup started (interval: {:?}, ttl: {}s)", interval, self.ttl.num_seconds());
        Ok(true)
    }

    /// Signal the sweep task to stop; `false` if none was running
    pub fn stop(&self) -> bool {
        let task = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner).take();
        match task {
            Some(task) => {
                task.cancel.cancel();
                tracing::info!("Session cleanup stopped");
                true
            }
            None => false,
        }
    }

    /// Stop the sweep task and wait for it to finish
    pub async fn shutdown(&self) {
        let task = self.cleanup.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(task) = task {
            task.cancel.cancel();
            if let Err(e) = task.handle.await {
                tracing::warn!("Session cleanup task ended abnormally: {}", e);
            }
            tracing::info!("Session cleanup shut down");
        }
    }

    pub fn is_cleanup_running(&self) -> bool {
        self.cleanup
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(false, |task| !task.handle.is_finished())
    }
}

impl Drop for SessionStore {
    fn drop(&mut self) {
        let slot = self.cleanup.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(task) = slot.take() {
            task.cancel.cancel();
        }
    }
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore")
            .field("sessions", &self.active_session_count())
            .field("ttl", &self.ttl)
            .finish()
    }
}

async fn run_cleanup(store: Weak<SessionStore>, period: Duration, cancel: CancellationToken) {
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                let Some(store) = store.upgrade() else { break };
                let removed = store.cleanup_expired();
                if removed > 0 {
                    tracing::debug!("Swept {} expired sessions", removed);
                }
            }
        }
    }
}
