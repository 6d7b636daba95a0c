//! In-memory session store.
//!
//! Sessions live only as long as the process. The map itself sits behind a short-lived
//! `std::sync::Mutex`; each session has its own `tokio::sync::Mutex` so an ask can hold it across
//! the provider call without blocking unrelated sessions. Every public operation sweeps expired
//! entries first.

use pagerelay_core::{ConversationTurn, Error, PageContext, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

pub const DEFAULT_SESSION_TTL_S: u64 = 3_600;

pub fn now_epoch_s() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::from_secs(0))
        .as_secs()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub context: PageContext,
    pub history: Vec<ConversationTurn>,
    pub created_at: u64,
}

struct Entry {
    created_at: u64,
    session: Arc<AsyncMutex<Session>>,
}

pub struct SessionStore {
    ttl_s: u64,
    entries: Mutex<HashMap<String, Entry>>,
}

/// Exclusive access to one session, held across a whole ask.
pub struct SessionGuard {
    inner: OwnedMutexGuard<Session>,
}

impl SessionGuard {
    /// Record one completed exchange: the user turn, then the assistant turn.
    pub fn append_turns(&mut self, user: ConversationTurn, assistant: ConversationTurn) {
        self.inner.history.push(user);
        self.inner.history.push(assistant);
    }
}

impl std::ops::Deref for SessionGuard {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.inner
    }
}

impl SessionStore {
    pub fn new(ttl_s: u64) -> Self {
        Self {
            ttl_s,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn ttl_s(&self) -> u64 {
        self.ttl_s
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        // A panic while holding the map lock cannot leave it half-updated; keep serving.
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Drop every entry older than the ttl. Returns how many were removed.
    pub fn sweep_at(&self, now: u64) -> usize {
        let mut map = self.entries();
        let before = map.len();
        map.retain(|_, e| now.saturating_sub(e.created_at) <= self.ttl_s);
        let removed = before - map.len();
        if removed > 0 {
            tracing::debug!(removed, remaining = map.len(), "expired sessions swept");
        }
        removed
    }

    pub fn create(&self, context: PageContext) -> String {
        self.create_at(context, now_epoch_s())
    }

    pub fn create_at(&self, context: PageContext, now: u64) -> String {
        self.sweep_at(now);
        let id = uuid::Uuid::new_v4().to_string();
        let session = Session {
            id: id.clone(),
            context,
            history: Vec::new(),
            created_at: now,
        };
        self.entries().insert(
            id.clone(),
            Entry {
                created_at: now,
                session: Arc::new(AsyncMutex::new(session)),
            },
        );
        id
    }

    fn handle_at(&self, id: &str, now: u64) -> Result<Arc<AsyncMutex<Session>>> {
        self.sweep_at(now);
        self.entries()
            .get(id)
            .map(|e| e.session.clone())
            .ok_or(Error::SessionNotFound)
    }

    /// Snapshot of a session. Waits for any in-flight ask on it to finish.
    pub async fn get(&self, id: &str) -> Result<Session> {
        self.get_at(id, now_epoch_s()).await
    }

    pub async fn get_at(&self, id: &str, now: u64) -> Result<Session> {
        let handle = self.handle_at(id, now)?;
        let session = handle.lock().await;
        Ok(session.clone())
    }

    pub async fn lock(&self, id: &str) -> Result<SessionGuard> {
        self.lock_at(id, now_epoch_s()).await
    }

    pub async fn lock_at(&self, id: &str, now: u64) -> Result<SessionGuard> {
        let handle = self.handle_at(id, now)?;
        Ok(SessionGuard {
            inner: handle.lock_owned().await,
        })
    }

    pub async fn append_turns(
        &self,
        id: &str,
        user: ConversationTurn,
        assistant: ConversationTurn,
    ) -> Result<()> {
        let mut guard = self.lock(id).await?;
        guard.append_turns(user, assistant);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_S)
    }
}
