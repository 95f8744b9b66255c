//! Session persistence

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};

use super::{SessionData, SessionError, SessionId};

/// Backend that owns persisted sessions
///
/// Implementations must treat an expired session as absent on `load`.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live session
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError>;

    /// Insert or overwrite a session; concurrent saves are last-write-wins
    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError>;

    /// Delete a session; deleting an unknown token is not an error
    async fn remove(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Evict every session whose deadline has passed, returning how many
    async fn cleanup_expired(&self) -> Result<usize, SessionError>;
}

/// In-process session store
///
/// Sessions live in a map behind a `RwLock`. Deadlines are also pushed onto
/// a min-heap so cleanup only touches sessions that are due.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<SessionId, SessionData>>,
    expiry_queue: Mutex<BinaryHeap<Reverse<(DateTime<Utc>, SessionId)>>>,
}

impl MemorySessionStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored sessions, expired or not
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Whether the store holds no sessions
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    #[cfg(test)]
    fn queued(&self) -> usize {
        self.expiry_queue.lock().len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionData>, SessionError> {
        Ok(self
            .sessions
            .read()
            .get(id)
            .filter(|data| !data.is_expired())
            .cloned())
    }

    async fn save(&self, id: &SessionId, data: &SessionData) -> Result<(), SessionError> {
        let previous = self.sessions.write().insert(id.clone(), data.clone());

        // Only a new session or a moved deadline needs a queue entry.
        if previous.map_or(true, |old| old.expires_at != data.expires_at) {
            self.expiry_queue
                .lock()
                .push(Reverse((data.expires_at, id.clone())));
        }
        Ok(())
    }

    async fn remove(&self, id: &SessionId) -> Result<(), SessionError> {
        if self.sessions.write().remove(id).is_some() {
            self.expiry_queue
                .lock()
                .retain(|Reverse((_, queued))| queued != id);
        }
        Ok(())
    }

    async fn cleanup_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let mut due = Vec::new();
        {
            let mut queue = self.expiry_queue.lock();
            while queue
                .peek()
                .is_some_and(|Reverse((deadline, _))| *deadline <= now)
            {
                if let Some(Reverse((_, id))) = queue.pop() {
                    due.push(id);
                }
            }
        }

        // A heap entry may be stale if the session was saved again with a
        // later deadline, so recheck against the stored data.
        let mut sessions = self.sessions.write();
        let mut removed = 0;
        for id in due {
            if sessions.get(&id).is_some_and(SessionData::is_expired) {
                sessions.remove(&id);
                removed += 1;
            }
        }
        Ok(removed)
    }
}
