//! Server-side sessions
//!
//! A session is an opaque token plus a JSON key-value map with an absolute
//! deadline. [`SessionStore`] owns persisted sessions; [`Session`] is the
//! request-scoped handle that handlers mutate. The session middleware
//! decides what to persist from the handle's [`SessionStatus`] once the
//! response is ready.

mod store;

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;

pub use store::{MemorySessionStore, SessionStore};

/// Opaque session token
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random token
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Token as sent in the cookie
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SessionId {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s)
            .map(|_| Self(s.to_owned()))
            .map_err(|_| SessionError::InvalidSessionId)
    }
}

/// Persisted session payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionData {
    /// When the session was first written
    pub created_at: DateTime<Utc>,
    /// Absolute deadline after which the store treats the session as gone
    pub expires_at: DateTime<Utc>,
    /// Application values
    pub values: HashMap<String, serde_json::Value>,
}

impl SessionData {
    /// Empty session that lives for `lifetime`
    #[must_use]
    pub fn with_lifetime(lifetime: Duration) -> Self {
        let now = Utc::now();
        Self {
            created_at: now,
            expires_at: now + lifetime,
            values: HashMap::new(),
        }
    }

    /// Whether the deadline has passed
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// What the middleware must do with a session after the handler ran
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Nothing changed; no write and no cookie
    Unmodified,
    /// Values or token changed; persist and send the cookie
    Modified,
    /// Session was destroyed; delete it and expire the cookie
    Destroyed,
}

/// Session errors
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Token is not in the expected format
    #[error("invalid session id")]
    InvalidSessionId,

    /// A value could not be converted to or from JSON
    #[error("session value serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A handler asked for the session on a route without the session stage
    #[error("session middleware is not installed on this route")]
    NotLoaded,

    /// The backing store failed
    #[error("session store failure: {0}")]
    Backend(String),
}

#[derive(Debug)]
struct SessionState {
    id: Option<SessionId>,
    data: SessionData,
    status: SessionStatus,
    replaced: Vec<SessionId>,
}

/// Request-scoped session handle
///
/// Cloning shares the same underlying state, so the middleware sees every
/// change a handler makes.
#[derive(Debug, Clone)]
pub struct Session {
    state: Arc<Mutex<SessionState>>,
}

impl Session {
    /// Handle over a session loaded from the store
    #[must_use]
    pub fn loaded(id: SessionId, data: SessionData) -> Self {
        Self::from_state(Some(id), data)
    }

    /// Handle over a session that does not exist yet
    #[must_use]
    pub fn fresh(lifetime: Duration) -> Self {
        Self::from_state(None, SessionData::with_lifetime(lifetime))
    }

    fn from_state(id: Option<SessionId>, data: SessionData) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState {
                id,
                data,
                status: SessionStatus::Unmodified,
                replaced: Vec::new(),
            })),
        }
    }

    /// Read and deserialize a value
    #[must_use]
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let state = self.state.lock();
        state
            .data
            .values
            .get(key)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    /// Store a value under `key`
    pub fn put<T: Serialize>(&self, key: &str, value: T) -> Result<(), SessionError> {
        let value = serde_json::to_value(value)?;
        let mut state = self.state.lock();
        state.data.values.insert(key.to_owned(), value);
        state.status = SessionStatus::Modified;
        Ok(())
    }

    /// Whether `key` is present
    #[must_use]
    pub fn exists(&self, key: &str) -> bool {
        self.state.lock().data.values.contains_key(key)
    }

    /// Delete `key`, returning whether it was present
    pub fn remove(&self, key: &str) -> bool {
        let mut state = self.state.lock();
        let removed = state.data.values.remove(key).is_some();
        if removed {
            state.status = SessionStatus::Modified;
        }
        removed
    }

    /// Read a value and delete it in one step
    ///
    /// Used for flash messages, which are shown exactly once.
    pub fn pop<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let mut state = self.state.lock();
        let value = state.data.values.remove(key)?;
        state.status = SessionStatus::Modified;
        serde_json::from_value(value).ok()
    }

    /// Move the session to a new token and retire the old one
    ///
    /// Values are kept. Call on every privilege change to defeat fixation.
    pub fn renew_token(&self) {
        let mut state = self.state.lock();
        if let Some(old) = state.id.take() {
            state.replaced.push(old);
        }
        state.id = Some(SessionId::generate());
        state.status = SessionStatus::Modified;
    }

    /// Drop all values and schedule the session for deletion
    pub fn destroy(&self) {
        let mut state = self.state.lock();
        if let Some(old) = state.id.take() {
            state.replaced.push(old);
        }
        state.data.values.clear();
        state.status = SessionStatus::Destroyed;
    }

    /// Current token, if the session has one
    #[must_use]
    pub fn id(&self) -> Option<SessionId> {
        self.state.lock().id.clone()
    }

    /// Pending persistence action
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.lock().status
    }

    /// Snapshot everything the middleware needs to persist the session
    ///
    /// Assigns a token to a modified session that has none yet.
    pub(crate) fn commit(&self) -> Commit {
        let mut state = self.state.lock();
        if state.status == SessionStatus::Modified && state.id.is_none() {
            state.id = Some(SessionId::generate());
        }
        Commit {
            status: state.status,
            id: state.id.clone(),
            data: state.data.clone(),
            replaced: std::mem::take(&mut state.replaced),
        }
    }
}

/// Result of [`Session::commit`]
#[derive(Debug)]
pub(crate) struct Commit {
    pub status: SessionStatus,
    pub id: Option<SessionId>,
    pub data: SessionData,
    pub replaced: Vec<SessionId>,
}

impl<S: Send + Sync> FromRequestParts<S> for Session {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Self>()
            .cloned()
            .ok_or(AppError::Session(SessionError::NotLoaded))
    }
}
