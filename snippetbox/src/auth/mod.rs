//! Session-backed authentication
//!
//! A request is authenticated when its session holds
//! [`AUTHENTICATED_USER_ID`] and that user still exists. A key that points
//! at a deleted user is treated as "not logged in" rather than as an error.
//!
//! Logging in or out always renews the session token first, so a token
//! captured before a privilege change is useless afterwards.

pub mod password;

use std::convert::Infallible;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::models::{ModelError, UserStore};
use crate::session::{Session, SessionError};

/// Session key holding the logged-in user's id
pub const AUTHENTICATED_USER_ID: &str = "authenticatedUserID";

/// Who is making the request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum AuthenticationState {
    /// No valid login
    #[default]
    Unauthenticated,
    /// Logged in as this user id
    Authenticated(i64),
}

impl AuthenticationState {
    /// Whether a user is logged in
    #[must_use]
    pub const fn is_authenticated(self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The logged-in user id, if any
    #[must_use]
    pub const fn user_id(self) -> Option<i64> {
        match self {
            Self::Authenticated(id) => Some(id),
            Self::Unauthenticated => None,
        }
    }
}

/// Reads the state resolved by the identity stage; absent means unauthenticated
impl<S: Send + Sync> FromRequestParts<S> for AuthenticationState {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<Self>()
            .copied()
            .unwrap_or_default())
    }
}

/// Work out who the session belongs to
///
/// Does not modify the session.
///
/// # Errors
///
/// Propagates user store failures.
pub async fn resolve(
    session: &Session,
    users: &dyn UserStore,
) -> Result<AuthenticationState, ModelError> {
    let Some(id) = session.get::<i64>(AUTHENTICATED_USER_ID) else {
        return Ok(AuthenticationState::Unauthenticated);
    };

    if users.exists(id).await? {
        Ok(AuthenticationState::Authenticated(id))
    } else {
        tracing::debug!(user_id = id, "session refers to a user that no longer exists");
        Ok(AuthenticationState::Unauthenticated)
    }
}

/// Record a successful login
///
/// # Errors
///
/// Fails if the id cannot be stored in the session.
pub fn log_in(session: &Session, user_id: i64) -> Result<(), SessionError> {
    session.renew_token();
    session.put(AUTHENTICATED_USER_ID, user_id)
}

/// Forget the logged-in user; other session values are kept
pub fn log_out(session: &Session) {
    session.renew_token();
    session.remove(AUTHENTICATED_USER_ID);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MockUserStore;
    use crate::session::SessionStatus;
    use chrono::Duration;

    fn session() -> Session {
        Session::fresh(Duration::hours(1))
    }

    #[tokio::test]
    async fn test_no_key_is_unauthenticated_without_store_lookup() {
        let mut users = MockUserStore::new();
        users.expect_exists().never();

        let state = resolve(&session(), &users).await.unwrap();
        assert_eq!(state, AuthenticationState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_existing_user_is_authenticated() {
        let mut users = MockUserStore::new();
        users
            .expect_exists()
            .withf(|id| *id == 7)
            .times(1)
            .returning(|_| Ok(true));

        let session = session();
        session.put(AUTHENTICATED_USER_ID, 7_i64).unwrap();

        let state = resolve(&session, &users).await.unwrap();
        assert_eq!(state, AuthenticationState::Authenticated(7));
        assert_eq!(state.user_id(), Some(7));
    }

    #[tokio::test]
    async fn test_stale_user_is_unauthenticated_and_session_untouched() {
        let mut users = MockUserStore::new();
        users.expect_exists().returning(|_| Ok(false));

        let id = crate::session::SessionId::generate();
        let mut data = crate::session::SessionData::with_lifetime(Duration::hours(1));
        data.values
            .insert(AUTHENTICATED_USER_ID.into(), serde_json::json!(99));
        let session = Session::loaded(id, data);

        let state = resolve(&session, &users).await.unwrap();
        assert_eq!(state, AuthenticationState::Unauthenticated);
        assert_eq!(session.status(), SessionStatus::Unmodified);
        assert!(session.exists(AUTHENTICATED_USER_ID));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let mut users = MockUserStore::new();
        users
            .expect_exists()
            .returning(|_| Err(ModelError::Database(sqlx::Error::PoolTimedOut)));

        let session = session();
        session.put(AUTHENTICATED_USER_ID, 1_i64).unwrap();
        assert!(matches!(
            resolve(&session, &users).await,
            Err(ModelError::Database(_))
        ));
    }

    #[test]
    fn test_log_in_renews_token_and_sets_key() {
        let old = crate::session::SessionId::generate();
        let session = Session::loaded(
            old.clone(),
            crate::session::SessionData::with_lifetime(Duration::hours(1)),
        );

        log_in(&session, 3).unwrap();
        assert_ne!(session.id(), Some(old));
        assert_eq!(session.get::<i64>(AUTHENTICATED_USER_ID), Some(3));
    }

    #[test]
    fn test_log_out_renews_token_and_clears_key() {
        let session = session();
        log_in(&session, 3).unwrap();
        let logged_in_id = session.id();
        session.put("flash", "bye").unwrap();

        log_out(&session);
        assert_ne!(session.id(), logged_in_id);
        assert!(!session.exists(AUTHENTICATED_USER_ID));
        assert!(session.exists("flash"));
    }
}
