//! Persistence for snippets and users
//!
//! Handlers only see the [`SnippetStore`] and [`UserStore`] traits. The
//! `SQLite` implementations live next to them and share one pool opened by
//! [`connect`].

mod snippets;
mod users;

use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use thiserror::Error;

use crate::auth::password::PasswordError;
use crate::config::DatabaseConfig;

pub use snippets::{Snippet, SnippetStore, SqliteSnippetStore};
pub use users::{SqliteUserStore, UserStore};

#[cfg(test)]
pub use snippets::MockSnippetStore;
#[cfg(test)]
pub use users::MockUserStore;

/// Store errors
#[derive(Debug, Error)]
pub enum ModelError {
    /// No matching record, or the record has expired
    #[error("no matching record found")]
    NoRecord,

    /// Signup with an email that is already registered
    #[error("duplicate email")]
    DuplicateEmail,

    /// Unknown email or wrong password
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Password hashing failed
    #[error(transparent)]
    Password(#[from] PasswordError),

    /// Database failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

const SCHEMA: [&str; 3] = [
    r"
    CREATE TABLE IF NOT EXISTS snippets (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        content TEXT NOT NULL,
        created DATETIME NOT NULL,
        expires DATETIME NOT NULL
    )
    ",
    r"CREATE INDEX IF NOT EXISTS idx_snippets_created ON snippets(created)",
    r"
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        email TEXT NOT NULL UNIQUE,
        hashed_password TEXT NOT NULL,
        created DATETIME NOT NULL
    )
    ",
];

/// Open the pool and make sure the tables exist
///
/// # Errors
///
/// Returns the underlying `sqlx` error if the database cannot be opened or
/// the schema cannot be created.
pub async fn connect(config: &DatabaseConfig) -> Result<SqlitePool, sqlx::Error> {
    let pool = SqlitePoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
        .idle_timeout(None)
        .max_lifetime(None)
        .connect(&config.url)
        .await?;

    migrate(&pool).await?;
    tracing::debug!(url = %config.url, "database ready");
    Ok(pool)
}

async fn migrate(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    for statement in SCHEMA {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
