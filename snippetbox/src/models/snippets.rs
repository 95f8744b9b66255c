use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::sqlite::SqlitePool;
use sqlx::FromRow;

use super::ModelError;
use crate::template::human_date;

/// A stored snippet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, FromRow)]
pub struct Snippet {
    /// Row id
    pub id: i64,
    /// Title, at most 100 characters
    pub title: String,
    /// Body text
    pub content: String,
    /// Creation time
    pub created: DateTime<Utc>,
    /// After this instant the snippet is no longer served
    pub expires: DateTime<Utc>,
}

impl Snippet {
    /// Creation time formatted for display
    #[must_use]
    pub fn created_display(&self) -> String {
        human_date(&self.created)
    }

    /// Expiry time formatted for display
    #[must_use]
    pub fn expires_display(&self) -> String {
        human_date(&self.expires)
    }
}

/// Snippet persistence
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnippetStore: Send + Sync {
    /// Store a snippet that expires `expires_days` from now and return its id
    async fn insert(&self, title: &str, content: &str, expires_days: i64)
        -> Result<i64, ModelError>;

    /// Fetch an unexpired snippet; [`ModelError::NoRecord`] otherwise
    async fn get(&self, id: i64) -> Result<Snippet, ModelError>;

    /// Up to `limit` unexpired snippets, newest first
    async fn latest(&self, limit: i64) -> Result<Vec<Snippet>, ModelError>;
}

/// `SQLite` implementation of [`SnippetStore`]
#[derive(Debug, Clone)]
pub struct SqliteSnippetStore {
    pool: SqlitePool,
}

impl SqliteSnippetStore {
    /// Wrap an open pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SnippetStore for SqliteSnippetStore {
    async fn insert(
        &self,
        title: &str,
        content: &str,
        expires_days: i64,
    ) -> Result<i64, ModelError> {
        let result = sqlx::query(
            r"
            INSERT INTO snippets (title, content, created, expires)
            VALUES (?, ?, datetime('now'), datetime('now', printf('%+d days', ?)))
            ",
        )
        .bind(title)
        .bind(content)
        .bind(expires_days)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn get(&self, id: i64) -> Result<Snippet, ModelError> {
        sqlx::query_as::<_, Snippet>(
            r"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > datetime('now') AND id = ?
            ",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(ModelError::NoRecord)
    }

    async fn latest(&self, limit: i64) -> Result<Vec<Snippet>, ModelError> {
        let snippets = sqlx::query_as::<_, Snippet>(
            r"
            SELECT id, title, content, created, expires
            FROM snippets
            WHERE expires > datetime('now')
            ORDER BY id DESC
            LIMIT ?
            ",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(snippets)
    }
}
