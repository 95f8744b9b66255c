use async_trait::async_trait;
use sqlx::sqlite::SqlitePool;

use super::ModelError;
use crate::auth::password::{hash_password_blocking, verify_password_blocking};

/// User persistence and credential checks
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Register a user; [`ModelError::DuplicateEmail`] if the email is taken
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError>;

    /// Return the user id for valid credentials; [`ModelError::InvalidCredentials`] otherwise
    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError>;

    /// Whether a user with this id still exists
    async fn exists(&self, id: i64) -> Result<bool, ModelError>;
}

/// `SQLite` implementation of [`UserStore`]
#[derive(Debug, Clone)]
pub struct SqliteUserStore {
    pool: SqlitePool,
}

impl SqliteUserStore {
    /// Wrap an open pool
    #[must_use]
    pub const fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn insert(&self, name: &str, email: &str, password: &str) -> Result<(), ModelError> {
        let hashed = hash_password_blocking(password.to_owned()).await?;

        let result = sqlx::query(
            r"
            INSERT INTO users (name, email, hashed_password, created)
            VALUES (?, ?, ?, datetime('now'))
            ",
        )
        .bind(name)
        .bind(email)
        .bind(hashed)
        .execute(&self.pool)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
                Err(ModelError::DuplicateEmail)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<i64, ModelError> {
        let row: Option<(i64, String)> =
            sqlx::query_as("SELECT id, hashed_password FROM users WHERE email = ?")
                .bind(email)
                .fetch_optional(&self.pool)
                .await?;

        let Some((id, hashed)) = row else {
            return Err(ModelError::InvalidCredentials);
        };

        if verify_password_blocking(password.to_owned(), hashed).await? {
            Ok(id)
        } else {
            Err(ModelError::InvalidCredentials)
        }
    }

    async fn exists(&self, id: i64) -> Result<bool, ModelError> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE id = ?)")
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        Ok(exists)
    }
}
