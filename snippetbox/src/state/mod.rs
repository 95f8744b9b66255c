//! Application state shared by every handler

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::SnippetboxConfig;
use crate::models::{SnippetStore, SqliteSnippetStore, SqliteUserStore, UserStore};
use crate::session::{MemorySessionStore, SessionStore};
use crate::template::{TemplateCache, TemplateError};

/// Handles to configuration, templates and the stores
///
/// Cheap to clone; every field is reference counted. Nothing in here is
/// mutated after startup except through the stores themselves.
#[derive(Clone)]
pub struct AppState {
    /// Loaded configuration
    pub config: Arc<SnippetboxConfig>,
    /// Page renderers
    pub templates: Arc<TemplateCache>,
    /// Snippet persistence
    pub snippets: Arc<dyn SnippetStore>,
    /// User persistence
    pub users: Arc<dyn UserStore>,
    /// Session persistence
    pub sessions: Arc<dyn SessionStore>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// State backed by `SQLite` stores on `pool` and an in-memory session store
    ///
    /// # Errors
    ///
    /// Fails if any page template cannot be rendered.
    pub fn new(config: SnippetboxConfig, pool: SqlitePool) -> Result<Self, TemplateError> {
        Ok(Self {
            config: Arc::new(config),
            templates: Arc::new(TemplateCache::new()?),
            snippets: Arc::new(SqliteSnippetStore::new(pool.clone())),
            users: Arc::new(SqliteUserStore::new(pool)),
            sessions: Arc::new(MemorySessionStore::new()),
        })
    }

    /// Configuration reference
    #[must_use]
    pub fn config(&self) -> &SnippetboxConfig {
        &self.config
    }
}
