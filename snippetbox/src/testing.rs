//! Test helpers shared by unit tests

use std::sync::Arc;

use crate::config::SnippetboxConfig;
use crate::models::{MockSnippetStore, MockUserStore};
use crate::session::MemorySessionStore;
use crate::state::AppState;
use crate::template::TemplateCache;

/// State with default config, real templates and mocked stores
pub fn state_with(snippets: MockSnippetStore, users: MockUserStore) -> AppState {
    AppState {
        config: Arc::new(SnippetboxConfig::default()),
        templates: Arc::new(TemplateCache::new().expect("templates render")),
        snippets: Arc::new(snippets),
        users: Arc::new(users),
        sessions: Arc::new(MemorySessionStore::new()),
    }
}
