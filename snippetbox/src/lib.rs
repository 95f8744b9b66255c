//! snippetbox: a session-authenticated snippet sharing server
//!
//! Requests pass through ordered middleware chains before reaching a
//! handler:
//!
//! - every request: panic recovery, request logging, security headers
//! - dynamic pages: session load and persist, forgery check, identity
//! - protected pages: all of the above plus the authentication gate
//!
//! Pages are rendered from an immutable [`template::TemplateCache`] into a
//! buffer and only then written out. Form input is checked by an
//! error-accumulating [`forms::Validator`].
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use snippetbox::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = SnippetboxConfig::load(None)?;
//!     let pool = snippetbox::models::connect(&config.database).await?;
//!     let state = AppState::new(config, pool)?;
//!
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:4000").await?;
//!     axum::serve(listener, snippetbox::routes::app(state)).await?;
//!     Ok(())
//! }
//! ```

#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod error;
pub mod extractors;
pub mod forms;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod observability;
pub mod routes;
pub mod session;
pub mod state;
pub mod template;

#[cfg(test)]
mod testing;

pub mod prelude {
    //! Convenience re-exports for common types

    pub use crate::auth::{AuthenticationState, AUTHENTICATED_USER_ID};
    pub use crate::config::SnippetboxConfig;
    pub use crate::error::{AppError, Envelope};
    pub use crate::extractors::DecodedForm;
    pub use crate::forms::{FormView, Validator};
    pub use crate::middleware::{Chain, Stage};
    pub use crate::models::{ModelError, Snippet, SnippetStore, UserStore};
    pub use crate::session::{MemorySessionStore, Session, SessionStore};
    pub use crate::state::AppState;
    pub use crate::template::{Payload, TemplateCache, TemplateData};

    pub use askama;
    pub use axum;
}
