//! Middleware stages and their composition
//!
//! Every stage is a `tower` layer that also implements [`Stage`] so it can
//! be put into a [`Chain`]. The application uses three chains:
//!
//! - standard: recovery, logging, security headers (every request)
//! - dynamic: session, forgery check, identity resolution
//! - protected: dynamic plus the authentication gate

mod auth;
mod chain;
mod csrf;
mod logging;
mod recovery;
mod security_headers;
mod session;

use std::future::Future;
use std::pin::Pin;

pub use auth::{AuthenticateLayer, AuthenticateMiddleware, RequireAuthLayer, RequireAuthMiddleware};
pub use chain::{Chain, Stage};
pub use csrf::{
    session_token, CsrfLayer, CsrfMiddleware, CSRF_FORM_FIELD, CSRF_HEADER_NAME, CSRF_SESSION_KEY,
};
pub use logging::{RequestLogLayer, RequestLogMiddleware};
pub use recovery::{RecoveryLayer, RecoveryMiddleware};
pub use security_headers::{
    FrameOptions, HstsConfig, ReferrerPolicy, SecurityHeadersConfig, SecurityHeadersLayer,
    SecurityHeadersMiddleware, XssProtection,
};
pub use session::{SessionLayer, SessionMiddleware};

/// Boxed future returned by the hand-written middleware services
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;
