//! Route table and middleware wiring
//!
//! | Chain     | Stages                                        |
//! |-----------|-----------------------------------------------|
//! | standard  | recovery, logging, security headers           |
//! | dynamic   | session, csrf, authenticate                   |
//! | protected | dynamic + require auth                        |
//!
//! The standard chain wraps everything, including static files and the
//! 404 fallback. Dynamic and protected chains only wrap their own routes.

use std::sync::Arc;

use axum::http::StatusCode;
use axum::response::Response;
use axum::routing::{get, post};
use axum::Router;
use tower::layer::util::{Identity, Stack};
use tower_http::services::ServeDir;

use crate::config::SnippetboxConfig;
use crate::error::client_error;
use crate::handlers;
use crate::middleware::{
    AuthenticateLayer, Chain, CsrfLayer, RecoveryLayer, RequestLogLayer, RequireAuthLayer,
    SecurityHeadersLayer, SessionLayer,
};
use crate::state::AppState;

type StandardChain =
    Chain<Stack<SecurityHeadersLayer, Stack<RequestLogLayer, Stack<RecoveryLayer, Identity>>>>;

type DynamicChain =
    Chain<Stack<AuthenticateLayer, Stack<CsrfLayer, Stack<SessionLayer, Identity>>>>;

/// Stages applied to every request
#[must_use]
pub fn standard_chain(config: &SnippetboxConfig) -> StandardChain {
    let security_headers = SecurityHeadersLayer::new(&config.security_headers);
    Chain::new()
        .then(RecoveryLayer::new().with_security_headers(security_headers.clone()))
        .then(RequestLogLayer::new())
        .then(security_headers)
}

/// Stages applied to routes that use the session
#[must_use]
pub fn dynamic_chain(state: &AppState) -> DynamicChain {
    let config = state.config();
    Chain::new()
        .then(SessionLayer::new(
            Arc::clone(&state.sessions),
            config.session.clone(),
        ))
        .then(CsrfLayer::new(config.csrf.max_form_bytes))
        .then(AuthenticateLayer::new(Arc::clone(&state.users)))
}

/// Build the application router
pub fn app(state: AppState) -> Router {
    let config = state.config();

    let dynamic = dynamic_chain(&state);
    let protected = dynamic
        .clone()
        .append(Chain::new().then(RequireAuthLayer::new(config.auth.redirect_path.as_str())));

    tracing::debug!(
        standard = ?standard_chain(config).stage_names(),
        protected = ?protected.stage_names(),
        "middleware chains"
    );

    let dynamic_routes = Router::new()
        .route("/", get(handlers::home))
        .route("/snippets/view/{id}", get(handlers::snippet_view))
        .route(
            "/users/signup",
            get(handlers::user_signup).post(handlers::user_signup_post),
        )
        .route(
            "/users/login",
            get(handlers::user_login).post(handlers::user_login_post),
        )
        .route_layer(dynamic);

    let protected_routes = Router::new()
        .route(
            "/snippets/create",
            get(handlers::snippet_create).post(handlers::snippet_create_post),
        )
        .route("/users/logout", post(handlers::user_logout_post))
        .route_layer(protected);

    Router::new()
        .merge(dynamic_routes)
        .merge(protected_routes)
        .nest_service("/static", ServeDir::new(&config.server.static_dir))
        .fallback(not_found)
        .layer(standard_chain(config))
        .with_state(state)
}

async fn not_found() -> Response {
    client_error(StatusCode::NOT_FOUND)
}
