//! Identity resolution and the authentication gate
//!
//! [`AuthenticateLayer`] runs on every dynamic route and stores the
//! request's [`AuthenticationState`] in the extensions. [`RequireAuthLayer`]
//! runs only on protected routes and redirects anyone not logged in.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::CACHE_CONTROL;
use axum::http::{HeaderValue, Request, Response};
use axum::response::{IntoResponse, Redirect};
use tower::{Layer, Service};

use super::{BoxFuture, Stage};
use crate::auth::{resolve, AuthenticationState};
use crate::error::AppError;
use crate::models::UserStore;
use crate::session::{Session, SessionError};

/// Layer resolving who the session belongs to
#[derive(Clone)]
pub struct AuthenticateLayer {
    users: Arc<dyn UserStore>,
}

impl std::fmt::Debug for AuthenticateLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticateLayer").finish_non_exhaustive()
    }
}

impl AuthenticateLayer {
    /// Create the layer over `users`
    #[must_use]
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }
}

impl Stage for AuthenticateLayer {
    fn name(&self) -> &'static str {
        "authenticate"
    }
}

impl<S> Layer<S> for AuthenticateLayer {
    type Service = AuthenticateMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        AuthenticateMiddleware {
            inner,
            users: Arc::clone(&self.users),
        }
    }
}

/// Service produced by [`AuthenticateLayer`]
#[derive(Clone)]
pub struct AuthenticateMiddleware<S> {
    inner: S,
    users: Arc<dyn UserStore>,
}

impl<S> Service<Request<Body>> for AuthenticateMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Clone + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let users = Arc::clone(&self.users);

        Box::pin(async move {
            let Some(session) = req.extensions().get::<Session>().cloned() else {
                return Ok(AppError::Session(SessionError::NotLoaded).into_response());
            };

            match resolve(&session, users.as_ref()).await {
                Ok(state) => {
                    req.extensions_mut().insert(state);
                    inner.call(req).await
                }
                Err(err) => Ok(AppError::from(err).into_response()),
            }
        })
    }
}

/// Layer turning unauthenticated requests away
#[derive(Debug, Clone)]
pub struct RequireAuthLayer {
    redirect_path: Arc<str>,
}

impl RequireAuthLayer {
    /// Redirect unauthenticated requests to `redirect_path`
    #[must_use]
    pub fn new(redirect_path: impl Into<Arc<str>>) -> Self {
        Self {
            redirect_path: redirect_path.into(),
        }
    }
}

impl Stage for RequireAuthLayer {
    fn name(&self) -> &'static str {
        "require_auth"
    }
}

impl<S> Layer<S> for RequireAuthLayer {
    type Service = RequireAuthMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequireAuthMiddleware {
            inner,
            redirect_path: Arc::clone(&self.redirect_path),
        }
    }
}

/// Service produced by [`RequireAuthLayer`]
#[derive(Debug, Clone)]
pub struct RequireAuthMiddleware<S> {
    inner: S,
    redirect_path: Arc<str>,
}

impl<S> Service<Request<Body>> for RequireAuthMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = Response<Body>;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let state = req
            .extensions()
            .get::<AuthenticationState>()
            .copied()
            .unwrap_or_default();

        if !state.is_authenticated() {
            tracing::debug!(path = %req.uri().path(), "unauthenticated request to protected route");
            let redirect = Redirect::to(&self.redirect_path).into_response();
            return Box::pin(async move { Ok(redirect) });
        }

        let future = self.inner.call(req);
        Box::pin(async move {
            let mut response = future.await?;
            response
                .headers_mut()
                .insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
            Ok(response)
        })
    }
}
