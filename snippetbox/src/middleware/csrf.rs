//! Forgery check stage
//!
//! Every state-changing request must echo the session's forgery token,
//! either in the `x-csrf-token` header or in the `_csrf_token` form field.
//! Must run inside the session stage.

use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, Method, Request, Response, StatusCode};
use axum::response::IntoResponse;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use rand::RngCore;
use tower::{Layer, Service};

use super::{BoxFuture, Stage};
use crate::error::{client_error, AppError};
use crate::session::{Session, SessionError};

/// Header carrying the token for scripted requests
pub const CSRF_HEADER_NAME: &str = "x-csrf-token";

/// Hidden form field carrying the token
pub const CSRF_FORM_FIELD: &str = "_csrf_token";

/// Session key under which the token is kept
pub const CSRF_SESSION_KEY: &str = "csrf_token";

/// The session's forgery token, created on first use
///
/// # Errors
///
/// Fails only if the token cannot be written to the session.
pub fn session_token(session: &Session) -> Result<String, SessionError> {
    if let Some(token) = session.get::<String>(CSRF_SESSION_KEY) {
        return Ok(token);
    }
    let mut bytes = [0_u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    let token = URL_SAFE_NO_PAD.encode(bytes);
    session.put(CSRF_SESSION_KEY, &token)?;
    Ok(token)
}

/// Layer rejecting unsafe requests without a matching token
#[derive(Debug, Clone, Copy)]
pub struct CsrfLayer {
    max_form_bytes: usize,
}

impl CsrfLayer {
    /// Create the layer; form bodies above `max_form_bytes` are rejected
    #[must_use]
    pub const fn new(max_form_bytes: usize) -> Self {
        Self { max_form_bytes }
    }
}

impl Stage for CsrfLayer {
    fn name(&self) -> &'static str {
        "csrf"
    }
}

impl<S> Layer<S> for CsrfLayer {
    type Service = CsrfMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CsrfMiddleware {
            inner,
            max_form_bytes: self.max_form_bytes,
        }
    }
}

/// Service produced by [`CsrfLayer`]
#[derive(Debug, Clone)]
pub struct CsrfMiddleware<S> {
    inner: S,
    max_form_bytes: usize,
}

impl<S> Service<Request<Body>> for CsrfMiddleware<S>
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

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        if is_method_safe(req.method()) {
            return Box::pin(inner.call(req));
        }

        let Some(session) = req.extensions().get::<Session>().cloned() else {
            return Box::pin(async {
                Ok(AppError::Session(SessionError::NotLoaded).into_response())
            });
        };
        let limit = self.max_form_bytes;

        Box::pin(async move {
            let method = req.method().clone();
            let path = req.uri().path().to_owned();

            let (submitted, req) = match submitted_token(req, limit).await {
                Ok(pair) => pair,
                Err(status) => {
                    tracing::warn!(%method, %path, "could not read form body for forgery check");
                    return Ok(client_error(status));
                }
            };

            let expected = session.get::<String>(CSRF_SESSION_KEY);
            let valid = matches!(
                (&expected, &submitted),
                (Some(expected), Some(submitted)) if constant_time_eq(expected.as_bytes(), submitted.as_bytes())
            );

            if !valid {
                tracing::warn!(
                    %method,
                    %path,
                    token_present = submitted.is_some(),
                    "forgery check failed"
                );
                return Ok(client_error(StatusCode::BAD_REQUEST));
            }

            inner.call(req).await
        })
    }
}

const fn is_method_safe(method: &Method) -> bool {
    matches!(
        *method,
        Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
    )
}

/// Pull the token from the header or, for urlencoded forms, from the body
///
/// The body is buffered and put back so the handler can still decode it.
async fn submitted_token(
    req: Request<Body>,
    limit: usize,
) -> Result<(Option<String>, Request<Body>), StatusCode> {
    if let Some(token) = req
        .headers()
        .get(CSRF_HEADER_NAME)
        .and_then(|v| v.to_str().ok())
    {
        return Ok((Some(token.to_owned()), req));
    }

    let is_form = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));
    if !is_form {
        return Ok((None, req));
    }

    let (parts, body) = req.into_parts();
    let bytes = axum::body::to_bytes(body, limit)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;
    let token = url::form_urlencoded::parse(&bytes)
        .find(|(name, _)| name == CSRF_FORM_FIELD)
        .map(|(_, value)| value.into_owned());

    Ok((token, Request::from_parts(parts, Body::from(bytes))))
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0_u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
