//! Panic recovery stage
//!
//! Converts a panic anywhere below this stage into a single generic 500.
//! The connection is marked for closing since the handler may have left
//! shared state half-updated. The panic itself is logged here; the process
//! panic hook (see [`crate::observability::install_panic_hook`]) records
//! where it happened and the backtrace.
//!
//! A panic unwinds past any stage that decorates responses on the way out,
//! so the recovery response gets the security headers applied here.

use std::panic::AssertUnwindSafe;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderValue, Request, Response};
use futures_util::FutureExt;
use tower::{Layer, Service};

use super::{BoxFuture, SecurityHeadersLayer, Stage};
use crate::error::server_error;
use crate::observability::panic_message;

/// Layer that catches panics from inner stages and handlers
#[derive(Debug, Clone, Default)]
pub struct RecoveryLayer {
    security_headers: Option<SecurityHeadersLayer>,
}

impl RecoveryLayer {
    /// Create the layer
    #[must_use]
    pub const fn new() -> Self {
        Self {
            security_headers: None,
        }
    }

    /// Stamp `headers` onto the 500 sent after a panic
    #[must_use]
    pub fn with_security_headers(mut self, headers: SecurityHeadersLayer) -> Self {
        self.security_headers = Some(headers);
        self
    }
}

impl Stage for RecoveryLayer {
    fn name(&self) -> &'static str {
        "recovery"
    }
}

impl<S> Layer<S> for RecoveryLayer {
    type Service = RecoveryMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RecoveryMiddleware {
            inner,
            security_headers: self.security_headers.clone(),
        }
    }
}

/// Service produced by [`RecoveryLayer`]
#[derive(Debug, Clone)]
pub struct RecoveryMiddleware<S> {
    inner: S,
    security_headers: Option<SecurityHeadersLayer>,
}

impl<S> Service<Request<Body>> for RecoveryMiddleware<S>
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

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        // Keep the service that was driven to readiness.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);
        let method = request.method().clone();
        let uri = request.uri().clone();
        let security_headers = self.security_headers.clone();

        Box::pin(async move {
            let outcome = AssertUnwindSafe(async move { inner.call(request).await })
                .catch_unwind()
                .await;

            match outcome {
                Ok(result) => result,
                Err(payload) => {
                    tracing::error!(
                        panic = %panic_message(payload.as_ref()),
                        %method,
                        %uri,
                        "request handler panicked"
                    );
                    let mut response = panic_response();
                    if let Some(security_headers) = &security_headers {
                        security_headers.apply(response.headers_mut());
                    }
                    Ok(response)
                }
            }
        })
    }
}

fn panic_response() -> Response<Body> {
    let mut response = server_error();
    response
        .headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    response
}
