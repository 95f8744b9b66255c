//! Security headers stage
//!
//! Adds the browser hardening headers to every response:
//! - Content-Security-Policy
//! - Referrer-Policy
//! - X-Content-Type-Options
//! - X-Frame-Options
//! - X-XSS-Protection
//! - Strict-Transport-Security (off by default)
//!
//! A header the handler already set is left alone.

use std::fmt;
use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::{header, HeaderMap, HeaderName, HeaderValue, Request, Response};
use serde::{Deserialize, Serialize};
use tower::{Layer, Service};

use super::{BoxFuture, Stage};

/// Which headers to send and with what values
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityHeadersConfig {
    /// Content-Security-Policy value
    pub csp: Option<String>,
    /// Referrer-Policy value
    pub referrer_policy: Option<ReferrerPolicy>,
    /// Send `X-Content-Type-Options: nosniff`
    pub content_type_options: bool,
    /// X-Frame-Options value
    pub frame_options: Option<FrameOptions>,
    /// X-XSS-Protection value
    pub xss_protection: Option<XssProtection>,
    /// Strict-Transport-Security value
    pub hsts: Option<HstsConfig>,
}

impl Default for SecurityHeadersConfig {
    fn default() -> Self {
        Self {
            csp: Some(
                "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com"
                    .to_string(),
            ),
            referrer_policy: Some(ReferrerPolicy::OriginWhenCrossOrigin),
            content_type_options: true,
            frame_options: Some(FrameOptions::Deny),
            xss_protection: Some(XssProtection::Disabled),
            hsts: None,
        }
    }
}

impl SecurityHeadersConfig {
    /// Every header disabled
    #[must_use]
    pub const fn none() -> Self {
        Self {
            csp: None,
            referrer_policy: None,
            content_type_options: false,
            frame_options: None,
            xss_protection: None,
            hsts: None,
        }
    }

    /// Enable Strict-Transport-Security
    #[must_use]
    pub const fn with_hsts(mut self, hsts: HstsConfig) -> Self {
        self.hsts = Some(hsts);
        self
    }

    fn headers(&self) -> Vec<(HeaderName, String)> {
        let mut out = Vec::with_capacity(6);
        if let Some(csp) = &self.csp {
            out.push((header::CONTENT_SECURITY_POLICY, csp.clone()));
        }
        if let Some(policy) = self.referrer_policy {
            out.push((header::REFERRER_POLICY, policy.to_string()));
        }
        if self.content_type_options {
            out.push((header::X_CONTENT_TYPE_OPTIONS, "nosniff".to_string()));
        }
        if let Some(frame) = self.frame_options {
            out.push((header::X_FRAME_OPTIONS, frame.to_string()));
        }
        if let Some(xss) = self.xss_protection {
            out.push((header::X_XSS_PROTECTION, xss.to_string()));
        }
        if let Some(hsts) = self.hsts {
            out.push((header::STRICT_TRANSPORT_SECURITY, hsts.to_string()));
        }
        out
    }
}

/// X-Frame-Options values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameOptions {
    /// Never render inside a frame
    Deny,
    /// Only same-origin pages may frame this one
    SameOrigin,
}

impl fmt::Display for FrameOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deny => f.write_str("deny"),
            Self::SameOrigin => f.write_str("sameorigin"),
        }
    }
}

/// X-XSS-Protection values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum XssProtection {
    /// `0`: turn the legacy auditor off and rely on CSP
    Disabled,
    /// `1; mode=block`
    Block,
}

impl fmt::Display for XssProtection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disabled => f.write_str("0"),
            Self::Block => f.write_str("1; mode=block"),
        }
    }
}

/// HSTS parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HstsConfig {
    /// Max age in seconds
    pub max_age: u32,
    /// Apply to subdomains
    pub include_subdomains: bool,
}

impl fmt::Display for HstsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "max-age={}", self.max_age)?;
        if self.include_subdomains {
            f.write_str("; includeSubDomains")?;
        }
        Ok(())
    }
}

/// Referrer-Policy values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferrerPolicy {
    /// Never send a referrer
    NoReferrer,
    /// Origin only
    Origin,
    /// Full URL same-origin, origin cross-origin
    OriginWhenCrossOrigin,
    /// Same origin only
    SameOrigin,
    /// Like origin-when-cross-origin, but nothing on downgrade
    StrictOriginWhenCrossOrigin,
}

impl fmt::Display for ReferrerPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::NoReferrer => "no-referrer",
            Self::Origin => "origin",
            Self::OriginWhenCrossOrigin => "origin-when-cross-origin",
            Self::SameOrigin => "same-origin",
            Self::StrictOriginWhenCrossOrigin => "strict-origin-when-cross-origin",
        })
    }
}

/// Layer adding security headers to every response
#[derive(Debug, Clone)]
pub struct SecurityHeadersLayer {
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl SecurityHeadersLayer {
    /// Build the header set once; values that are not valid header text are skipped
    #[must_use]
    pub fn new(config: &SecurityHeadersConfig) -> Self {
        let headers = config
            .headers()
            .into_iter()
            .filter_map(|(name, value)| match HeaderValue::from_str(&value) {
                Ok(value) => Some((name, value)),
                Err(_) => {
                    tracing::warn!(header = %name, "skipping invalid security header value");
                    None
                }
            })
            .collect();
        Self { headers }
    }
}

impl SecurityHeadersLayer {
    /// Add every configured header that `headers` does not already carry
    pub fn apply(&self, headers: &mut HeaderMap) {
        fill(&self.headers, headers);
    }
}

fn fill(set: &[(HeaderName, HeaderValue)], map: &mut HeaderMap) {
    for (name, value) in set {
        map.entry(name.clone()).or_insert_with(|| value.clone());
    }
}

impl Stage for SecurityHeadersLayer {
    fn name(&self) -> &'static str {
        "security_headers"
    }
}

impl<S> Layer<S> for SecurityHeadersLayer {
    type Service = SecurityHeadersMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SecurityHeadersMiddleware {
            inner,
            headers: Arc::clone(&self.headers),
        }
    }
}

/// Service produced by [`SecurityHeadersLayer`]
#[derive(Debug, Clone)]
pub struct SecurityHeadersMiddleware<S> {
    inner: S,
    headers: Arc<[(HeaderName, HeaderValue)]>,
}

impl<S> Service<Request<Body>> for SecurityHeadersMiddleware<S>
where
    S: Service<Request<Body>, Response = Response<Body>> + Send + 'static,
    S::Future: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: Request<Body>) -> Self::Future {
        let headers = Arc::clone(&self.headers);
        let future = self.inner.call(request);

        Box::pin(async move {
            let mut response = future.await?;
            fill(&headers, response.headers_mut());
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{response::IntoResponse, routing::get, Router};
    use tower::ServiceExt;

    fn app(config: &SecurityHeadersConfig) -> Router {
        Router::new()
            .route("/", get(|| async { "ok" }))
            .route(
                "/framed",
                get(|| async { ([(header::X_FRAME_OPTIONS, "sameorigin")], "ok").into_response() }),
            )
            .layer(SecurityHeadersLayer::new(config))
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn test_default_headers_present() {
        let response = app(&SecurityHeadersConfig::default())
            .oneshot(get_req("/"))
            .await
            .unwrap();
        let h = response.headers();

        assert_eq!(
            h.get(header::CONTENT_SECURITY_POLICY).unwrap(),
            "default-src 'self'; style-src 'self' fonts.googleapis.com; font-src fonts.gstatic.com"
        );
        assert_eq!(h.get(header::REFERRER_POLICY).unwrap(), "origin-when-cross-origin");
        assert_eq!(h.get(header::X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(h.get(header::X_FRAME_OPTIONS).unwrap(), "deny");
        assert_eq!(h.get(header::X_XSS_PROTECTION).unwrap(), "0");
        assert!(h.get(header::STRICT_TRANSPORT_SECURITY).is_none());
    }

    #[tokio::test]
    async fn test_handler_value_wins() {
        let response = app(&SecurityHeadersConfig::default())
            .oneshot(get_req("/framed"))
            .await
            .unwrap();
        assert_eq!(
            response.headers().get(header::X_FRAME_OPTIONS).unwrap(),
            "sameorigin"
        );
    }

    #[tokio::test]
    async fn test_disabled_config_adds_nothing() {
        let response = app(&SecurityHeadersConfig::none())
            .oneshot(get_req("/"))
            .await
            .unwrap();
        assert!(response.headers().get(header::X_FRAME_OPTIONS).is_none());
        assert!(response.headers().get(header::CONTENT_SECURITY_POLICY).is_none());
    }

    #[test]
    fn test_hsts_display() {
        let hsts = HstsConfig {
            max_age: 31_536_000,
            include_subdomains: true,
        };
        assert_eq!(hsts.to_string(), "max-age=31536000; includeSubDomains");
        let config = SecurityHeadersConfig::none().with_hsts(hsts);
        assert_eq!(config.headers().len(), 1);
    }
}
