//! Session load/save stage
//!
//! Loads the session named by the request's cookie (or the fallback header)
//! and puts a [`Session`] handle into the request extensions. Once the inner
//! service has produced a response the handle is inspected:
//!
//! - retired tokens (from [`Session::renew_token`]) are deleted
//! - a modified session is saved and its cookie sent
//! - a destroyed session is deleted and its cookie expired
//!
//! An unknown or expired token is not an error; the request simply gets a
//! fresh, empty session.

use std::sync::Arc;
use std::task::{Context, Poll};

use axum::body::Body;
use axum::http::header::{CACHE_CONTROL, COOKIE, SET_COOKIE, VARY};
use axum::http::{HeaderValue, Request, Response};
use axum::response::IntoResponse;
use chrono::Utc;
use tower::{Layer, Service};

use super::{BoxFuture, Stage};
use crate::config::SessionConfig;
use crate::error::AppError;
use crate::session::{Session, SessionError, SessionId, SessionStatus, SessionStore};

/// Layer that loads and persists sessions
#[derive(Clone)]
pub struct SessionLayer {
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl std::fmt::Debug for SessionLayer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionLayer")
            .field("config", &self.config)
            .field("store", &"dyn SessionStore")
            .finish()
    }
}

impl SessionLayer {
    /// Create a layer over `store`
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, config: SessionConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

impl Stage for SessionLayer {
    fn name(&self) -> &'static str {
        "session"
    }
}

impl<S> Layer<S> for SessionLayer {
    type Service = SessionMiddleware<S>;

    fn layer(&self, inner: S) -> Self::Service {
        SessionMiddleware {
            inner,
            store: Arc::clone(&self.store),
            config: Arc::clone(&self.config),
        }
    }
}

/// Service produced by [`SessionLayer`]
#[derive(Clone)]
pub struct SessionMiddleware<S> {
    inner: S,
    store: Arc<dyn SessionStore>,
    config: Arc<SessionConfig>,
}

impl<S: std::fmt::Debug> std::fmt::Debug for SessionMiddleware<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionMiddleware")
            .field("inner", &self.inner)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<S> Service<Request<Body>> for SessionMiddleware<S>
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
        let store = Arc::clone(&self.store);
        let config = Arc::clone(&self.config);
        let token = extract_token(&req, &config);

        Box::pin(async move {
            let session = match load(token, store.as_ref(), &config).await {
                Ok(session) => session,
                Err(err) => return Ok(AppError::from(err).into_response()),
            };
            req.extensions_mut().insert(session.clone());

            let mut response = inner.call(req).await?;

            match persist(&session, store.as_ref(), &config, &mut response).await {
                Ok(()) => Ok(response),
                Err(err) => Ok(AppError::from(err).into_response()),
            }
        })
    }
}

async fn load(
    token: Option<SessionId>,
    store: &dyn SessionStore,
    config: &SessionConfig,
) -> Result<Session, SessionError> {
    let Some(id) = token else {
        return Ok(Session::fresh(config.lifetime()));
    };

    Ok(match store.load(&id).await? {
        Some(data) => Session::loaded(id, data),
        None => {
            tracing::debug!("unknown or expired session token, starting a new session");
            Session::fresh(config.lifetime())
        }
    })
}

async fn persist(
    session: &Session,
    store: &dyn SessionStore,
    config: &SessionConfig,
    response: &mut Response<Body>,
) -> Result<(), SessionError> {
    let commit = session.commit();

    for old in &commit.replaced {
        store.remove(old).await?;
    }

    match (commit.status, commit.id) {
        (SessionStatus::Modified, Some(id)) => {
            store.save(&id, &commit.data).await?;
            let max_age = (commit.data.expires_at - Utc::now()).num_seconds().max(0);
            set_cookie(response, config, id.as_str(), max_age);
        }
        (SessionStatus::Destroyed, _) => {
            set_cookie(response, config, "", 0);
        }
        _ => {}
    }

    Ok(())
}

/// Session token from the cookie, else from the fallback header
fn extract_token(req: &Request<Body>, config: &SessionConfig) -> Option<SessionId> {
    let from_cookie = req
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| name.trim() == config.cookie_name)
        .map(|(_, value)| value.trim());

    let raw = from_cookie.or_else(|| {
        req.headers()
            .get(config.header_name.as_str())
            .and_then(|value| value.to_str().ok())
    })?;

    raw.parse().ok()
}

fn set_cookie(response: &mut Response<Body>, config: &SessionConfig, value: &str, max_age: i64) {
    let mut cookie = format!(
        "{}={}; Path=/; Max-Age={}; SameSite={}",
        config.cookie_name,
        value,
        max_age,
        config.same_site.as_str()
    );
    if config.http_only {
        cookie.push_str("; HttpOnly");
    }
    if config.secure {
        cookie.push_str("; Secure");
    }

    match HeaderValue::from_str(&cookie) {
        Ok(header) => {
            let headers = response.headers_mut();
            headers.append(SET_COOKIE, header);
            headers.append(VARY, HeaderValue::from_static("Cookie"));
            headers
                .entry(CACHE_CONTROL)
                .or_insert(HeaderValue::from_static(r#"no-cache="Set-Cookie""#));
        }
        Err(err) => tracing::error!(%err, "session cookie is not a valid header value"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use axum::http::StatusCode;
    use axum::{routing::get, Router};
    use tower::ServiceExt;

    fn config() -> SessionConfig {
        SessionConfig {
            secure: false,
            ..SessionConfig::default()
        }
    }

    fn app(store: Arc<MemorySessionStore>) -> Router {
        Router::new()
            .route("/noop", get(|| async { "noop" }))
            .route(
                "/put",
                get(|session: Session| async move {
                    session.put("greeting", "hello").unwrap();
                    "put"
                }),
            )
            .route(
                "/read",
                get(|session: Session| async move {
                    session.get::<String>("greeting").unwrap_or_default()
                }),
            )
            .route(
                "/renew",
                get(|session: Session| async move {
                    session.renew_token();
                    "renewed"
                }),
            )
            .route(
                "/destroy",
                get(|session: Session| async move {
                    session.destroy();
                    "destroyed"
                }),
            )
            .layer(SessionLayer::new(store, config()))
    }

    fn request(uri: &str, token: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(COOKIE, format!("session={token}"));
        }
        builder.body(Body::empty()).unwrap()
    }

    fn cookie_token(response: &Response<Body>) -> Option<String> {
        let raw = response.headers().get(SET_COOKIE)?.to_str().ok()?;
        let value = raw.split(';').next()?.strip_prefix("session=")?;
        Some(value.to_string())
    }

    async fn body(response: Response<Body>) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_untouched_session_sets_no_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let response = app(Arc::clone(&store))
            .oneshot(request("/noop", None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().get(SET_COOKIE).is_none());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_write_creates_session_and_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let response = app(Arc::clone(&store))
            .oneshot(request("/put", None))
            .await
            .unwrap();

        let raw = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(raw.contains("HttpOnly"));
        assert!(raw.contains("SameSite=Lax"));
        assert!(raw.contains("Path=/"));
        assert!(cookie_token(&response).is_some());
        assert_eq!(store.len(), 1);

        let token = cookie_token(&response).unwrap();
        let response = app(Arc::clone(&store))
            .oneshot(request("/read", Some(&token)))
            .await
            .unwrap();
        assert_eq!(body(response).await, "hello");
    }

    #[tokio::test]
    async fn test_header_fallback() {
        let store = Arc::new(MemorySessionStore::new());
        let response = app(Arc::clone(&store))
            .oneshot(request("/put", None))
            .await
            .unwrap();
        let token = cookie_token(&response).unwrap();

        let req = Request::builder()
            .uri("/read")
            .header("x-session-token", token)
            .body(Body::empty())
            .unwrap();
        let response = app(store).oneshot(req).await.unwrap();
        assert_eq!(body(response).await, "hello");
    }

    #[tokio::test]
    async fn test_unknown_token_gets_fresh_session() {
        let store = Arc::new(MemorySessionStore::new());
        let token = SessionId::generate();
        let response = app(store)
            .oneshot(request("/read", Some(token.as_str())))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "");
    }

    #[tokio::test]
    async fn test_renew_rotates_and_deletes_old_token() {
        let store = Arc::new(MemorySessionStore::new());
        let first = app(Arc::clone(&store))
            .oneshot(request("/put", None))
            .await
            .unwrap();
        let old = cookie_token(&first).unwrap();

        let renewed = app(Arc::clone(&store))
            .oneshot(request("/renew", Some(&old)))
            .await
            .unwrap();
        let new = cookie_token(&renewed).unwrap();
        assert_ne!(old, new);
        assert_eq!(store.len(), 1);

        let via_new = app(Arc::clone(&store))
            .oneshot(request("/read", Some(&new)))
            .await
            .unwrap();
        assert_eq!(body(via_new).await, "hello");

        let via_old = app(store)
            .oneshot(request("/read", Some(&old)))
            .await
            .unwrap();
        assert_eq!(body(via_old).await, "");
    }

    #[tokio::test]
    async fn test_destroy_expires_cookie() {
        let store = Arc::new(MemorySessionStore::new());
        let first = app(Arc::clone(&store))
            .oneshot(request("/put", None))
            .await
            .unwrap();
        let token = cookie_token(&first).unwrap();

        let response = app(Arc::clone(&store))
            .oneshot(request("/destroy", Some(&token)))
            .await
            .unwrap();
        let raw = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
        assert!(raw.starts_with("session=;"));
        assert!(raw.contains("Max-Age=0"));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_handler_without_layer_is_server_error() {
        let app = Router::new().route("/", get(|_session: Session| async { "unreachable" }));
        let response = app.oneshot(request("/", None)).await.unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
