//! Shared helpers for the HTTP integration tests
//!
//! [`TestClient`] drives the full router with `oneshot` and keeps the
//! session cookie between requests like a browser would.

#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use snippetbox::config::{DatabaseConfig, SnippetboxConfig};
use snippetbox::models;
use snippetbox::routes;
use snippetbox::state::AppState;
use sqlx::SqlitePool;
use tower::ServiceExt;

/// Application state over a fresh in-memory database
pub async fn test_state() -> AppState {
    test_state_with_pool().await.0
}

/// Like [`test_state`], also handing back the pool for direct queries
pub async fn test_state_with_pool() -> (AppState, SqlitePool) {
    let config = SnippetboxConfig {
        database: DatabaseConfig::in_memory(),
        ..SnippetboxConfig::default()
    };
    let pool = models::connect(&config.database).await.unwrap();
    (AppState::new(config, pool.clone()).unwrap(), pool)
}

/// A buffered response
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: axum::http::HeaderMap,
    pub body: String,
}

impl TestResponse {
    async fn from_response(response: Response) -> Self {
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        Self {
            status,
            headers,
            body: String::from_utf8(bytes.to_vec()).unwrap(),
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn location(&self) -> Option<&str> {
        self.header(header::LOCATION.as_str())
    }

    /// Value of the hidden forgery token field in the page
    pub fn csrf_token(&self) -> String {
        let marker = "name='_csrf_token' value='";
        let start = self.body.find(marker).expect("page has a csrf field") + marker.len();
        let end = self.body[start..].find('\'').unwrap();
        self.body[start..start + end].to_string()
    }
}

/// Router plus a one-cookie jar
pub struct TestClient {
    app: Router,
    pub cookie: Option<String>,
}

impl TestClient {
    pub async fn new() -> Self {
        Self::with_state(test_state().await)
    }

    pub fn with_state(state: AppState) -> Self {
        Self {
            app: routes::app(state),
            cookie: None,
        }
    }

    pub async fn get(&mut self, uri: &str) -> TestResponse {
        let request = self.request("GET", uri, None, Body::empty());
        self.send(request).await
    }

    /// POST an urlencoded form
    pub async fn post_form(&mut self, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let body = url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(fields)
            .finish();
        let request = self.request(
            "POST",
            uri,
            Some("application/x-www-form-urlencoded"),
            Body::from(body),
        );
        self.send(request).await
    }

    /// GET `page`, then POST `fields` with its forgery token to `uri`
    pub async fn submit(&mut self, page: &str, uri: &str, fields: &[(&str, &str)]) -> TestResponse {
        let token = self.get(page).await.csrf_token();
        let mut fields: Vec<(&str, &str)> = fields.to_vec();
        fields.push(("_csrf_token", token.as_str()));
        self.post_form(uri, &fields).await
    }

    pub async fn signup(&mut self, name: &str, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/users/signup",
            "/users/signup",
            &[("name", name), ("email", email), ("password", password)],
        )
        .await
    }

    pub async fn login(&mut self, email: &str, password: &str) -> TestResponse {
        self.submit(
            "/users/login",
            "/users/login",
            &[("email", email), ("password", password)],
        )
        .await
    }

    fn request(
        &self,
        method: &str,
        uri: &str,
        content_type: Option<&str>,
        body: Body,
    ) -> Request<Body> {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(cookie) = &self.cookie {
            builder = builder.header(header::COOKIE, cookie);
        }
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(body).unwrap()
    }

    async fn send(&mut self, request: Request<Body>) -> TestResponse {
        let response = self.app.clone().oneshot(request).await.unwrap();
        let response = TestResponse::from_response(response).await;

        if let Some(set_cookie) = response.header(header::SET_COOKIE.as_str()) {
            let pair = set_cookie.split(';').next().unwrap().trim().to_string();
            if set_cookie.contains("Max-Age=0") {
                self.cookie = None;
            } else {
                self.cookie = Some(pair);
            }
        }
        response
    }
}
