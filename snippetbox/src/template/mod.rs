//! HTML rendering
//!
//! Pages are askama templates. Each page extends `base.html` and pulls in
//! the shared partials, so the full composition is resolved at build time.
//! [`TemplateCache`] maps page names to their compiled renderers. It is
//! built and checked once at startup and never mutated afterwards.
//!
//! Rendering writes into a buffer first. The response is only built once
//! the whole page rendered, so a failing template can never produce a
//! half-written 200.

use std::collections::HashMap;

use askama::Template;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use chrono::{DateTime, Datelike, Utc};
use once_cell::sync::Lazy;
use thiserror::Error;

use crate::error::AppError;
use crate::forms::FormView;
use crate::models::Snippet;

/// Format a timestamp the way pages display it, e.g. `2 Jan 2006 at 15:04`
#[must_use]
pub fn human_date(t: &DateTime<Utc>) -> String {
    t.format("%-d %b %Y at %H:%M").to_string()
}

/// Page-specific content
#[derive(Debug, Clone, Default)]
pub enum Payload {
    /// Nothing beyond the common fields
    #[default]
    None,
    /// A single snippet
    Snippet(Snippet),
    /// A list of snippets
    Snippets(Vec<Snippet>),
    /// A form being filled in or re-shown with errors
    Form(FormView),
}

/// Everything a page can display
#[derive(Debug, Clone, Default)]
pub struct TemplateData {
    /// Year shown in the footer
    pub current_year: i32,
    /// One-time message from the previous request
    pub flash: Option<String>,
    /// Whether to show logged-in navigation
    pub is_authenticated: bool,
    /// Forgery token for embedded forms
    pub csrf_token: String,
    /// Page-specific content
    pub payload: Payload,
}

static EMPTY_FORM: Lazy<FormView> = Lazy::new(FormView::default);

impl TemplateData {
    /// Data stamped with the current year
    #[must_use]
    pub fn new() -> Self {
        Self {
            current_year: Utc::now().year(),
            ..Self::default()
        }
    }

    /// Replace the payload
    #[must_use]
    pub fn with_payload(mut self, payload: Payload) -> Self {
        self.payload = payload;
        self
    }

    /// The snippet payload, if any
    #[must_use]
    pub const fn snippet(&self) -> Option<&Snippet> {
        match &self.payload {
            Payload::Snippet(s) => Some(s),
            _ => None,
        }
    }

    /// The snippet list payload; empty for other payloads
    #[must_use]
    pub fn snippets(&self) -> &[Snippet] {
        match &self.payload {
            Payload::Snippets(s) => s,
            _ => &[],
        }
    }

    /// The form payload; an empty form for other payloads
    #[must_use]
    pub fn form(&self) -> &FormView {
        match &self.payload {
            Payload::Form(f) => f,
            _ => &EMPTY_FORM,
        }
    }
}

#[derive(Template)]
#[template(path = "pages/home.html")]
struct HomePage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/view.html")]
struct ViewPage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/create.html")]
struct CreatePage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/signup.html")]
struct SignupPage<'a> {
    data: &'a TemplateData,
}

#[derive(Template)]
#[template(path = "pages/login.html")]
struct LoginPage<'a> {
    data: &'a TemplateData,
}

type RenderFn = fn(&TemplateData, &mut String) -> askama::Result<()>;

/// Template cache construction errors
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A page failed its startup render
    #[error("template {page} failed to render: {source}")]
    Compose {
        /// Page name
        page: &'static str,
        /// Underlying askama error
        source: askama::Error,
    },
}

/// Immutable map from page name to renderer
#[derive(Debug)]
pub struct TemplateCache {
    pages: HashMap<&'static str, RenderFn>,
}

impl TemplateCache {
    /// Register every page and render each once with empty data
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Compose`] for the first page that fails.
    pub fn new() -> Result<Self, TemplateError> {
        let entries: [(&'static str, RenderFn); 5] = [
            ("home.html", |data, buf| HomePage { data }.render_into(buf)),
            ("view.html", |data, buf| ViewPage { data }.render_into(buf)),
            ("create.html", |data, buf| CreatePage { data }.render_into(buf)),
            ("signup.html", |data, buf| SignupPage { data }.render_into(buf)),
            ("login.html", |data, buf| LoginPage { data }.render_into(buf)),
        ];

        let probe = TemplateData::new();
        for &(page, render) in &entries {
            let mut buf = String::new();
            render(&probe, &mut buf).map_err(|source| TemplateError::Compose { page, source })?;
        }

        let pages: HashMap<_, _> = entries.into_iter().collect();
        tracing::debug!(pages = pages.len(), "template cache ready");
        Ok(Self { pages })
    }

    /// Names of the registered pages
    pub fn page_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.pages.keys().copied()
    }

    /// Render `page` into a complete response with `status`
    ///
    /// # Errors
    ///
    /// [`AppError::MissingTemplate`] if `page` is not registered, or
    /// [`AppError::Render`] if rendering fails. Nothing is written in
    /// either case.
    pub fn render(
        &self,
        status: StatusCode,
        page: &str,
        data: &TemplateData,
    ) -> Result<Response, AppError> {
        let render = self
            .pages
            .get(page)
            .ok_or_else(|| AppError::MissingTemplate(page.to_string()))?;

        let mut buf = String::with_capacity(4096);
        render(data, &mut buf)?;

        Ok((status, Html(buf)).into_response())
    }
}
