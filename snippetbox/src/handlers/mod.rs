//! Route handlers
//!
//! Handlers never write a partial response: they either return a rendered
//! page, a redirect, or an [`AppError`] that the error layer turns into an
//! envelope.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};

use crate::auth::{log_in, log_out, AuthenticationState};
use crate::error::AppError;
use crate::extractors::DecodedForm;
use crate::forms::{FormView, SnippetCreateForm, UserLoginForm, UserSignupForm};
use crate::middleware::session_token;
use crate::models::ModelError;
use crate::session::Session;
use crate::state::AppState;
use crate::template::{Payload, TemplateData};

/// Session key for one-time messages
pub const FLASH_KEY: &str = "flash";

/// Common template data for the current request
///
/// Consumes any pending flash message.
///
/// # Errors
///
/// Fails if the forgery token cannot be stored in the session.
pub fn new_template_data(
    session: &Session,
    auth: AuthenticationState,
) -> Result<TemplateData, AppError> {
    Ok(TemplateData {
        flash: session.pop::<String>(FLASH_KEY),
        is_authenticated: auth.is_authenticated(),
        csrf_token: session_token(session)?,
        ..TemplateData::new()
    })
}

/// `GET /`
pub async fn home(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
) -> Result<Response, AppError> {
    let snippets = state
        .snippets
        .latest(state.config.snippets.latest_limit)
        .await?;

    let data = new_template_data(&session, auth)?.with_payload(Payload::Snippets(snippets));
    state.templates.render(StatusCode::OK, "home.html", &data)
}

/// `GET /snippets/view/{id}`
///
/// A non-numeric or non-positive id is a 400; an unknown or expired one a 404.
pub async fn snippet_view(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
    Path(id): Path<String>,
) -> Result<Response, AppError> {
    let id = parse_id(&id)?;
    let snippet = state.snippets.get(id).await?;

    let data = new_template_data(&session, auth)?.with_payload(Payload::Snippet(snippet));
    state.templates.render(StatusCode::OK, "view.html", &data)
}

fn parse_id(raw: &str) -> Result<i64, AppError> {
    match raw.parse::<i64>() {
        Ok(id) if id >= 1 => Ok(id),
        _ => Err(AppError::bad_request()),
    }
}

/// `GET /snippets/create`
pub async fn snippet_create(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
) -> Result<Response, AppError> {
    let data = new_template_data(&session, auth)?
        .with_payload(Payload::Form(FormView::for_new_snippet()));
    state.templates.render(StatusCode::OK, "create.html", &data)
}

/// `POST /snippets/create`
pub async fn snippet_create_post(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
    DecodedForm(mut form): DecodedForm<SnippetCreateForm>,
) -> Result<Response, AppError> {
    if !form.validate() {
        let data = new_template_data(&session, auth)?.with_payload(Payload::Form(form.snapshot()));
        return state
            .templates
            .render(StatusCode::BAD_REQUEST, "create.html", &data);
    }

    let id = state
        .snippets
        .insert(&form.title, &form.content, form.expires)
        .await?;
    tracing::info!(snippet_id = id, "snippet created");

    session.put(FLASH_KEY, "Snippet successfully created!")?;
    Ok(Redirect::to(&format!("/snippets/view/{id}")).into_response())
}

/// `GET /users/signup`
pub async fn user_signup(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
) -> Result<Response, AppError> {
    let data = new_template_data(&session, auth)?;
    state.templates.render(StatusCode::OK, "signup.html", &data)
}

/// `POST /users/signup`
pub async fn user_signup_post(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
    DecodedForm(mut form): DecodedForm<UserSignupForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state
            .users
            .insert(&form.name, &form.email, &form.password)
            .await
        {
            Ok(()) => {
                session.put(FLASH_KEY, "Your signup was successful. Please log in.")?;
                return Ok(Redirect::to("/users/login").into_response());
            }
            Err(ModelError::DuplicateEmail) => {
                form.add_field_error("email", "Email address is already in use");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = new_template_data(&session, auth)?.with_payload(Payload::Form(form.snapshot()));
    state
        .templates
        .render(StatusCode::BAD_REQUEST, "signup.html", &data)
}

/// `GET /users/login`
pub async fn user_login(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
) -> Result<Response, AppError> {
    let data = new_template_data(&session, auth)?;
    state.templates.render(StatusCode::OK, "login.html", &data)
}

/// `POST /users/login`
pub async fn user_login_post(
    State(state): State<AppState>,
    session: Session,
    auth: AuthenticationState,
    DecodedForm(mut form): DecodedForm<UserLoginForm>,
) -> Result<Response, AppError> {
    if form.validate() {
        match state.users.authenticate(&form.email, &form.password).await {
            Ok(user_id) => {
                log_in(&session, user_id)?;
                tracing::info!(user_id, "user logged in");
                return Ok(Redirect::to("/snippets/create").into_response());
            }
            Err(ModelError::InvalidCredentials) => {
                form.add_non_field_error("Email or password is incorrect");
            }
            Err(err) => return Err(err.into()),
        }
    }

    let data = new_template_data(&session, auth)?.with_payload(Payload::Form(form.snapshot()));
    state
        .templates
        .render(StatusCode::BAD_REQUEST, "login.html", &data)
}

/// `POST /users/logout`
pub async fn user_logout_post(session: Session) -> Result<Response, AppError> {
    log_out(&session);
    session.put(FLASH_KEY, "You've been logged out successfully!")?;
    Ok(Redirect::to("/").into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AUTHENTICATED_USER_ID;
    use crate::models::{MockSnippetStore, MockUserStore};
    use crate::testing::state_with;
    use chrono::Duration;

    fn session() -> Session {
        Session::fresh(Duration::hours(1))
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42").unwrap(), 42);
        for bad in ["abc", "0", "-3", "", "1.5"] {
            assert_eq!(parse_id(bad).unwrap_err().status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn test_template_data_pops_flash_once() {
        let session = session();
        session.put(FLASH_KEY, "hello").unwrap();

        let first = new_template_data(&session, AuthenticationState::Unauthenticated).unwrap();
        assert_eq!(first.flash.as_deref(), Some("hello"));
        assert!(!first.csrf_token.is_empty());

        let second = new_template_data(&session, AuthenticationState::Authenticated(1)).unwrap();
        assert_eq!(second.flash, None);
        assert!(second.is_authenticated);
        assert_eq!(first.csrf_token, second.csrf_token);
    }

    #[tokio::test]
    async fn test_home_uses_configured_limit() {
        let mut snippets = MockSnippetStore::new();
        snippets
            .expect_latest()
            .withf(|limit| *limit == 10)
            .times(1)
            .returning(|_| Ok(Vec::new()));

        let state = state_with(snippets, MockUserStore::new());
        let response = home(
            State(state),
            session(),
            AuthenticationState::Unauthenticated,
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(body_text(response).await.contains("nothing to see here"));
    }

    #[tokio::test]
    async fn test_view_unknown_snippet_is_404() {
        let mut snippets = MockSnippetStore::new();
        snippets
            .expect_get()
            .returning(|_| Err(ModelError::NoRecord));

        let state = state_with(snippets, MockUserStore::new());
        let err = snippet_view(
            State(state),
            session(),
            AuthenticationState::Unauthenticated,
            Path("999999".into()),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_create_with_invalid_form_rerenders_without_insert() {
        let mut snippets = MockSnippetStore::new();
        snippets.expect_insert().never();

        let state = state_with(snippets, MockUserStore::new());
        let form = SnippetCreateForm::new("x".repeat(101), "kept content", 365);
        let response = snippet_create_post(
            State(state),
            session(),
            AuthenticationState::Authenticated(1),
            DecodedForm(form),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("This field cannot be more than 100 characters long"));
        assert!(html.contains("kept content"));
    }

    #[tokio::test]
    async fn test_create_redirects_to_new_snippet_with_flash() {
        let mut snippets = MockSnippetStore::new();
        snippets
            .expect_insert()
            .withf(|title, content, expires| {
                title.to_string() == "O snail" && content.to_string() == "Climb" && *expires == 7
            })
            .returning(|_, _, _| Ok(12));

        let state = state_with(snippets, MockUserStore::new());
        let session = session();
        let form = SnippetCreateForm::new("O snail", "Climb", 7);
        let response = snippet_create_post(
            State(state),
            session.clone(),
            AuthenticationState::Authenticated(1),
            DecodedForm(form),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/snippets/view/12"
        );
        assert_eq!(
            session.get::<String>(FLASH_KEY).as_deref(),
            Some("Snippet successfully created!")
        );
    }

    #[tokio::test]
    async fn test_create_store_failure_propagates() {
        let mut snippets = MockSnippetStore::new();
        snippets
            .expect_insert()
            .returning(|_, _, _| Err(ModelError::Database(sqlx::Error::PoolTimedOut)));

        let state = state_with(snippets, MockUserStore::new());
        let form = SnippetCreateForm::new("t", "c", 365);
        let err = snippet_create_post(
            State(state),
            session(),
            AuthenticationState::Authenticated(1),
            DecodedForm(form),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_signup_duplicate_email_rerenders() {
        let mut users = MockUserStore::new();
        users
            .expect_insert()
            .returning(|_, _, _| Err(ModelError::DuplicateEmail));

        let state = state_with(MockSnippetStore::new(), users);
        let form = UserSignupForm::new("Alice", "alice@example.com", "supersecret");
        let response = user_signup_post(
            State(state),
            session(),
            AuthenticationState::Unauthenticated,
            DecodedForm(form),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let html = body_text(response).await;
        assert!(html.contains("Email address is already in use"));
        assert!(html.contains("value='Alice'"));
        assert!(!html.contains("supersecret"));
    }

    #[tokio::test]
    async fn test_login_bad_credentials_is_non_field_error() {
        let mut users = MockUserStore::new();
        users
            .expect_authenticate()
            .returning(|_, _| Err(ModelError::InvalidCredentials));

        let state = state_with(MockSnippetStore::new(), users);
        let session = session();
        let form = UserLoginForm::new("alice@example.com", "wrong-password");
        let response = user_login_post(
            State(state),
            session.clone(),
            AuthenticationState::Unauthenticated,
            DecodedForm(form),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(body_text(response)
            .await
            .contains("Email or password is incorrect"));
        assert!(!session.exists(AUTHENTICATED_USER_ID));
    }

    #[tokio::test]
    async fn test_login_success_stores_user() {
        let mut users = MockUserStore::new();
        users.expect_authenticate().returning(|_, _| Ok(4));

        let state = state_with(MockSnippetStore::new(), users);
        let session = session();
        let form = UserLoginForm::new("alice@example.com", "pa55word!");
        let response = user_login_post(
            State(state),
            session.clone(),
            AuthenticationState::Unauthenticated,
            DecodedForm(form),
        )
        .await
        .unwrap();

        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers().get("location").unwrap(),
            "/snippets/create"
        );
        assert_eq!(session.get::<i64>(AUTHENTICATED_USER_ID), Some(4));
    }

    #[tokio::test]
    async fn test_logout_clears_user_and_sets_flash() {
        let session = session();
        log_in(&session, 4).unwrap();

        let response = user_logout_post(session.clone()).await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert!(!session.exists(AUTHENTICATED_USER_ID));
        assert_eq!(
            session.get::<String>(FLASH_KEY).as_deref(),
            Some("You've been logged out successfully!")
        );
    }
}
