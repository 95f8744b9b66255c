//! Typed form submissions and their validation rules
//!
//! Each form decodes from an urlencoded body, carries its own [`Validator`],
//! and can produce a [`FormView`] snapshot for re-rendering. Password fields
//! are never copied into a snapshot.

mod validator;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use validator::{
    matches, max_chars, min_chars, not_blank, permitted_value, Validator, EMAIL_RX,
};

const BLANK: &str = "This field cannot be blank";

/// Expiry choices offered by the create form, in days
pub const PERMITTED_EXPIRES: [i64; 3] = [1, 7, 365];

/// Submission from the create-snippet form
#[derive(Debug, Clone, Deserialize)]
pub struct SnippetCreateForm {
    /// Snippet title
    #[serde(default)]
    pub title: String,
    /// Snippet body
    #[serde(default)]
    pub content: String,
    /// Lifetime in days
    #[serde(default = "default_expires")]
    pub expires: i64,
    #[serde(skip)]
    validator: Validator,
}

const fn default_expires() -> i64 {
    365
}

impl Default for SnippetCreateForm {
    fn default() -> Self {
        Self {
            title: String::new(),
            content: String::new(),
            expires: default_expires(),
            validator: Validator::default(),
        }
    }
}

impl SnippetCreateForm {
    /// A submission with the given fields and no errors yet
    #[must_use]
    pub fn new(title: impl Into<String>, content: impl Into<String>, expires: i64) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            expires,
            validator: Validator::default(),
        }
    }

    /// Run every rule and return whether the submission is acceptable
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.title), "title", BLANK);
        v.check_field(
            max_chars(&self.title, 100),
            "title",
            "This field cannot be more than 100 characters long",
        );
        v.check_field(not_blank(&self.content), "content", BLANK);
        v.check_field(
            permitted_value(&self.expires, &PERMITTED_EXPIRES),
            "expires",
            "This field must equal 1, 7 or 365",
        );
        v.valid()
    }

    /// The accumulated errors
    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Values and errors for the template
    #[must_use]
    pub fn snapshot(&self) -> FormView {
        FormView::new(&self.validator)
            .with_value("title", &self.title)
            .with_value("content", &self.content)
            .with_value("expires", &self.expires.to_string())
    }
}

/// Submission from the signup form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserSignupForm {
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Login email
    #[serde(default)]
    pub email: String,
    /// Plaintext password, only held for the duration of the request
    #[serde(default)]
    pub password: String,
    #[serde(skip)]
    validator: Validator,
}

impl UserSignupForm {
    /// A submission with the given fields and no errors yet
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            password: password.into(),
            validator: Validator::default(),
        }
    }

    /// Run every rule and return whether the submission is acceptable
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.name), "name", BLANK);
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.check_field(
            min_chars(&self.password, 8),
            "password",
            "This field must be at least 8 characters long",
        );
        v.valid()
    }

    /// Attach an error discovered after validation, e.g. a duplicate email
    pub fn add_field_error(&mut self, field: &str, message: &str) {
        self.validator.add_field_error(field, message);
    }

    /// The accumulated errors
    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Values and errors for the template; the password is dropped
    #[must_use]
    pub fn snapshot(&self) -> FormView {
        FormView::new(&self.validator)
            .with_value("name", &self.name)
            .with_value("email", &self.email)
    }
}

/// Submission from the login form
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UserLoginForm {
    /// Login email
    #[serde(default)]
    pub email: String,
    /// Plaintext password
    #[serde(default)]
    pub password: String,
    #[serde(skip)]
    validator: Validator,
}

impl UserLoginForm {
    /// A submission with the given credentials and no errors yet
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
            validator: Validator::default(),
        }
    }

    /// Run every rule and return whether the submission is acceptable
    pub fn validate(&mut self) -> bool {
        let v = &mut self.validator;
        v.check_field(not_blank(&self.email), "email", BLANK);
        v.check_field(
            matches(&self.email, &EMAIL_RX),
            "email",
            "This field must be a valid email address",
        );
        v.check_field(not_blank(&self.password), "password", BLANK);
        v.valid()
    }

    /// Record a failure that concerns the whole submission
    pub fn add_non_field_error(&mut self, message: &str) {
        self.validator.add_non_field_error(message);
    }

    /// The accumulated errors
    #[must_use]
    pub const fn validator(&self) -> &Validator {
        &self.validator
    }

    /// Values and errors for the template; the password is dropped
    #[must_use]
    pub fn snapshot(&self) -> FormView {
        FormView::new(&self.validator).with_value("email", &self.email)
    }
}

/// Read-only view of a form handed to templates
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FormView {
    values: BTreeMap<String, String>,
    field_errors: BTreeMap<String, Vec<String>>,
    non_field_errors: Vec<String>,
}

impl FormView {
    fn new(validator: &Validator) -> Self {
        Self {
            values: BTreeMap::new(),
            field_errors: validator.field_errors().clone(),
            non_field_errors: validator.non_field_errors().to_vec(),
        }
    }

    /// Blank create form with the default expiry preselected
    #[must_use]
    pub fn for_new_snippet() -> Self {
        SnippetCreateForm::default().snapshot()
    }

    #[must_use]
    fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_owned(), value.to_owned());
        self
    }

    /// Submitted value for `name`, empty when absent
    #[must_use]
    pub fn value(&self, name: &str) -> &str {
        self.values.get(name).map_or("", String::as_str)
    }

    /// Errors recorded against `name`
    #[must_use]
    pub fn errors(&self, name: &str) -> &[String] {
        self.field_errors.get(name).map_or(&[], Vec::as_slice)
    }

    /// Errors for the whole form
    #[must_use]
    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }

    /// True when `name` currently holds `candidate`, for radio buttons
    #[must_use]
    pub fn is_selected(&self, name: &str, candidate: i64) -> bool {
        self.value(name) == candidate.to_string()
    }
}
