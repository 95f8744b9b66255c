//! Error-accumulating form validator
//!
//! A [`Validator`] collects messages per field plus a bucket for errors that
//! belong to the submission as a whole. It never short-circuits: every check
//! runs, so a re-rendered form can show all problems at once.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

/// Email pattern recommended by the WHATWG for `<input type="email">`.
pub static EMAIL_RX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("Invalid regex")
});

/// Accumulated validation errors for a single submission
///
/// # Examples
///
/// ```rust
/// use snippetbox::forms::{not_blank, max_chars, Validator};
///
/// let mut v = Validator::default();
/// v.check_field(not_blank(""), "title", "This field cannot be blank");
/// v.check_field(max_chars("short", 100), "title", "Too long");
///
/// assert!(!v.valid());
/// assert_eq!(v.errors_for("title"), ["This field cannot be blank"]);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Validator {
    field_errors: BTreeMap<String, Vec<String>>,
    non_field_errors: Vec<String>,
}

impl Validator {
    /// Create an empty validator
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True when no field or non-field error has been recorded
    #[must_use]
    pub fn valid(&self) -> bool {
        self.field_errors.is_empty() && self.non_field_errors.is_empty()
    }

    /// Record `message` under `field` unless `ok` holds
    pub fn check_field(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.add_field_error(field, message);
        }
    }

    /// Record `message` under `field` unconditionally
    pub fn add_field_error(&mut self, field: &str, message: &str) {
        self.field_errors
            .entry(field.to_owned())
            .or_default()
            .push(message.to_owned());
    }

    /// Record an error that does not belong to a single field
    pub fn add_non_field_error(&mut self, message: &str) {
        self.non_field_errors.push(message.to_owned());
    }

    /// Messages recorded for `field`, in insertion order
    #[must_use]
    pub fn errors_for(&self, field: &str) -> &[String] {
        self.field_errors.get(field).map_or(&[], Vec::as_slice)
    }

    /// All field errors, keyed by field name
    #[must_use]
    pub const fn field_errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.field_errors
    }

    /// Errors not attached to a field
    #[must_use]
    pub fn non_field_errors(&self) -> &[String] {
        &self.non_field_errors
    }

    /// Total number of recorded messages
    #[must_use]
    pub fn count(&self) -> usize {
        self.field_errors.values().map(Vec::len).sum::<usize>() + self.non_field_errors.len()
    }
}

/// True when `value` contains a non-whitespace character
#[must_use]
pub fn not_blank(value: &str) -> bool {
    !value.trim().is_empty()
}

/// True when `value` has at most `n` characters (not bytes)
#[must_use]
pub fn max_chars(value: &str, n: usize) -> bool {
    value.chars().count() <= n
}

/// True when `value` has at least `n` characters (not bytes)
#[must_use]
pub fn min_chars(value: &str, n: usize) -> bool {
    value.chars().count() >= n
}

/// True when `value` is one of `permitted`
#[must_use]
pub fn permitted_value<T: PartialEq>(value: &T, permitted: &[T]) -> bool {
    permitted.contains(value)
}

/// True when `value` matches `rx`
#[must_use]
pub fn matches(value: &str, rx: &Regex) -> bool {
    rx.is_match(value)
}
