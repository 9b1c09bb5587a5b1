//! Form payloads accepted by the page handlers and their validation rules.

use crate::user::UserManager;
use anyhow::Result;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const MAX_USERNAME_LENGTH: usize = 150;
pub const MIN_PASSWORD_LENGTH: usize = 8;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CREDENTIALS: &str = "Invalid credentials.";

lazy_static! {
    static ref USERNAME_RE: Regex = Regex::new(r"^[\w.@+-]+$").expect("valid username regex");
    static ref EMAIL_RE: Regex =
        Regex::new(r"^[^\s@]+@[^\s@.]+(\.[^\s@.]+)+$").expect("valid email regex");
}

/// Field name to messages. Form-wide messages go under `__all__`.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    pub password1: String,
    pub password2: String,
}

impl SignupForm {
    /// Everything except username uniqueness, which needs the store.
    pub fn validate_fields(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        let username = self.username.trim();

        if username.is_empty() {
            errors.add("username", REQUIRED);
        } else {
            let length = username.chars().count();
            if length > MAX_USERNAME_LENGTH {
                errors.add(
                    "username",
                    format!(
                        "Ensure this value has at most {} characters (it has {}).",
                        MAX_USERNAME_LENGTH, length
                    ),
                );
            }
            if !USERNAME_RE.is_match(username) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", REQUIRED);
        } else if !EMAIL_RE.is_match(email) {
            errors.add("email", "Enter a valid email address.");
        }

        if self.password1.is_empty() {
            errors.add("password1", REQUIRED);
        }
        if self.password2.is_empty() {
            errors.add("password2", REQUIRED);
        }
        if !self.password1.is_empty() && !self.password2.is_empty() {
            if self.password1 != self.password2 {
                errors.add("password2", "The two password fields didn't match.");
            } else {
                if self.password2.chars().count() < MIN_PASSWORD_LENGTH {
                    errors.add(
                        "password2",
                        format!(
                            "This password is too short. It must contain at least {} characters.",
                            MIN_PASSWORD_LENGTH
                        ),
                    );
                }
                if self.password2.chars().all(|c| c.is_ascii_digit()) {
                    errors.add("password2", "This password is entirely numeric.");
                }
            }
        }
        errors
    }

    pub fn validate(&self, user_manager: &UserManager) -> Result<FormErrors> {
        let mut errors = self.validate_fields();
        if errors.field("username").is_empty() && user_manager.handle_exists(self.username.trim())? {
            errors.add("username", "A user with that username already exists.");
        }
        Ok(errors)
    }

    /// Echoed back with errors; passwords are never returned.
    pub fn echo(&self) -> serde_json::Value {
        serde_json::json!({ "username": self.username, "email": self.email })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub username: String,
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.username.trim().is_empty() {
            errors.add("username", REQUIRED);
        }
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        errors
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewForm {
    pub message: String,
}

impl ReviewForm {
    pub fn validate(&self) -> FormErrors {
        let mut errors = FormErrors::default();
        if self.message.trim().is_empty() {
            errors.add("message", REQUIRED);
        }
        errors
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeedbackForm {
    pub correct: bool,
}
