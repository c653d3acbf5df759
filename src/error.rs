//! Error types for Octogate
//!
//! All errors in the application are converted to `AppError`,
//! which implements `IntoResponse` for proper HTTP error responses.
//! Login failures are the exception: they are carried as
//! [`AuthenticationError`] and rendered as a flash message by the
//! authenticator instead of an error page.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

/// Application-wide error type
///
/// This enum represents all possible errors that can occur
/// in the application. It implements `IntoResponse` to
/// automatically convert errors to appropriate HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Resource not found (404)
    #[error("Resource not found")]
    NotFound,

    /// Authentication required (401)
    #[error("Authentication required")]
    Unauthorized,

    /// Login attempt failed (401)
    #[error("Authentication failed: {0}")]
    Authentication(#[from] AuthenticationError),

    /// Database error (500)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Configuration error (500)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encryption/decryption error (500)
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Internal server error (500)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Config(err.to_string())
    }
}

impl IntoResponse for AppError {
    /// Convert error to HTTP response
    ///
    /// Maps each error variant to appropriate HTTP status code
    /// and JSON error body.
    fn into_response(self) -> Response {
        use axum::Json;

        let (status, error_message, error_type) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, self.to_string(), "not_found"),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, self.to_string(), "unauthorized"),
            AppError::Authentication(error) => {
                (StatusCode::UNAUTHORIZED, error.render(), "authentication")
            }
            AppError::Database(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Database error".to_string(),
                "database",
            ),
            AppError::Config(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "config"),
            AppError::Encryption(msg) => {
                (StatusCode::INTERNAL_SERVER_ERROR, msg.clone(), "encryption")
            }
            AppError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
                "internal",
            ),
        };

        if status.is_server_error() {
            tracing::error!(error = %self, error_type, "Request failed");
        }

        // Record error metric
        use crate::metrics::ERRORS_TOTAL;
        ERRORS_TOTAL.with_label_values(&[error_type]).inc();

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

/// A failed login attempt, shown to the user.
///
/// The message is kept as a template plus parameters so the text can be
/// rendered (or translated) at the edge. Placeholders are plain substrings
/// such as `{{ provider }}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticationError {
    message_key: String,
    message_data: Vec<(String, String)>,
}

impl AuthenticationError {
    pub fn new(message_key: impl Into<String>) -> Self {
        Self {
            message_key: message_key.into(),
            message_data: Vec::new(),
        }
    }

    /// Attach a placeholder value
    pub fn with_param(mut self, placeholder: impl Into<String>, value: impl Into<String>) -> Self {
        self.message_data.push((placeholder.into(), value.into()));
        self
    }

    /// Substitute the parameters into the template.
    pub fn render(&self) -> String {
        replace_placeholders(&self.message_key, &self.message_data)
    }
}

impl std::fmt::Display for AuthenticationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

impl std::error::Error for AuthenticationError {}

/// Single-pass placeholder substitution.
///
/// At each position the longest matching placeholder wins, and substituted
/// text is never scanned again, so a value containing another placeholder is
/// emitted verbatim.
pub fn replace_placeholders(template: &str, params: &[(String, String)]) -> String {
    let mut candidates: Vec<&(String, String)> =
        params.iter().filter(|(key, _)| !key.is_empty()).collect();
    candidates.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    if candidates.is_empty() {
        return template.to_string();
    }

    let mut rendered = String::with_capacity(template.len());
    let mut rest = template;
    'scan: while !rest.is_empty() {
        for (key, value) in &candidates {
            if let Some(tail) = rest.strip_prefix(key.as_str()) {
                rendered.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            rendered.push(c);
        }
        rest = chars.as_str();
    }

    rendered
}
