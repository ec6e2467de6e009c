//! Top-level error types for the MQTT command-line client
//!
//! Each layer owns its own error enum; this module folds them into the single
//! `CliError` that `main` turns into a diagnostic line and an exit code.

use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

/// Main error type for command execution
#[derive(Debug, Error)]
pub enum CliError {
    #[error("Authentication error: {0}")]
    Auth(#[from] crate::auth::AuthError),

    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("MQTT error: {0}")]
    Mqtt(#[from] crate::transport::mqtt::MqttError),

    #[error("Transport error: {0}")]
    Transport(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Record error: {0}")]
    Record(#[from] crate::record::RecordError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

impl CliError {
    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Wrap a broker error from any [`Broker`](crate::transport::Broker) implementation
    pub fn transport<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Transport(Box::new(error))
    }

    /// Startup failures (auth, config) are fatal before any connection is attempted
    pub fn is_startup_failure(&self) -> bool {
        matches!(self, CliError::Auth(_) | CliError::Config(_))
    }

    /// Render the error as a single diagnostic line with secrets redacted
    pub fn diagnostic(&self) -> String {
        sanitize_error_message(&self.to_string())
    }
}

static CREDENTIAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|jwt|secret)[=:]\s*\S+").expect("static regex")
});

// Three dot-separated base64url segments look like a bearer token
static TOKEN_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}\.[A-Za-z0-9_-]{8,}").expect("static regex")
});

/// Redact credentials that may leak into error text (JWTs, passwords)
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = message.replace(['\n', '\r'], " ");

    sanitized = CREDENTIAL_PATTERN
        .replace_all(&sanitized, "${1}=***")
        .to_string();

    sanitized = TOKEN_PATTERN
        .replace_all(&sanitized, "***JWT***")
        .to_string();

    if sanitized.len() > 500 {
        let truncate_suffix = "...[truncated]";
        let mut cut = 500 - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}

/// Result type for command operations
pub type CliResult<T> = Result<T, CliError>;
