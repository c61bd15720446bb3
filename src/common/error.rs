use serde::Serialize;
use thiserror::Error;

/// Machine-readable discriminator for request validation failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    ValidationError,
    InvalidSport,
    InvalidDate,
    PastDate,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCode::ValidationError => "VALIDATION_ERROR",
            ValidationCode::InvalidSport => "INVALID_SPORT",
            ValidationCode::InvalidDate => "INVALID_DATE",
            ValidationCode::PastDate => "PAST_DATE",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ValidationError {
    pub code: ValidationCode,
    pub message: String,
}

impl ValidationError {
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum PlayScannerError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON deserialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Store error: {message}")]
    Store { message: String },

    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: String, after_ms: u64 },

    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    #[error("A collection run is already in progress")]
    AlreadyRunning,

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
}

impl PlayScannerError {
    pub fn store(message: impl Into<String>) -> Self {
        PlayScannerError::Store {
            message: message.into(),
        }
    }

    pub fn provider(provider: &str, message: impl Into<String>) -> Self {
        PlayScannerError::Provider {
            provider: provider.to_string(),
            message: message.into(),
        }
    }

    /// True for failures that originate outside this process (provider, network, timeout).
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            PlayScannerError::Http(_)
                | PlayScannerError::Provider { .. }
                | PlayScannerError::Timeout { .. }
        )
    }
}

impl From<rusqlite::Error> for PlayScannerError {
    fn from(e: rusqlite::Error) -> Self {
        PlayScannerError::Store {
            message: e.to_string(),
        }
    }
}

impl From<tokio::task::JoinError> for PlayScannerError {
    fn from(e: tokio::task::JoinError) -> Self {
        PlayScannerError::Store {
            message: format!("store task failed: {e}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, PlayScannerError>;
