use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Errors produced by the holdings client, the quote gateway and the refresh loop.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// The network call could not complete (timeout, DNS, connection reset, 5xx).
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Holdings service returned HTTP {status}: {message}")]
    Store { status: u16, message: String },

    #[error("Stock {0} already exists")]
    Conflict(String),

    #[error("Stock {0} not found")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Please log in to view your dashboard")]
    Unauthorized,

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;

/// Coarse category of a [`TrackerError`], cheap to copy into UI state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    Transport,
    Store,
    Conflict,
    NotFound,
    Validation,
    Unauthorized,
    Config,
}

impl TrackerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackerError::Transport(_) => ErrorKind::Transport,
            TrackerError::Store { .. } => ErrorKind::Store,
            TrackerError::Conflict(_) => ErrorKind::Conflict,
            TrackerError::NotFound(_) => ErrorKind::NotFound,
            TrackerError::Validation(_) => ErrorKind::Validation,
            TrackerError::Unauthorized => ErrorKind::Unauthorized,
            TrackerError::Config(_) => ErrorKind::Config,
        }
    }

    /// Only transport failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TrackerError::Transport(_))
    }

    /// HTTP status carried by store-side failures.
    pub fn status(&self) -> Option<u16> {
        match self {
            TrackerError::Store { status, .. } => Some(*status),
            TrackerError::Conflict(_) => Some(409),
            TrackerError::NotFound(_) => Some(404),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TrackerError::Transport(format!("request timed out: {}", e))
        } else {
            TrackerError::Transport(e.to_string())
        }
    }
}

/// A displayable error banner. It stays visible until `dismiss_after` has
/// elapsed since `raised_at`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorNotice {
    pub kind: ErrorKind,
    pub message: String,
    pub raised_at: DateTime<Utc>,
    #[serde(skip)]
    pub dismiss_after: Duration,
}

impl ErrorNotice {
    pub fn new(error: &TrackerError, dismiss_after: Duration) -> Self {
        Self {
            kind: error.kind(),
            message: error.to_string(),
            raised_at: Utc::now(),
            dismiss_after,
        }
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        match chrono::Duration::from_std(self.dismiss_after) {
            Ok(ttl) => now < self.raised_at + ttl,
            Err(_) => true,
        }
    }
}
