//! Common error types for leadtrap
//!
//! Callers need to distinguish "nothing to do" from "retry" from "fatal",
//! so every failure mode gets its own variant instead of a catch-all.

use thiserror::Error;

/// Common result type for leadtrap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by all leadtrap components
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation error (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// I/O operation error (wraps std::io::Error)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Referenced identifier absent in local store or upstream.
    /// Surfaced to the caller, never retried automatically.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Missing required data (e.g. no phone number to send to).
    /// Recorded as a failed attempt, never process-fatal.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Transient upstream failure from the data or messaging provider.
    /// Retried with backoff for idempotent reads; never retried for
    /// spend operations (unlock, send).
    #[error("Provider error: {0}")]
    Provider(String),

    /// Redelivered inbound notification. Silently ignored by callers.
    #[error("Duplicate event: {0}")]
    DuplicateEvent(String),
}

impl Error {
    /// Whether the operation that produced this error is safe to retry.
    ///
    /// Only transient provider failures qualify; spend operations are
    /// handled separately and never pass through here.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Provider(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_errors_are_retryable() {
        assert!(Error::Provider("timeout".into()).is_retryable());
        assert!(!Error::NotFound("lead X".into()).is_retryable());
        assert!(!Error::Validation("no phone".into()).is_retryable());
        assert!(!Error::DuplicateEvent("SM123".into()).is_retryable());
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::Validation("no phone number".into());
        assert_eq!(err.to_string(), "Validation error: no phone number");
    }
}
