//! Error types for the swap engine

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("Database error: {0}")]
    Store(#[from] rusqlite::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Caller-facing error classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Malformed input, rejected before touching the store
    Validation,
    /// Ownership or status precondition not met
    PreconditionFailed,
    /// Transaction or commit failure; nothing was applied
    Store,
}

impl ErrorKind {
    /// Only store failures are worth retrying unchanged
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Store)
    }
}

impl Error {
    pub(crate) fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub(crate) fn precondition(msg: impl Into<String>) -> Self {
        Error::PreconditionFailed(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Config(_) => ErrorKind::Validation,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::Store(_) | Error::Unavailable(_) | Error::Io(_) => {
                ErrorKind::Store
            }
        }
    }

    /// Message safe to hand to a remote caller.
    ///
    /// Store-class failures never carry SQLite detail.
    pub fn public_message(&self) -> String {
        match self {
            Error::Validation(msg) | Error::PreconditionFailed(msg) | Error::Config(msg) => {
                msg.clone()
            }
            _ => "temporary store failure, retry later".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_mapping() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::precondition("x").kind(),
            ErrorKind::PreconditionFailed
        );
        let store = Error::Store(rusqlite::Error::QueryReturnedNoRows);
        assert_eq!(store.kind(), ErrorKind::Store);
        assert!(store.kind().is_retryable());
        assert!(!ErrorKind::PreconditionFailed.is_retryable());
    }

    #[test]
    fn test_store_message_is_generic() {
        let err = Error::Store(rusqlite::Error::InvalidQuery);
        assert_eq!(err.public_message(), "temporary store failure, retry later");
        assert_eq!(
            Error::precondition("invalid request").public_message(),
            "invalid request"
        );
    }
}
