//! Error types for the crate.
//!
//! Most of the crate uses `anyhow` with context strings. The ledger client is the exception: its
//! callers need to know *why* a request failed in order to decide between "saved offline" and
//! "rejected", so it returns the typed `LedgerError`.

use serde::{Deserialize, Serialize};

pub type Error = anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;

/// The classification of a ledger failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No response was received. The request may or may not have reached the server.
    Network,
    /// The payload was rejected. Retrying the same payload will not help.
    Validation,
    /// The session is missing or expired.
    Auth,
    /// The server failed. This may be transient.
    Server,
}

serde_plain::derive_display_from_serialize!(ErrorKind);

/// Errors returned by a `Ledger` implementation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// Connection-level failure, including timeouts.
    #[error("network error: {0}")]
    Network(String),

    /// The payload failed validation, either locally or on the server.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The server refused the credentials. The surrounding app is expected to tear down the
    /// session; the outbox never retries these on its own.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// The server answered with an error status or an unreadable body.
    #[error("server error ({status}): {message}")]
    Server { status: u16, message: String },
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Network(_) => ErrorKind::Network,
            LedgerError::Validation(_) => ErrorKind::Validation,
            LedgerError::Auth(_) => ErrorKind::Auth,
            LedgerError::Server { .. } => ErrorKind::Server,
        }
    }

    /// `Network` and `Server` failures may succeed later and are safe to hold in the outbox.
    pub fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Network | ErrorKind::Server)
    }

    /// Maps an HTTP status and a server-provided message into the taxonomy.
    pub(crate) fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => LedgerError::Auth(message),
            400..=499 => LedgerError::Validation(message),
            _ => LedgerError::Server { status, message },
        }
    }
}
