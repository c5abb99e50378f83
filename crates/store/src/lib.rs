use std::io;

use thiserror::Error;

mod log;
mod record;

pub use crate::log::LogStore;
pub use crate::record::{classify, current_timestamp, LogKind, Record};

pub type StoreResult<T> = Result<T, StoreError>;

/// Everything that can go wrong between a request body and a log line.
///
/// `Display` output is the user-facing message the HTTP layer returns
/// verbatim, so constructors pin the exact wording.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    InvalidInput(String),

    #[error("{message}")]
    Unavailable {
        message: String,
        #[source]
        source: io::Error,
    },

    #[error("Encoding error")]
    Encoding(#[source] serde_json::Error),
}

impl StoreError {
    pub fn invalid_input() -> Self {
        StoreError::InvalidInput("Invalid JSON".to_string())
    }

    pub fn unavailable(message: impl Into<String>, source: io::Error) -> Self {
        StoreError::Unavailable {
            message: message.into(),
            source,
        }
    }

    /// True for the malformed-request case, false for storage/encoding
    /// failures. Drives the HTTP status split (400 vs 500).
    pub fn is_invalid_input(&self) -> bool {
        matches!(self, StoreError::InvalidInput(_))
    }
}
