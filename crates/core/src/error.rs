//! Error types for data service calls
//!
//! Every failure surfaced by the declaration validator, the transport and the
//! callers is represented by [`Error`]. Variants carry owned strings so the
//! error can be cloned into error listeners and aggregate bulk failures.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use thiserror::Error;

/// Result type alias for data service operations
pub type Result<T> = std::result::Result<T, Error>;

/// Data service errors.
///
/// # Categories
///
/// | Category | Variants | Recovery |
/// |----------|----------|----------|
/// | Configuration | `Configuration` | fail fast, never retried |
/// | Shape | `Unsupported` | fail fast, never retried |
/// | Call | `Transport`, `Server`, `Content` | error listener disposition |
/// | Lifecycle | `InvalidState`, `BulkAborted` | surfaced to the caller |
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// Malformed or inconsistent endpoint declaration, or a handle/parameter mismatch
    #[error("invalid configuration: {reason}")]
    Configuration {
        /// What was wrong
        reason: String,
    },

    /// Call style does not match the declared endpoint shape
    #[error("unsupported operation: {reason}")]
    Unsupported {
        /// What was attempted
        reason: String,
    },

    /// Content could not be encoded or decoded
    #[error("content error: {reason}")]
    Content {
        /// Marshaling failure detail
        reason: String,
    },

    /// Network failure talking to the server
    #[error("transport error: {reason}")]
    Transport {
        /// Underlying network error
        reason: String,
    },

    /// Server answered with an error status
    #[error("server error {status}: {reason}")]
    Server {
        /// HTTP status code
        status: u16,
        /// Response body or status text
        reason: String,
    },

    /// Operation not allowed in the current lifecycle state
    #[error("invalid state: {reason}")]
    InvalidState {
        /// What was attempted
        reason: String,
    },

    /// A bulk unit of work was aborted; carries the last call failure
    #[error("bulk call aborted: {cause}")]
    BulkAborted {
        /// Failure that caused the abort
        cause: Box<Error>,
    },
}

impl Error {
    /// Create a configuration error
    pub fn configuration(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an unsupported-operation error
    pub fn unsupported(reason: impl Into<String>) -> Self {
        Error::Unsupported {
            reason: reason.into(),
        }
    }

    /// Create a content marshaling error
    pub fn content(reason: impl Into<String>) -> Self {
        Error::Content {
            reason: reason.into(),
        }
    }

    /// Create a transport error
    pub fn transport(reason: impl Into<String>) -> Self {
        Error::Transport {
            reason: reason.into(),
        }
    }

    /// Create an invalid-state error
    pub fn invalid_state(reason: impl Into<String>) -> Self {
        Error::InvalidState {
            reason: reason.into(),
        }
    }

    /// Returns true for errors caused by the caller's setup rather than the call.
    ///
    /// These are never offered to an error listener.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Error::Configuration { .. } | Error::Unsupported { .. })
    }

    /// Returns true for call failures an error listener may retry or skip.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Transport { .. } | Error::Server { .. } | Error::Content { .. }
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::content(e.to_string())
    }
}
