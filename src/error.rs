//! Crate-wide error types.

use thiserror::Error;

/// Result type alias using rosterguard-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// The sub-kind of a transient error, mirroring the Retry Strategy's `RetryReason`
/// for the reasons that originate from I/O rather than low confidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransientReason {
    ApiError,
    Timeout,
    RateLimit,
}

/// Errors that can occur during roster validation.
///
/// Semantic failures (missing field, bad LLM JSON, unresolved header) are
/// deliberately absent here: they never raise, they become a `Finding` or a
/// warning in the relevant component's output.
#[derive(Error, Debug)]
pub enum Error {
    /// The uploaded bytes could not be decoded, no header row was found, or the
    /// format/size was rejected. Returned at the boundary; the Agent never runs.
    #[error("input error: {0}")]
    Input(String),

    /// LLM timeout, rate limit, or transport fault. Carries the retry reason so
    /// the caller can feed it to the Retry Strategy.
    #[error("transient error ({reason:?}): {message}")]
    Transient {
        reason: TransientReason,
        message: String,
    },

    /// Impossible configuration discovered at construction time: duplicate tool
    /// registration, reference to an unknown tool. Not recoverable at request time.
    #[error("logical error: {0}")]
    Logical(String),

    /// The caller's cancellation token fired.
    #[error("cancelled")]
    Cancelled,

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Case store / knowledge base persistence failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Internal invariant violation.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input(message.into())
    }

    pub fn transient(reason: TransientReason, message: impl Into<String>) -> Self {
        Self::Transient { reason, message: message.into() }
    }

    pub fn logical(message: impl Into<String>) -> Self {
        Self::Logical(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }
}
