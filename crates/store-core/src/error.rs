use thiserror::Error;

/// The error kind taxonomy. Every fallible operation in the store returns
/// one of these (or a type convertible into it).
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown command type: {0}")]
    UnknownType(String),

    #[error("bad payload: {0}")]
    BadPayload(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("server not ready")]
    NotReady,

    #[error("request cancelled")]
    Cancelled,

    #[error("remote failure: {0}")]
    RemoteFailure(String),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl StoreError {
    /// The frozen wire error code for this kind, used in `Reply::Error`.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotConnected => "not_connected",
            StoreError::Io(_) => "io_error",
            StoreError::Malformed(_) => "malformed",
            StoreError::UnknownType(_) => "unknown_type",
            StoreError::BadPayload(_) => "bad_payload",
            StoreError::NotFound(_) => "not_found",
            StoreError::AlreadyExists(_) => "already_exists",
            StoreError::NotReady => "not_ready",
            StoreError::Cancelled => "cancelled",
            StoreError::RemoteFailure(_) => "remote_failure",
            StoreError::InvariantViolation(_) => "invariant_violation",
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
