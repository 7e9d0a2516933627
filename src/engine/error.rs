use ulid::Ulid;

use crate::model::Ms;
use crate::store::StoreError;

/// Error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    Conflict,
    NotFound,
    IllegalTransition,
    Storage,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::IllegalTransition => "ILLEGAL_TRANSITION",
            ErrorKind::Storage => "STORAGE",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("end time must be after start time")]
    InvalidSpan,
    #[error("booking duration must be between {min} and {max} minutes, got {minutes}")]
    DurationOutOfRange { minutes: Ms, min: Ms, max: Ms },
    #[error("invalid request: {0}")]
    Invalid(&'static str),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error("time slot conflicts with existing booking {0} (including buffer)")]
    Conflict(Ulid),
    #[error("booking not found: {0}")]
    NotFound(Ulid),
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Ulid),
    #[error("cannot cancel past booking {0}")]
    AlreadyPast(Ulid),
    #[error("storage error: {0}")]
    Store(StoreError),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::InvalidSpan
            | EngineError::DurationOutOfRange { .. }
            | EngineError::Invalid(_)
            | EngineError::LimitExceeded(_) => ErrorKind::Validation,
            EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::AlreadyCancelled(_) | EngineError::AlreadyPast(_) => {
                ErrorKind::IllegalTransition
            }
            EngineError::Store(_) => ErrorKind::Storage,
        }
    }

    /// Stable wire code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::AlreadyCancelled(_) => "ALREADY_CANCELLED",
            EngineError::AlreadyPast(_) => "PAST",
            other => other.kind().as_str(),
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::ExclusionViolation(id) => EngineError::Conflict(id),
            StoreError::NotFound(id) => EngineError::NotFound(id),
            other => EngineError::Store(other),
        }
    }
}
