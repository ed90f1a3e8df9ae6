use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FirestoreErrorCode {
    /// A value could not be mapped to or from the document representation.
    UnsupportedValue,
    InvalidArgument,
    Internal,
    NotFound,
    AlreadyExists,
    FailedPrecondition,
    Aborted,
    Cancelled,
    PermissionDenied,
    Unauthenticated,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Unknown,
}

impl FirestoreErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FirestoreErrorCode::UnsupportedValue => "firestore/unsupported-value",
            FirestoreErrorCode::InvalidArgument => "firestore/invalid-argument",
            FirestoreErrorCode::Internal => "firestore/internal",
            FirestoreErrorCode::NotFound => "firestore/not-found",
            FirestoreErrorCode::AlreadyExists => "firestore/already-exists",
            FirestoreErrorCode::FailedPrecondition => "firestore/failed-precondition",
            FirestoreErrorCode::Aborted => "firestore/aborted",
            FirestoreErrorCode::Cancelled => "firestore/cancelled",
            FirestoreErrorCode::PermissionDenied => "firestore/permission-denied",
            FirestoreErrorCode::Unauthenticated => "firestore/unauthenticated",
            FirestoreErrorCode::Unavailable => "firestore/unavailable",
            FirestoreErrorCode::DeadlineExceeded => "firestore/deadline-exceeded",
            FirestoreErrorCode::ResourceExhausted => "firestore/resource-exhausted",
            FirestoreErrorCode::Unknown => "firestore/unknown",
        }
    }
}

#[derive(Clone, Debug)]
pub struct FirestoreError {
    pub code: FirestoreErrorCode,
    message: String,
}

impl FirestoreError {
    pub fn new(code: FirestoreErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code.as_str()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Errors raised by the remote collaborator rather than by local encoding.
    pub fn is_backend_error(&self) -> bool {
        self.code != FirestoreErrorCode::UnsupportedValue
    }

    /// Backend rejections caused by the current state of the target document
    /// (missing document on update, existing document on create, stale read
    /// version in a transaction).
    pub fn is_precondition_failure(&self) -> bool {
        matches!(
            self.code,
            FirestoreErrorCode::NotFound
                | FirestoreErrorCode::AlreadyExists
                | FirestoreErrorCode::FailedPrecondition
        )
    }
}

impl Display for FirestoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code_str())
    }
}

impl Error for FirestoreError {}

impl serde::ser::Error for FirestoreError {
    fn custom<T: Display>(msg: T) -> Self {
        unsupported_value(msg.to_string())
    }
}

impl serde::de::Error for FirestoreError {
    fn custom<T: Display>(msg: T) -> Self {
        unsupported_value(msg.to_string())
    }
}

pub type FirestoreResult<T> = Result<T, FirestoreError>;

pub fn unsupported_value(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::UnsupportedValue, message)
}

pub fn invalid_argument(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::InvalidArgument, message)
}

pub fn internal_error(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Internal, message)
}

pub fn not_found(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::NotFound, message)
}

pub fn already_exists(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::AlreadyExists, message)
}

pub fn failed_precondition(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::FailedPrecondition, message)
}

pub fn aborted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Aborted, message)
}

pub fn cancelled(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Cancelled, message)
}

pub fn permission_denied(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::PermissionDenied, message)
}

pub fn unavailable(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::Unavailable, message)
}

pub fn resource_exhausted(message: impl Into<String>) -> FirestoreError {
    FirestoreError::new(FirestoreErrorCode::ResourceExhausted, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_codec_errors_as_local() {
        let err = unsupported_value("Unsupported encode type");
        assert!(!err.is_backend_error());
        assert!(!err.is_precondition_failure());
        assert_eq!(err.code_str(), "firestore/unsupported-value");
    }

    #[test]
    fn precondition_failures_are_backend_errors() {
        for err in [
            not_found("missing"),
            already_exists("taken"),
            failed_precondition("stale"),
        ] {
            assert!(err.is_backend_error());
            assert!(err.is_precondition_failure());
        }
        assert!(!aborted("contention").is_precondition_failure());
    }

    #[test]
    fn serde_custom_errors_map_to_unsupported_value() {
        let err = <FirestoreError as serde::de::Error>::custom("invalid type: string");
        assert_eq!(err.code, FirestoreErrorCode::UnsupportedValue);
        assert_eq!(err.message(), "invalid type: string");
    }
}
