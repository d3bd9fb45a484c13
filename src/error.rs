//! Error types shared by the cache, the request pipeline and the budget services.

use serde::Serialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Result type for every public operation in the crate.
///
/// `Ok` carries the value, `Err` carries an [`Error`]; exactly one of the two
/// exists per outcome.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad category of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    /// Input rejected before any work was done.
    ///
    /// Raised by the validation behavior and by cache argument checks
    /// (empty key, missing value).
    Validation,

    /// The addressed item does not exist.
    ///
    /// Returned by `refresh` on an absent cache key and by budget services
    /// when a row is missing.
    NotFound,

    /// The operation conflicts with existing state (duplicate name, etc).
    Conflict,

    /// Infrastructure failure: cache store, database, file system, factory.
    ///
    /// **Recovery:** The original message is kept in `message`; retry or
    /// surface it to the user.
    System,

    /// The request's cancellation signal fired.
    Cancellation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Validation => write!(f, "Validation"),
            ErrorKind::NotFound => write!(f, "NotFound"),
            ErrorKind::Conflict => write!(f, "Conflict"),
            ErrorKind::System => write!(f, "System"),
            ErrorKind::Cancellation => write!(f, "Cancellation"),
        }
    }
}

/// Well-known error codes.
pub mod codes {
    pub const VALIDATION_FAILED: &str = "VALIDATION_FAILED";
    pub const INVALID_KEY: &str = "INVALID_KEY";
    pub const INVALID_VALUE: &str = "INVALID_VALUE";
    pub const INVALID_PATTERN: &str = "INVALID_PATTERN";
    pub const KEY_NOT_FOUND: &str = "KEY_NOT_FOUND";
    pub const CACHE_ERROR: &str = "CACHE_ERROR";
    pub const FACTORY_FAILED: &str = "FACTORY_FAILED";
    pub const HANDLER_NOT_FOUND: &str = "HANDLER_NOT_FOUND";
    pub const OPERATION_CANCELLED: &str = "OPERATION_CANCELLED";
    pub const DATABASE_ERROR: &str = "DATABASE_ERROR";
    pub const IO_ERROR: &str = "IO_ERROR";
    pub const SERIALIZATION_ERROR: &str = "SERIALIZATION_ERROR";
    pub const CONFIG_ERROR: &str = "CONFIG_ERROR";
    pub const NOT_FOUND: &str = "NOT_FOUND";
    pub const CONFLICT: &str = "CONFLICT";
    pub const AMOUNT_OVERFLOW: &str = "AMOUNT_OVERFLOW";
}

/// A failure outcome.
///
/// Immutable once built: the `with_*` methods consume the value and return a
/// new one.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Error {
    kind: ErrorKind,
    code: String,
    message: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    metadata: BTreeMap<String, Value>,
}

impl Error {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Error {
            kind,
            code: code.into(),
            message: message.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn validation(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, code, message)
    }

    pub fn not_found(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, code, message)
    }

    pub fn conflict(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, code, message)
    }

    pub fn system(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::System, code, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(
            ErrorKind::Cancellation,
            codes::OPERATION_CANCELLED,
            message,
        )
    }

    /// Attach one metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn metadata(&self) -> &BTreeMap<String, Value> {
        &self.metadata
    }

    pub fn is_validation(&self) -> bool {
        self.kind == ErrorKind::Validation
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind == ErrorKind::Cancellation
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error [{}]: {}", self.kind, self.code, self.message)
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Error::system(codes::IO_ERROR, e.to_string())
        } else {
            Error::system(codes::SERIALIZATION_ERROR, e.to_string())
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::system(codes::IO_ERROR, e.to_string())
    }
}

impl From<regex::Error> for Error {
    fn from(e: regex::Error) -> Self {
        Error::validation(codes::INVALID_PATTERN, e.to_string())
    }
}

#[cfg(feature = "sqlite")]
impl From<rusqlite::Error> for Error {
    fn from(e: rusqlite::Error) -> Self {
        match e {
            rusqlite::Error::QueryReturnedNoRows => {
                Error::not_found(codes::NOT_FOUND, "Row not found")
            }
            rusqlite::Error::SqliteFailure(ref failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Error::conflict(codes::CONFLICT, format!("Constraint violation: {}", e))
            }
            other => Error::system(codes::DATABASE_ERROR, format!("SQLite error: {}", other)),
        }
    }
}

#[cfg(feature = "sqlite")]
impl From<tokio_rusqlite::Error> for Error {
    fn from(e: tokio_rusqlite::Error) -> Self {
        match e {
            tokio_rusqlite::Error::Rusqlite(inner) => inner.into(),
            // Errors raised inside a connection closure travel boxed.
            tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<Error>() {
                Ok(inner) => *inner,
                Err(other) => Error::system(codes::DATABASE_ERROR, other.to_string()),
            },
            other => Error::system(codes::DATABASE_ERROR, format!("SQLite error: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::validation("INVALID_DATE", "Start date must be before end date");
        assert_eq!(
            err.to_string(),
            "Validation error [INVALID_DATE]: Start date must be before end date"
        );
    }

    #[test]
    fn test_error_metadata() {
        let err = Error::not_found(codes::KEY_NOT_FOUND, "missing").with_metadata("key", "a");
        assert!(err.is_not_found());
        assert_eq!(err.metadata().get("key"), Some(&Value::from("a")));
    }

    #[test]
    fn test_error_from_io() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::Other, "disk").into();
        assert_eq!(err.kind(), ErrorKind::System);
        assert_eq!(err.code(), codes::IO_ERROR);
    }

    #[test]
    fn test_cancelled_error() {
        let err = Error::cancelled("stop");
        assert!(err.is_cancelled());
        assert_eq!(err.code(), codes::OPERATION_CANCELLED);
    }
}
