use crate::query::{path::ResolveError, validate::ValidateError};
use std::fmt;
use thiserror::Error as ThisError;

///
/// CompileError
///
/// Request-level failure raised while compiling a query.
/// No SQL is ever produced alongside an error; callers should surface these
/// as bad requests rather than retrying.
///

#[derive(Debug, ThisError)]
pub enum CompileError {
    #[error("{0}")]
    Validate(#[from] ValidateError),

    #[error("{0}")]
    Resolve(#[from] ResolveError),
}

impl CompileError {
    /// Stable classification for this error.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::Validate(_) => ErrorClass::Validation,
            Self::Resolve(ResolveError::UnsupportedOperand { .. }) => ErrorClass::Unsupported,
            Self::Resolve(_) => ErrorClass::Validation,
        }
    }

    /// Compile errors depend only on the request, so retrying never helps.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        false
    }

    /// Short tag used when reporting rejected compiles.
    #[must_use]
    pub const fn reason(&self) -> &'static str {
        match self {
            Self::Validate(err) => err.reason(),
            Self::Resolve(err) => err.reason(),
        }
    }
}

///
/// ErrorClass
/// Internal error taxonomy for compile-time classification.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Validation,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validation => "validation",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}
