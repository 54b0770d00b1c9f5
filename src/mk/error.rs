//! Error handling for the multi-key evaluator surface.
//!
//! There is exactly one error class in this core: a fatal precondition
//! violation (mismatched participant lists, degree or domain mismatches,
//! incompatible scales). These are programmer errors; callers are expected
//! to validate inputs rather than catch and retry, and no operation
//! produces a partial result after reporting one.

use std::fmt;

/// Fatal precondition violation.
#[derive(Debug)]
pub struct MkError(pub String);

impl fmt::Display for MkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for MkError {}

impl MkError {
    /// Create a new error with the given message.
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

impl From<&'static str> for MkError {
    fn from(msg: &'static str) -> Self {
        Self(msg.to_string())
    }
}

/// Result type for evaluator operations.
pub type Result<T> = std::result::Result<T, MkError>;

/// Create an [`MkError`] with format-string support.
macro_rules! mk_err {
    ($($arg:tt)*) => {
        $crate::mk::error::MkError(format!($($arg)*))
    };
}

pub(crate) use mk_err;
