use std::fmt;

/// Errors surfaced by runner selection.
///
/// Every failure carries a human-readable reason; no panics or exceptional
/// control flow escape the selector.
#[derive(Debug)]
pub enum Error {
    /// Malformed input: bad projection, bad hint, tailable misuse, no viable plan.
    BadValue(String),
    /// The operation is not valid against the target collection.
    IllegalOperation(String),
    /// An internal invariant was violated.
    Internal(String),
}

impl Error {
    pub fn reason(&self) -> &str {
        match self {
            Error::BadValue(reason)
            | Error::IllegalOperation(reason)
            | Error::Internal(reason) => reason,
        }
    }

    pub fn is_bad_value(&self) -> bool {
        matches!(self, Error::BadValue(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::BadValue(reason)
            | Error::IllegalOperation(reason)
            | Error::Internal(reason) => write!(f, "{}", reason),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;
