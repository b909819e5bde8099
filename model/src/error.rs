//! Typed error carried out of every core operation. The HTTP layer (an external collaborator)
//! maps `kind` to a status code; nothing in the core itself knows about HTTP.

use std::fmt;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed input: non-positive amounts, a deadline in the past, an unknown comparator.
    Validation,
    /// Market, order, or item balance absent.
    NotFound,
    /// A ledger subtraction, escrow, or directed fulfillment could not be satisfied.
    Insufficient,
    /// Attempted to mutate another owner's order without the elevated scope to do so.
    Forbidden,
    /// The backing store failed; the underlying error is logged, not exposed.
    Storage,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub kind: ErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: ErrorKind, message: impl fmt::Display) -> Self {
        Self {
            kind,
            message: message.to_string(),
        }
    }

    pub fn validation(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn not_found(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn insufficient(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Insufficient, message)
    }

    pub fn forbidden(message: impl fmt::Display) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::new(ErrorKind::Storage, err)
    }
}
