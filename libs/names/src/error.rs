//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NameError {
    /// The input string is empty.
    #[error("{kind} cannot be empty")]
    Empty { kind: &'static str },

    /// The name portion is not a valid entity name.
    #[error("invalid {kind} name {actual:?}")]
    InvalidName { kind: &'static str, actual: String },

    /// The numeric suffix is missing or not a number.
    #[error("invalid {kind} id {actual:?}: expected \"<name>/<number>\"")]
    InvalidNumber { kind: &'static str, actual: String },

    /// A tag string did not carry the expected prefix.
    #[error("{actual:?} is not a valid {expected} tag")]
    InvalidTag {
        expected: &'static str,
        actual: String,
    },

    /// A charm URL could not be parsed.
    #[error("invalid charm URL {actual:?}: {reason}")]
    InvalidCharmUrl { actual: String, reason: &'static str },
}

impl NameError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, NameError::Empty { .. })
    }
}
