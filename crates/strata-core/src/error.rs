//! Error types for strata-core

use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Type error at `{path}`: expected {expected}, got {got}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("Field not found: {0}")]
    MissingField(String),

    #[error("Not a container at `{path}`: found {found}")]
    NotAContainer { path: String, found: &'static str },

    #[error("{0}")]
    Custom(String),
}

impl Error {
    /// Build a free-form error, typically from inside a reducer or derive function
    pub fn custom(message: impl Into<String>) -> Self {
        Error::Custom(message.into())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
