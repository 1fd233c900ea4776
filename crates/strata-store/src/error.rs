//! Error types for strata-store
//!
//! Schema problems are detected once, when the store is created. Every other
//! variant is returned from a single runtime call and leaves the store usable.

use strata_core::Path;
use thiserror::Error;

/// Boxed error produced by thunk bodies
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type for strata-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in strata-store
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed model descriptor; store creation fails
    #[error("schema error at `{path}`: {reason}")]
    Schema { path: Path, reason: String },

    /// No action registered at the path
    #[error("unknown action `{0}`")]
    UnknownAction(Path),

    /// No thunk registered at the path
    #[error("unknown thunk `{0}`")]
    UnknownThunk(Path),

    /// No computed value registered at the path
    #[error("unknown computed value `{0}`")]
    UnknownComputed(Path),

    /// Dispatch called from inside a running reducer
    #[error("cannot dispatch `{0}` from inside a reducer")]
    Reentrancy(Path),

    /// A reducer failed; nothing was committed
    #[error("reducer `{path}` failed: {source}")]
    Reducer {
        path: Path,
        #[source]
        source: strata_core::Error,
    },

    /// A derive function failed; nothing was cached
    #[error("computed `{path}` failed: {source}")]
    Computed {
        path: Path,
        #[source]
        source: strata_core::Error,
    },

    /// A thunk body returned an error
    ///
    /// `source` is the error object the thunk produced, untouched.
    #[error("thunk `{path}` failed: {source}")]
    ThunkExecution {
        path: Path,
        #[source]
        source: BoxError,
    },

    /// Store configuration could not be parsed
    #[error("invalid store config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] strata_core::Error),
}

impl Error {
    /// Create a Schema error
    pub fn schema(path: Path, reason: impl Into<String>) -> Self {
        Error::Schema {
            path,
            reason: reason.into(),
        }
    }

    /// The error a thunk body produced, if this is a ThunkExecution error
    pub fn thunk_source(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            Error::ThunkExecution { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }

    /// Take back the error a thunk body produced
    pub fn into_thunk_source(self) -> std::result::Result<BoxError, Self> {
        match self {
            Error::ThunkExecution { source, .. } => Ok(source),
            other => Err(other),
        }
    }
}

// Compile-time check that Error is Send + Sync for thread-safe error propagation.
// This function is never called but will fail to compile if the bound is not satisfied.
fn _assert_error_send_sync<T: Send + Sync>() {}
fn _error_is_send_sync() {
    _assert_error_send_sync::<Error>();
}
