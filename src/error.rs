/// Error types for Tab Collections
///
/// Hard failures only. A tab that matches nothing, matches ambiguously or
/// would duplicate an existing URL is a per-item `Rejection`, not an error.

/// A filter line that cannot be compiled into a pattern.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("Invalid filter {filter:?}: {message}")]
pub struct FilterError {
    pub filter: String,
    pub message: String,
}

/// Failures reported by a store adapter.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Not found in store: {0}")]
    NotFound(String),
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    InvalidFilter(#[from] FilterError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// An operation that needs a persisted id was called on a transient entity.
    #[error("{0} has no id; it must be saved before this operation")]
    MissingId(&'static str),

    #[error("Import failed: {0}")]
    Import(String),

    #[error("Setting {name:?} rejected value: {reason}")]
    Setting { name: String, reason: String },
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Import(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
