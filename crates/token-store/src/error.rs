//! Error types for token store operations

/// Errors from token store operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("user not found: {0}")]
    NotFound(String),

    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// Result alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;
