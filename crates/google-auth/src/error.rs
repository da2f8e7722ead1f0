//! Error types for Google OAuth and Calendar operations

/// Errors from Google API calls.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("token exchange failed: {0}")]
    TokenExchange(String),

    /// The refresh token or code was rejected as revoked, expired or unknown.
    #[error("grant rejected: {0}")]
    InvalidGrant(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("API error: {0}")]
    Api(String),
}

/// Result alias for Google operations.
pub type Result<T> = std::result::Result<T, Error>;
