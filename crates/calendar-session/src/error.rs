//! Error taxonomy for the authorization flow

/// Errors surfaced to callers of the orchestrator.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid session credential: {0}")]
    InvalidCredential(String),

    #[error("session credential expired")]
    ExpiredCredential,

    #[error("user not found: {0}")]
    UserNotFound(String),

    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("event fetch failed: {0}")]
    FetchFailed(String),

    #[error("persistence failed: {0}")]
    PersistenceFailed(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result alias for orchestrator operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Fieldless discriminant of `Error` for reporting and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidCredential,
    ExpiredCredential,
    UserNotFound,
    ExchangeFailed,
    RefreshFailed,
    FetchFailed,
    PersistenceFailed,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidCredential => "invalid_credential",
            ErrorKind::ExpiredCredential => "expired_credential",
            ErrorKind::UserNotFound => "user_not_found",
            ErrorKind::ExchangeFailed => "exchange_failed",
            ErrorKind::RefreshFailed => "refresh_failed",
            ErrorKind::FetchFailed => "fetch_failed",
            ErrorKind::PersistenceFailed => "persistence_failed",
            ErrorKind::Internal => "internal",
        }
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidCredential(_) => ErrorKind::InvalidCredential,
            Error::ExpiredCredential => ErrorKind::ExpiredCredential,
            Error::UserNotFound(_) => ErrorKind::UserNotFound,
            Error::ExchangeFailed(_) => ErrorKind::ExchangeFailed,
            Error::RefreshFailed(_) => ErrorKind::RefreshFailed,
            Error::FetchFailed(_) => ErrorKind::FetchFailed,
            Error::PersistenceFailed(_) => ErrorKind::PersistenceFailed,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Whether the client must sign in again rather than retry later.
    pub fn requires_reauthorization(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::InvalidCredential
                | ErrorKind::ExpiredCredential
                | ErrorKind::UserNotFound
                | ErrorKind::ExchangeFailed
                | ErrorKind::RefreshFailed
        )
    }
}

impl From<provider::ProviderError> for Error {
    fn from(err: provider::ProviderError) -> Self {
        match err {
            provider::ProviderError::ExchangeFailed(msg) => Error::ExchangeFailed(msg),
            provider::ProviderError::RefreshFailed(msg) => Error::RefreshFailed(msg),
            provider::ProviderError::FetchFailed(msg) => Error::FetchFailed(msg),
        }
    }
}

impl From<token_store::Error> for Error {
    fn from(err: token_store::Error) -> Self {
        match err {
            token_store::Error::NotFound(id) => Error::UserNotFound(id),
            token_store::Error::Persistence(msg) => Error::PersistenceFailed(msg),
        }
    }
}
