//! Calendar provider abstraction
//!
//! Defines the `CalendarProvider` trait that decouples the session orchestrator
//! from any particular calendar vendor, plus the value types that cross the
//! adapter/store boundary. The Google implementation lives in `google-auth`;
//! tests substitute scripted fakes.

pub mod event;
pub mod tokens;

pub use event::{Event, EventTime};
pub use tokens::{AuthorizedUser, ProviderTokenTriple, RefreshedToken};

use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Errors from provider operations.
///
/// One variant per adapter operation so the caller can tell which step of
/// the flow failed without inspecting messages.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("authorization code exchange failed: {0}")]
    ExchangeFailed(String),

    #[error("token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("event fetch failed: {0}")]
    FetchFailed(String),
}

/// Result alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;

/// Boxed future returned by `CalendarProvider` methods.
pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Delegated-access operations the gateway needs from a calendar provider.
///
/// Implementations are stateless per call: the token triple is passed in and
/// nothing is cached between calls. Uses `Pin<Box<dyn Future>>` return types
/// for dyn-compatibility (`Arc<dyn CalendarProvider>`).
pub trait CalendarProvider: Send + Sync {
    /// Identifier for logging (e.g. "google")
    fn id(&self) -> &str;

    /// Consent URL requesting offline access with a forced consent prompt.
    ///
    /// Pure and deterministic for a given configuration and scope list.
    fn build_authorization_url(&self, scopes: &[String]) -> String;

    /// Exchange an authorization code for tokens and the provider identity.
    ///
    /// Not idempotent: providers invalidate a code on first use, so a timeout
    /// here is ambiguous and must be treated as a failure.
    fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, AuthorizedUser>;

    /// Obtain a new access token using the triple's refresh token.
    ///
    /// The returned `RefreshedToken` may omit the refresh token; merge it with
    /// `ProviderTokenTriple::apply_refresh` before persisting.
    fn refresh_access_token<'a>(
        &'a self,
        tokens: &'a ProviderTokenTriple,
    ) -> ProviderFuture<'a, RefreshedToken>;

    /// List events starting in `[start, end)`, ascending by start time.
    fn list_events_in_range<'a>(
        &'a self,
        tokens: &'a ProviderTokenTriple,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProviderFuture<'a, Vec<Event>>;
}
