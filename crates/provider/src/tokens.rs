//! Provider token triple and the refresh-token preservation rule

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The provider's current delegated-access grant.
///
/// `expiry_date` is an absolute instant, never a duration. `refresh_token` is
/// never empty once stored; see `apply_refresh`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderTokenTriple {
    pub access_token: String,
    pub refresh_token: String,
    pub expiry_date: DateTime<Utc>,
}

impl ProviderTokenTriple {
    /// FRESH when the expiry is strictly after `now`.
    pub fn is_fresh_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry_date > now
    }

    /// Merge a refresh response into this triple.
    ///
    /// Providers may omit the refresh token on refresh; an absent or empty one
    /// keeps the previously stored value.
    pub fn apply_refresh(&self, refreshed: RefreshedToken) -> ProviderTokenTriple {
        let refresh_token = match refreshed.refresh_token {
            Some(token) if !token.is_empty() => token,
            _ => self.refresh_token.clone(),
        };
        ProviderTokenTriple {
            access_token: refreshed.access_token,
            refresh_token,
            expiry_date: refreshed.expiry_date,
        }
    }
}

/// Result of a refresh call, before merging with the stored triple.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshedToken {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry_date: DateTime<Utc>,
}

/// Outcome of a successful authorization-code exchange.
#[derive(Debug, Clone)]
pub struct AuthorizedUser {
    /// Stable provider-issued user identifier
    pub id: String,
    pub email: String,
    pub tokens: ProviderTokenTriple,
}
