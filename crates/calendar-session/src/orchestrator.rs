//! Authorization flow and token freshness state machine
//!
//! Four entry points, each strictly sequential:
//! - `authorization_url`: consent URL for the configured scopes
//! - `complete_authorization`: code → tokens → store → session credential
//! - `resolve_valid_tokens`: stored triple, refreshed and persisted if expired
//! - `fetch_today_events`: credential → user → valid tokens → today's events
//!
//! Nothing here retries. Concurrent refreshes for the same user are not
//! serialized; both results are valid and the store keeps the last write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use provider::{CalendarProvider, Event, ProviderTokenTriple};
use token_store::TokenStore;
use tracing::{debug, info, instrument, warn};

use crate::codec::SessionCodec;
use crate::error::Result;
use crate::window::local_day_window;

/// Coordinates the codec, the token store and the provider adapter.
pub struct AuthOrchestrator {
    codec: SessionCodec,
    store: Arc<dyn TokenStore>,
    provider: Arc<dyn CalendarProvider>,
    scopes: Vec<String>,
}

impl AuthOrchestrator {
    pub fn new(
        codec: SessionCodec,
        store: Arc<dyn TokenStore>,
        provider: Arc<dyn CalendarProvider>,
        scopes: Vec<String>,
    ) -> Self {
        Self {
            codec,
            store,
            provider,
            scopes,
        }
    }

    /// Consent URL to redirect the user to.
    pub fn authorization_url(&self) -> String {
        self.provider.build_authorization_url(&self.scopes)
    }

    /// Exchange `code`, persist the identity, and issue a session credential.
    ///
    /// The session credential is the only output; provider tokens never leave
    /// this call. Re-running for an already known user replaces its triple.
    #[instrument(skip_all, fields(provider = self.provider.id()))]
    pub async fn complete_authorization(&self, code: &str) -> Result<String> {
        let user = self.provider.exchange_code(code).await?;
        self.store
            .upsert(&user.id, &user.email, user.tokens)
            .await?;
        let credential = self.codec.issue(&user.id)?;
        info!(user_id = %user.id, email = %mask_email(&user.email), "authorization completed");
        Ok(credential)
    }

    /// User id bound to a session credential.
    pub fn session_user(&self, credential: &str) -> Result<String> {
        self.codec.verify(credential)
    }

    /// Stored triple for `user_id`, refreshed first if it has expired.
    pub async fn resolve_valid_tokens(&self, user_id: &str) -> Result<ProviderTokenTriple> {
        self.resolve_valid_tokens_at(user_id, Utc::now()).await
    }

    async fn resolve_valid_tokens_at(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<ProviderTokenTriple> {
        let stored = self.store.get(user_id).await?;

        if stored.is_fresh_at(now) {
            debug!(user_id, "provider token fresh");
            return Ok(stored);
        }

        debug!(user_id, expiry = %stored.expiry_date, "provider token expired, refreshing");
        let refreshed = match self.provider.refresh_access_token(&stored).await {
            Ok(refreshed) => refreshed,
            Err(e) => {
                metrics::counter!("gateway_token_refresh_total", "outcome" => "failure")
                    .increment(1);
                warn!(user_id, error = %e, "refresh rejected, re-authorization required");
                return Err(e.into());
            }
        };

        let updated = stored.apply_refresh(refreshed);
        self.store.update_tokens(user_id, updated.clone()).await?;
        metrics::counter!("gateway_token_refresh_total", "outcome" => "success").increment(1);
        info!(user_id, expiry = %updated.expiry_date, "provider token refreshed");
        Ok(updated)
    }

    /// Events of the server's local calendar day for the session's user.
    pub async fn fetch_today_events(&self, credential: &str) -> Result<Vec<Event>> {
        let (start, end) = local_day_window();
        self.fetch_events_in_range(credential, start, end).await
    }

    /// Events starting in `[start, end)` for the session's user, as returned
    /// by the provider.
    pub async fn fetch_events_in_range(
        &self,
        credential: &str,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        let user_id = self.codec.verify(credential)?;
        let tokens = self.resolve_valid_tokens(&user_id).await?;
        let events = self
            .provider
            .list_events_in_range(&tokens, start, end)
            .await?;
        debug!(user_id, count = events.len(), "events fetched");
        Ok(events)
    }
}

/// `alice@example.com` → `a***@example.com`
fn mask_email(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let first = local.chars().next().map(String::from).unwrap_or_default();
            format!("{first}***@{domain}")
        }
        None => String::from("***"),
    }
}
