//! `CalendarProvider` implementation for Google
//!
//! Composes the consent, token, userinfo and events modules into the adapter
//! contract and maps Google errors onto the three provider failure kinds.

use chrono::{DateTime, Utc};
use common::Secret;
use provider::{
    AuthorizedUser, CalendarProvider, Event, ProviderError, ProviderFuture, ProviderTokenTriple,
    RefreshedToken,
};
use tracing::{debug, info, warn};

use crate::constants::{
    AUTHORIZE_ENDPOINT, CALENDAR_API_BASE, PRIMARY_CALENDAR, TOKEN_ENDPOINT, USERINFO_ENDPOINT,
};
use crate::error::Error;
use crate::token::ClientCredentials;
use crate::{consent, events, token, userinfo};

/// OAuth client registration.
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: Secret<String>,
    pub redirect_url: String,
}

/// Endpoint base URLs, overridable for tests against a local server.
#[derive(Debug, Clone)]
pub struct Endpoints {
    pub authorize: String,
    pub token: String,
    pub userinfo: String,
    pub calendar_api: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            authorize: AUTHORIZE_ENDPOINT.to_string(),
            token: TOKEN_ENDPOINT.to_string(),
            userinfo: USERINFO_ENDPOINT.to_string(),
            calendar_api: CALENDAR_API_BASE.to_string(),
        }
    }
}

/// Google calendar provider.
///
/// Holds no token state; each call works only with the triple passed in.
pub struct GoogleProvider {
    config: GoogleOAuthConfig,
    endpoints: Endpoints,
    http_client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: GoogleOAuthConfig, http_client: reqwest::Client) -> Self {
        Self::with_endpoints(config, Endpoints::default(), http_client)
    }

    pub fn with_endpoints(
        config: GoogleOAuthConfig,
        endpoints: Endpoints,
        http_client: reqwest::Client,
    ) -> Self {
        Self {
            config,
            endpoints,
            http_client,
        }
    }

    fn credentials(&self) -> ClientCredentials<'_> {
        ClientCredentials {
            client_id: &self.config.client_id,
            client_secret: self.config.client_secret.expose(),
        }
    }

    async fn exchange(&self, code: &str) -> Result<AuthorizedUser, Error> {
        let received_at = Utc::now();
        let response = token::exchange_code(
            &self.http_client,
            &self.endpoints.token,
            self.credentials(),
            &self.config.redirect_url,
            code,
        )
        .await?;

        let expiry_date = response.expiry_from(received_at)?;
        let refresh_token = match response.refresh_token {
            Some(t) if !t.is_empty() => t,
            _ => {
                return Err(Error::InvalidResponse(
                    "token response has no refresh token despite forced consent".into(),
                ));
            }
        };

        let info = userinfo::fetch_user_info(
            &self.http_client,
            &self.endpoints.userinfo,
            &response.access_token,
        )
        .await?;

        Ok(AuthorizedUser {
            id: info.id,
            email: info.email,
            tokens: ProviderTokenTriple {
                access_token: response.access_token,
                refresh_token,
                expiry_date,
            },
        })
    }

    async fn refresh(&self, tokens: &ProviderTokenTriple) -> Result<RefreshedToken, Error> {
        let received_at = Utc::now();
        let response = token::refresh_token(
            &self.http_client,
            &self.endpoints.token,
            self.credentials(),
            &tokens.refresh_token,
        )
        .await?;

        debug!(
            rotated = response.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(RefreshedToken {
            expiry_date: response.expiry_from(received_at)?,
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })
    }
}

impl CalendarProvider for GoogleProvider {
    fn id(&self) -> &str {
        "google"
    }

    fn build_authorization_url(&self, scopes: &[String]) -> String {
        consent::build_authorization_url(
            &self.endpoints.authorize,
            &self.config.client_id,
            &self.config.redirect_url,
            scopes,
        )
    }

    fn exchange_code<'a>(&'a self, code: &'a str) -> ProviderFuture<'a, AuthorizedUser> {
        Box::pin(async move {
            let user = self.exchange(code).await.map_err(|e| {
                warn!(error = %e, "authorization code exchange failed");
                ProviderError::ExchangeFailed(e.to_string())
            })?;
            info!(user_id = %user.id, "authorization code exchanged");
            Ok(user)
        })
    }

    fn refresh_access_token<'a>(
        &'a self,
        tokens: &'a ProviderTokenTriple,
    ) -> ProviderFuture<'a, RefreshedToken> {
        Box::pin(async move {
            self.refresh(tokens).await.map_err(|e| {
                match &e {
                    Error::InvalidGrant(_) => warn!(error = %e, "refresh token revoked"),
                    _ => warn!(error = %e, "token refresh failed"),
                }
                ProviderError::RefreshFailed(e.to_string())
            })
        })
    }

    fn list_events_in_range<'a>(
        &'a self,
        tokens: &'a ProviderTokenTriple,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ProviderFuture<'a, Vec<Event>> {
        Box::pin(async move {
            events::list_events(
                &self.http_client,
                &self.endpoints.calendar_api,
                &tokens.access_token,
                PRIMARY_CALENDAR,
                start,
                end,
            )
            .await
            .map_err(|e| {
                warn!(error = %e, "event fetch failed");
                ProviderError::FetchFailed(e.to_string())
            })
        })
    }
}
