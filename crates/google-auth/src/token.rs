//! OAuth token exchange and refresh
//!
//! Handles the two token endpoint interactions:
//! 1. Authorization code exchange (completing the consent flow)
//! 2. Token refresh (request-time, when the stored access token has expired)
//!
//! Both operations POST a form to the token endpoint with different grant types.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Response from the token endpoint for both exchange and refresh.
///
/// `expires_in` is a delta in seconds from the response time. Google omits
/// `refresh_token` on most refresh responses.
#[derive(Debug, Deserialize, Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Seconds until the access token expires (delta, not absolute)
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Absolute expiry instant for a response received at `received_at`.
    ///
    /// An `expires_in` that does not fit a `DateTime` is an invalid response.
    pub fn expiry_from(&self, received_at: DateTime<Utc>) -> Result<DateTime<Utc>> {
        Duration::try_seconds(self.expires_in)
            .and_then(|delta| received_at.checked_add_signed(delta))
            .ok_or_else(|| {
                Error::InvalidResponse(format!("expires_in out of range: {}", self.expires_in))
            })
    }
}

/// Client credentials sent with every token endpoint request.
#[derive(Debug, Clone, Copy)]
pub struct ClientCredentials<'a> {
    pub client_id: &'a str,
    pub client_secret: &'a str,
}

/// Exchange an authorization code for tokens.
///
/// The `redirect_url` must match the one used to build the consent URL.
pub async fn exchange_code(
    client: &reqwest::Client,
    token_endpoint: &str,
    credentials: ClientCredentials<'_>,
    redirect_url: &str,
    code: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", credentials.client_id),
            ("client_secret", credentials.client_secret),
            ("redirect_uri", redirect_url),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));
        if is_invalid_grant(status, &body) {
            return Err(Error::InvalidGrant(format!(
                "authorization code rejected ({status}): {body}"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid token response: {e}")))
}

/// Refresh an access token using a refresh token.
pub async fn refresh_token(
    client: &reqwest::Client,
    token_endpoint: &str,
    credentials: ClientCredentials<'_>,
    refresh: &str,
) -> Result<TokenResponse> {
    let response = client
        .post(token_endpoint)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", credentials.client_id),
            ("client_secret", credentials.client_secret),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| String::from("<no body>"));

        if is_invalid_grant(status, &body) {
            return Err(Error::InvalidGrant(format!(
                "refresh token rejected ({status}): {body}"
            )));
        }

        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<TokenResponse>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid refresh response: {e}")))
}

/// Google signals revoked or expired grants with `invalid_grant` (usually 400);
/// 401/403 mean the grant or client is no longer usable.
fn is_invalid_grant(status: reqwest::StatusCode, body: &str) -> bool {
    matches!(status.as_u16(), 401 | 403) || (status.as_u16() == 400 && body.contains("invalid_grant"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;

    const CREDS: ClientCredentials<'static> = ClientCredentials {
        client_id: "cid",
        client_secret: "csecret",
    };

    /// Serve a fixed status and body from `/token` on an ephemeral port.
    async fn token_server(status: StatusCode, body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route(
            "/token",
            post(move || async move {
                (
                    status,
                    [(axum::http::header::CONTENT_TYPE, "application/json")],
                    body,
                )
            }),
        );
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    #[test]
    fn token_response_without_refresh_token_deserializes() {
        let json = r#"{"access_token":"A2","expires_in":3599,"scope":"x","token_type":"Bearer"}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        assert_eq!(token.access_token, "A2");
        assert!(token.refresh_token.is_none());
        assert_eq!(token.expires_in, 3599);
    }

    #[test]
    fn expiry_is_absolute() {
        let token = TokenResponse {
            access_token: "A1".into(),
            refresh_token: Some("R1".into()),
            expires_in: 3600,
            scope: None,
        };
        let received = DateTime::parse_from_rfc3339("2026-10-19T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(
            token.expiry_from(received).unwrap().to_rfc3339(),
            "2026-10-19T09:00:00+00:00"
        );
    }

    #[test]
    fn out_of_range_expires_in_is_invalid_response() {
        let json = r#"{"access_token":"A","expires_in":9223372036854775}"#;
        let token: TokenResponse = serde_json::from_str(json).unwrap();
        let err = token.expiry_from(Utc::now()).unwrap_err();
        assert!(matches!(err, Error::InvalidResponse(_)), "got: {err:?}");

        let token = TokenResponse {
            access_token: "A".into(),
            refresh_token: None,
            expires_in: i64::MAX,
            scope: None,
        };
        assert!(token.expiry_from(Utc::now()).is_err());
    }

    #[test]
    fn invalid_grant_classification() {
        assert!(is_invalid_grant(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#
        ));
        assert!(is_invalid_grant(reqwest::StatusCode::UNAUTHORIZED, ""));
        assert!(!is_invalid_grant(
            reqwest::StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_request"}"#
        ));
        assert!(!is_invalid_grant(reqwest::StatusCode::SERVICE_UNAVAILABLE, ""));
    }

    #[tokio::test]
    async fn exchange_code_parses_success() {
        let url = token_server(
            StatusCode::OK,
            r#"{"access_token":"A1","refresh_token":"R1","expires_in":3600}"#,
        )
        .await;
        let client = reqwest::Client::new();
        let token = exchange_code(&client, &url, CREDS, "http://localhost/cb", "abc123")
            .await
            .unwrap();
        assert_eq!(token.access_token, "A1");
        assert_eq!(token.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn refresh_revoked_token_is_invalid_grant() {
        let url = token_server(
            StatusCode::BAD_REQUEST,
            r#"{"error":"invalid_grant","error_description":"Token has been expired or revoked."}"#,
        )
        .await;
        let client = reqwest::Client::new();
        let err = refresh_token(&client, &url, CREDS, "R1").await.unwrap_err();
        assert!(matches!(err, Error::InvalidGrant(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn refresh_server_error_is_not_invalid_grant() {
        let url = token_server(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"backend"}"#).await;
        let client = reqwest::Client::new();
        let err = refresh_token(&client, &url, CREDS, "R1").await.unwrap_err();
        assert!(matches!(err, Error::TokenExchange(_)), "got: {err:?}");
    }

    #[tokio::test]
    async fn exchange_against_dead_endpoint_is_http_error() {
        let client = reqwest::Client::new();
        let err = exchange_code(
            &client,
            "http://127.0.0.1:1/token",
            CREDS,
            "http://localhost/cb",
            "abc123",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err:?}");
    }
}
