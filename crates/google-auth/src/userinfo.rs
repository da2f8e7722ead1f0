//! Account identity lookup

use serde::Deserialize;

use crate::error::{Error, Result};

/// Identity fields returned by the userinfo endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct UserInfo {
    /// Stable Google account id
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub verified_email: Option<bool>,
}

/// Fetch the identity of the account that owns `access_token`.
pub async fn fetch_user_info(
    client: &reqwest::Client,
    userinfo_endpoint: &str,
    access_token: &str,
) -> Result<UserInfo> {
    let response = client
        .get(userinfo_endpoint)
        .bearer_auth(access_token)
        .send()
        .await
        .map_err(|e| Error::Http(format!("userinfo request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(Error::Api(format!("userinfo returned {status}: {body}")));
    }

    let info = response
        .json::<UserInfo>()
        .await
        .map_err(|e| Error::InvalidResponse(format!("invalid userinfo response: {e}")))?;

    if info.id.is_empty() {
        return Err(Error::InvalidResponse("userinfo response has empty id".into()));
    }
    Ok(info)
}
