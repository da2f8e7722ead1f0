//! Consent screen URL
//!
//! The URL always asks for offline access so a refresh token is issued, and
//! forces the consent prompt so the refresh token is returned again for users
//! who already granted access.

use url::form_urlencoded;

/// Build the consent URL for the given client and scopes.
///
/// Deterministic: the same inputs always produce the same URL.
pub fn build_authorization_url(
    authorize_endpoint: &str,
    client_id: &str,
    redirect_url: &str,
    scopes: &[String],
) -> String {
    let query = form_urlencoded::Serializer::new(String::new())
        .append_pair("client_id", client_id)
        .append_pair("redirect_uri", redirect_url)
        .append_pair("response_type", "code")
        .append_pair("scope", &scopes.join(" "))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .finish();
    format!("{authorize_endpoint}?{query}")
}
