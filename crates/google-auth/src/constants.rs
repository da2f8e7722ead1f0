//! Google OAuth and Calendar API constants
//!
//! Endpoint defaults for the Google provider. Client credentials are not
//! constants; they come from configuration.

/// Consent screen endpoint
pub const AUTHORIZE_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Token endpoint for code exchange and token refresh
pub const TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// OpenID userinfo endpoint returning the stable account id and email
pub const USERINFO_ENDPOINT: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

/// Calendar API v3 base URL
pub const CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";

/// Calendar whose events are listed
pub const PRIMARY_CALENDAR: &str = "primary";

/// Read-only calendar access
pub const SCOPE_CALENDAR_READONLY: &str = "https://www.googleapis.com/auth/calendar.readonly";

/// Email address of the signed-in account
pub const SCOPE_USERINFO_EMAIL: &str = "https://www.googleapis.com/auth/userinfo.email";

/// Scopes requested by default on the consent screen.
pub fn default_scopes() -> Vec<String> {
    vec![
        SCOPE_CALENDAR_READONLY.to_string(),
        SCOPE_USERINFO_EMAIL.to_string(),
    ]
}
