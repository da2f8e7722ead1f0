//! Google OAuth and Calendar provider
//!
//! Implements `provider::CalendarProvider` against Google's OAuth 2.0 and
//! Calendar v3 endpoints. Each module wraps one endpoint; `GoogleProvider`
//! composes them into the adapter contract.
//!
//! Authorization flow:
//! 1. `consent::build_authorization_url()` sends the user to the consent screen
//! 2. `token::exchange_code()` trades the returned code for tokens
//! 3. `userinfo::fetch_user_info()` resolves the stable account id and email
//! 4. `token::refresh_token()` renews expired access tokens
//! 5. `events::list_events()` reads the primary calendar

pub mod client;
pub mod constants;
pub mod consent;
pub mod error;
pub mod events;
pub mod token;
pub mod userinfo;

pub use client::{Endpoints, GoogleOAuthConfig, GoogleProvider};
pub use constants::default_scopes;
pub use error::{Error, Result};
pub use token::{TokenResponse, exchange_code, refresh_token};
