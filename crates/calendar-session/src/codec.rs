//! Session credential codec
//!
//! Issues and verifies HS256-signed JWTs binding a session to one user id.
//! Validity is self-contained (signature + embedded `exp`); nothing is
//! persisted. Rotating the signing secret invalidates every outstanding
//! credential.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind as JwtErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    /// User id
    sub: String,
    /// Issued at, unix seconds
    iat: i64,
    /// Expiry, unix seconds
    exp: i64,
}

/// Signs and verifies session credentials with a process-wide secret.
#[derive(Clone)]
pub struct SessionCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    validity: Duration,
}

impl SessionCodec {
    /// Shortest signing secret accepted by the gateway configuration.
    pub const MIN_SECRET_LEN: usize = 32;

    pub fn new(secret: &[u8], validity: std::time::Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            validation,
            validity: Duration::from_std(validity).unwrap_or(Duration::MAX),
        }
    }

    /// Issue a credential for `user_id`, valid for the configured window.
    pub fn issue(&self, user_id: &str) -> Result<String> {
        self.issue_at(user_id, Utc::now())
    }

    /// Issue a credential as if at `issued_at`.
    pub fn issue_at(&self, user_id: &str, issued_at: DateTime<Utc>) -> Result<String> {
        let expires_at = issued_at
            .checked_add_signed(self.validity)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let claims = Claims {
            sub: user_id.to_string(),
            iat: issued_at.timestamp(),
            exp: expires_at.timestamp(),
        };
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| Error::Internal(format!("signing session credential: {e}")))
    }

    /// Verify a credential and return the user id it binds to.
    pub fn verify(&self, credential: &str) -> Result<String> {
        let data = jsonwebtoken::decode::<Claims>(credential, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                JwtErrorKind::ExpiredSignature => Error::ExpiredCredential,
                _ => Error::InvalidCredential(e.to_string()),
            })?;

        if data.claims.sub.is_empty() {
            return Err(Error::InvalidCredential("credential has empty subject".into()));
        }
        Ok(data.claims.sub)
    }
}
