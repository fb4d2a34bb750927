//! OAuth token types.

use chrono::{DateTime, Duration, Utc};
use secrecy::SecretString;

/// Result of a successful code exchange or refresh.
#[derive(Debug, Clone)]
pub struct Token {
    /// Access token for API requests.
    pub access_token: SecretString,
    /// Token type (usually "Bearer").
    pub token_type: String,
    /// Lifetime in seconds as reported by the vendor.
    pub expires_in: Option<u64>,
    /// Refresh token for obtaining new access tokens.
    pub refresh_token: Option<SecretString>,
    /// Granted scopes, as reported by the vendor.
    pub scope: Option<String>,
    /// Server clock at the moment the token response arrived.
    pub obtained_at: DateTime<Utc>,
}

impl Token {
    /// When the access token expires, if the vendor reported a lifetime.
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_in.and_then(|secs| {
            let lifetime = Duration::try_seconds(i64::try_from(secs).ok()?)?;
            self.obtained_at.checked_add_signed(lifetime)
        })
    }

    /// Check if the access token is expired or about to expire soon.
    ///
    /// Returns true if token is expired or will expire within 5 minutes.
    pub fn is_expired(&self) -> bool {
        self.expires_at()
            .map(|expires| {
                let buffer = Duration::minutes(5);
                expires <= (Utc::now() + buffer)
            })
            .unwrap_or(false)
    }

    /// Get the remaining time until expiration.
    pub fn time_until_expiry(&self) -> Option<Duration> {
        self.expires_at().map(|expires| expires - Utc::now())
    }
}
