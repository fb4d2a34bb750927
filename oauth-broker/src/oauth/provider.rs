//! OAuth provider trait.

use async_trait::async_trait;

use super::{Profile, Token};
use crate::error::Error;

/// Trait for OAuth 2.0 identity providers.
///
/// One implementation per vendor. The manager only ever talks to this trait; vendor
/// quirks (separate email endpoints, error shapes, auth styles) stay inside the
/// implementation.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name, unique within a manager (e.g. "bitbucket").
    fn name(&self) -> &str;

    /// Build the vendor authorization URL carrying the opaque `state`.
    ///
    /// Pure URL construction, no network call.
    fn authorization_url(&self, state: &str) -> String;

    /// Exchange an authorization code for a token.
    ///
    /// `obtained_at` on the result is stamped from the server clock.
    async fn exchange_code(&self, code: &str) -> Result<Token, Error>;

    /// Fetch the vendor's user resource and normalize it.
    async fn fetch_profile(&self, token: &Token) -> Result<Profile, Error>;

    /// Obtain a fresh token from a refresh token.
    ///
    /// Not used by the callback flow itself; offered for session renewal.
    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, Error>;
}
