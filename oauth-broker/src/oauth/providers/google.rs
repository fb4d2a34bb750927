//! Google OAuth provider implementation.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ClientAuth, Grant, VendorApi};
use crate::error::Error;
use crate::oauth::{select_email, EmailCandidate, Profile, Token};
use crate::providers::ProviderConfig;

/// Registry name of this provider.
pub const NAME: &str = "google";

/// OpenID Connect userinfo claims.
#[derive(Debug, Deserialize)]
struct UserInfo {
    sub: String,
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
    name: Option<String>,
    picture: Option<String>,
}

/// Google OAuth provider.
///
/// Handles OAuth 2.0 flows for Google accounts, including:
/// - Authorization URL generation requesting offline access
/// - Authorization code exchange
/// - Token refresh
/// - User info retrieval from the OpenID userinfo endpoint
pub struct Provider {
    api: VendorApi,
}

impl Provider {
    /// Create a new Google OAuth provider.
    ///
    /// # Arguments
    ///
    /// * `config` - Usually built with [`crate::providers::google_config`]
    /// * `http_client` - Shared client, see [`crate::http::ClientBuilder`]
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            api: VendorApi::new(NAME, config, ClientAuth::FormBody, http_client)?,
        })
    }
}

#[async_trait]
impl crate::oauth::Provider for Provider {
    fn name(&self) -> &str {
        self.api.name()
    }

    fn authorization_url(&self, state: &str) -> String {
        self.api.authorization_url(state)
    }

    async fn exchange_code(&self, code: &str) -> Result<Token, Error> {
        self.api.request_token(Grant::AuthorizationCode(code)).await
    }

    async fn fetch_profile(&self, token: &Token) -> Result<Profile, Error> {
        let raw = self.api.get_json(&self.api.config().profile_url, token).await?;
        let info: UserInfo = self.api.decode(&raw, "userinfo")?;

        // Google reports one address; it goes through the same selection as listings.
        let candidates: Vec<EmailCandidate> = info
            .email
            .into_iter()
            .map(|address| EmailCandidate {
                address,
                primary: true,
                verified: info.email_verified,
            })
            .collect();
        let email = select_email(&candidates).map(|c| c.address.clone());

        Ok(Profile {
            username: email.clone().unwrap_or_else(|| info.sub.clone()),
            provider_id: info.sub,
            provider: NAME.to_string(),
            email_verified: email.is_some(),
            email,
            display_name: info.name,
            avatar_url: info.picture,
            profile_url: None,
            raw,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, Error> {
        self.api
            .request_token(Grant::RefreshToken(refresh_token))
            .await
    }
}
