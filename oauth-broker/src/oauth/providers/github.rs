//! GitHub OAuth provider implementation.

use async_trait::async_trait;
use serde::Deserialize;

use super::{ClientAuth, Grant, VendorApi};
use crate::error::Error;
use crate::oauth::{select_email, EmailCandidate, Profile, Token};
use crate::providers::ProviderConfig;

/// Registry name of this provider.
pub const NAME: &str = "github";

#[derive(Debug, Deserialize)]
struct User {
    id: u64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Email {
    email: String,
    #[serde(default)]
    primary: bool,
    #[serde(default)]
    verified: bool,
}

/// GitHub OAuth provider.
///
/// GitHub answers OAuth failures on the token endpoint with status 200 and an `error`
/// field; those still surface as OAuth errors.
pub struct Provider {
    api: VendorApi,
}

impl Provider {
    /// Create a new GitHub provider from a config built with
    /// [`crate::providers::github_config`] or equivalent.
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
        let mut raw = self.api.get_json(&self.api.config().profile_url, token).await?;
        let user: User = self.api.decode(&raw, "user")?;

        let mut candidates = Vec::new();
        if let Some(emails_url) = &self.api.config().emails_url {
            let listing = self.api.get_json(emails_url, token).await?;
            let emails: Vec<Email> = self.api.decode(&listing, "email listing")?;
            candidates = emails
                .into_iter()
                .map(|email| EmailCandidate {
                    address: email.email,
                    primary: email.primary,
                    verified: email.verified,
                })
                .collect();
            if let Some(object) = raw.as_object_mut() {
                object.insert("emails".to_string(), listing);
            }
        }
        let email = select_email(&candidates).map(|c| c.address.clone());

        Ok(Profile {
            provider_id: user.id.to_string(),
            provider: NAME.to_string(),
            email_verified: email.is_some(),
            email,
            display_name: user.name,
            username: user.login,
            avatar_url: user.avatar_url,
            profile_url: user.html_url,
            raw,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, Error> {
        self.api
            .request_token(Grant::RefreshToken(refresh_token))
            .await
    }
}
