//! Bitbucket Cloud OAuth provider implementation.

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{ClientAuth, Grant, VendorApi};
use crate::error::{provider_error, Error, ProviderErrorKind};
use crate::oauth::{select_email, EmailCandidate, Profile, Token};
use crate::providers::ProviderConfig;

/// Registry name of this provider.
pub const NAME: &str = "bitbucket";

#[derive(Debug, Deserialize)]
struct User {
    account_id: Option<String>,
    uuid: Option<String>,
    username: Option<String>,
    nickname: Option<String>,
    display_name: Option<String>,
    #[serde(default)]
    links: Links,
}

#[derive(Debug, Default, Deserialize)]
struct Links {
    avatar: Option<Link>,
    html: Option<Link>,
}

#[derive(Debug, Deserialize)]
struct Link {
    href: String,
}

#[derive(Debug, Deserialize)]
struct EmailPage {
    #[serde(default)]
    values: Vec<Email>,
}

#[derive(Debug, Deserialize)]
struct Email {
    email: String,
    #[serde(default)]
    is_primary: bool,
    #[serde(default)]
    is_confirmed: bool,
}

/// Bitbucket OAuth provider.
///
/// Authenticates to the token endpoint with HTTP Basic client credentials. Bitbucket does
/// not put the email on the user resource, so profiles take a second call to the email
/// listing.
pub struct Provider {
    api: VendorApi,
}

impl Provider {
    /// Create a new Bitbucket provider.
    ///
    /// # Arguments
    ///
    /// * `config` - Usually built with [`crate::providers::bitbucket_config`]
    /// * `http_client` - Shared client, see [`crate::http::ClientBuilder`]
    pub fn new(config: ProviderConfig, http_client: reqwest::Client) -> Result<Self, Error> {
        Ok(Self {
            api: VendorApi::new(NAME, config, ClientAuth::Basic, http_client)?,
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

        let provider_id = user.account_id.or(user.uuid).ok_or_else(|| {
            provider_error(
                ProviderErrorKind::InvalidResponse,
                NAME,
                "user payload has neither account_id nor uuid",
            )
        })?;

        let mut candidates = Vec::new();
        if let Some(emails_url) = &self.api.config().emails_url {
            let listing = self.api.get_json(emails_url, token).await?;
            let page: EmailPage = self.api.decode(&listing, "email listing")?;
            candidates = page
                .values
                .into_iter()
                .map(|email| EmailCandidate {
                    address: email.email,
                    primary: email.is_primary,
                    verified: email.is_confirmed,
                })
                .collect();
            if let Some(object) = raw.as_object_mut() {
                object.insert("emails".to_string(), listing);
            }
        }

        let email = select_email(&candidates).map(|c| c.address.clone());
        debug!(
            "Bitbucket user {} has {} email(s), selected: {}",
            provider_id,
            candidates.len(),
            email.is_some()
        );

        Ok(Profile {
            username: user
                .username
                .or(user.nickname)
                .unwrap_or_else(|| provider_id.clone()),
            provider_id,
            provider: NAME.to_string(),
            email_verified: email.is_some(),
            email,
            display_name: user.display_name,
            avatar_url: user.links.avatar.map(|link| link.href),
            profile_url: user.links.html.map(|link| link.href),
            raw,
        })
    }

    async fn refresh_token(&self, refresh_token: &str) -> Result<Token, Error> {
        self.api
            .request_token(Grant::RefreshToken(refresh_token))
            .await
    }
}
