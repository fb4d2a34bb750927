//! OAuth provider implementations for identity vendors.
//!
//! Each vendor lives in its own module exposing a `Provider` type. The shared token and
//! JSON request plumbing they all use lives here.

pub mod bitbucket;
pub mod github;
pub mod google;

use reqwest::header::ACCEPT;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use crate::error::{config_error, provider_error, ConfigErrorKind, Error, ProviderErrorKind};
use crate::oauth::Token;
use crate::providers::ProviderConfig;

/// How client credentials are presented to the token endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ClientAuth {
    /// HTTP Basic with `client_id:client_secret`.
    Basic,
    /// `client_id` and `client_secret` as form fields.
    FormBody,
}

pub(crate) enum Grant<'a> {
    AuthorizationCode(&'a str),
    RefreshToken(&'a str),
}

/// Token endpoint response, success and error shapes combined.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<u64>,
    refresh_token: Option<String>,
    #[serde(alias = "scopes")]
    scope: Option<String>,
    error: Option<String>,
    error_description: Option<String>,
}

/// Vendor endpoints plus the HTTP client used to reach them.
pub(crate) struct VendorApi {
    name: &'static str,
    config: ProviderConfig,
    client_auth: ClientAuth,
    authorize_endpoint: Url,
    http_client: reqwest::Client,
}

impl VendorApi {
    pub(crate) fn new(
        name: &'static str,
        config: ProviderConfig,
        client_auth: ClientAuth,
        http_client: reqwest::Client,
    ) -> Result<Self, Error> {
        let authorize_endpoint = parse_endpoint(name, &config.authorization_url)?;
        parse_endpoint(name, &config.token_url)?;
        parse_endpoint(name, &config.profile_url)?;
        if let Some(emails_url) = &config.emails_url {
            parse_endpoint(name, emails_url)?;
        }

        Ok(Self {
            name,
            config,
            client_auth,
            authorize_endpoint,
            http_client,
        })
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn authorization_url(&self, state: &str) -> String {
        let mut url = self.authorize_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("client_id", &self.config.client_id)
                .append_pair("response_type", "code");
            if !self.config.redirect_uri.is_empty() {
                query.append_pair("redirect_uri", &self.config.redirect_uri);
            }
            if !self.config.scopes.is_empty() {
                query.append_pair("scope", &self.config.scopes.join(" "));
            }
            for (key, value) in &self.config.extra_auth_params {
                query.append_pair(key, value);
            }
            query.append_pair("state", state);
        }
        url.into()
    }

    /// Call the token endpoint and normalize the response.
    pub(crate) async fn request_token(&self, grant: Grant<'_>) -> Result<Token, Error> {
        let client_secret = self.config.client_secret.expose_secret().as_str();
        let refreshing = matches!(grant, Grant::RefreshToken(_));
        let mut form: Vec<(&str, &str)> = Vec::with_capacity(6);
        match grant {
            Grant::AuthorizationCode(code) => {
                form.push(("grant_type", "authorization_code"));
                form.push(("code", code));
                if !self.config.redirect_uri.is_empty() {
                    form.push(("redirect_uri", self.config.redirect_uri.as_str()));
                }
            }
            Grant::RefreshToken(refresh_token) => {
                form.push(("grant_type", "refresh_token"));
                form.push(("refresh_token", refresh_token));
            }
        }

        let mut request = self
            .http_client
            .post(&self.config.token_url)
            .header(ACCEPT, "application/json");
        match self.client_auth {
            ClientAuth::Basic => {
                request = request.basic_auth(&self.config.client_id, Some(client_secret));
            }
            ClientAuth::FormBody => {
                form.push(("client_id", self.config.client_id.as_str()));
                form.push(("client_secret", client_secret));
            }
        }

        debug!(
            "Requesting {} token from {}",
            if refreshing { "refreshed" } else { "new" },
            self.name
        );

        let response = request.form(&form).send().await.map_err(|e| {
            warn!("Failed to reach {} token endpoint: {:?}", self.name, e);
            Error::from(e).with_provider(self.name)
        })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::from(e).with_provider(self.name))?;

        if !status.is_success() {
            warn!("{} token endpoint returned {}: {}", self.name, status, body);
            let kind = if refreshing {
                ProviderErrorKind::TokenRefresh(status)
            } else {
                ProviderErrorKind::TokenExchange(status)
            };
            return Err(provider_error(
                kind,
                self.name,
                &format!("token endpoint returned {}: {}", status.as_u16(), body),
            ));
        }

        let tokens: TokenResponse = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse {} token response: {:?}", self.name, e);
            provider_error(
                ProviderErrorKind::InvalidResponse,
                self.name,
                "token endpoint returned an unreadable body",
            )
        })?;

        if let Some(error) = tokens.error {
            warn!("{} reported OAuth error {}", self.name, error);
            let message = match tokens.error_description {
                Some(description) => format!("{}: {}", error, description),
                None => error,
            };
            return Err(provider_error(ProviderErrorKind::OAuth, self.name, &message));
        }

        let access_token = tokens.access_token.ok_or_else(|| {
            provider_error(
                ProviderErrorKind::InvalidResponse,
                self.name,
                "token response is missing access_token",
            )
        })?;

        Ok(Token {
            access_token: SecretString::new(access_token),
            token_type: tokens.token_type.unwrap_or_else(|| "Bearer".to_string()),
            expires_in: tokens.expires_in,
            refresh_token: tokens.refresh_token.map(SecretString::new),
            scope: tokens.scope,
            obtained_at: chrono::Utc::now(),
        })
    }

    /// GET a JSON resource with the token as bearer credentials.
    pub(crate) async fn get_json(&self, url: &str, token: &Token) -> Result<serde_json::Value, Error> {
        let response = self
            .http_client
            .get(url)
            .bearer_auth(token.access_token.expose_secret())
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| {
                warn!("Failed to reach {} API: {:?}", self.name, e);
                Error::from(e).with_provider(self.name)
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| Error::from(e).with_provider(self.name))?;

        if !status.is_success() {
            warn!("{} API returned {} for {}: {}", self.name, status, url, body);
            return Err(provider_error(
                ProviderErrorKind::Profile(status),
                self.name,
                &format!("{} returned {}: {}", url, status.as_u16(), body),
            ));
        }

        serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse {} API response: {:?}", self.name, e);
            provider_error(
                ProviderErrorKind::InvalidResponse,
                self.name,
                &format!("{} returned an unreadable body", url),
            )
        })
    }

    /// Deserialize a vendor payload into a typed view of it.
    pub(crate) fn decode<T: DeserializeOwned>(
        &self,
        value: &serde_json::Value,
        what: &str,
    ) -> Result<T, Error> {
        T::deserialize(value).map_err(|e| {
            warn!("Unexpected {} {} payload: {:?}", self.name, what, e);
            provider_error(
                ProviderErrorKind::InvalidResponse,
                self.name,
                &format!("unexpected {} payload", what),
            )
        })
    }
}

fn parse_endpoint(provider: &str, endpoint: &str) -> Result<Url, Error> {
    Url::parse(endpoint).map_err(|e| {
        config_error(
            ConfigErrorKind::InvalidEndpoint,
            &format!("{} endpoint '{}' is invalid: {}", provider, endpoint, e),
        )
        .with_provider(provider)
    })
}
