use config::Config;
use log::{info, warn};
use oauth_broker::http::ClientBuilder;
use oauth_broker::oauth::providers::{bitbucket, github, google};
use oauth_broker::providers::{bitbucket_config, github_config, google_config};
use oauth_broker::{Error, OAuthManager};
use std::sync::Arc;

pub mod config;
pub mod logging;

/// Builds the OAuth manager and registers every fully configured vendor.
pub fn init_manager(config: &Config) -> Result<OAuthManager, Error> {
    info!(
        "OAuth manager config: state_ttl={}ms, max_pending_states={}, default_return_to={}, \
         http_timeout={}s",
        config.state_ttl_ms,
        config.max_pending_states,
        config.default_return_to,
        config.http_timeout_secs,
    );

    let manager = OAuthManager::new(config.manager_config())?;
    let http_client = ClientBuilder::new()
        .with_timeout(config.http_timeout())
        .build()?;

    if let Some(credentials) = config.bitbucket_credentials() {
        let provider = bitbucket::Provider::new(
            bitbucket_config(
                credentials.client_id,
                credentials.client_secret,
                credentials.redirect_uri,
            ),
            http_client.clone(),
        )?;
        manager.register_provider(Arc::new(provider))?;
    }

    if let Some(credentials) = config.github_credentials() {
        let provider = github::Provider::new(
            github_config(
                credentials.client_id,
                credentials.client_secret,
                credentials.redirect_uri,
            ),
            http_client.clone(),
        )?;
        manager.register_provider(Arc::new(provider))?;
    }

    if let Some(credentials) = config.google_credentials() {
        let provider = google::Provider::new(
            google_config(
                credentials.client_id,
                credentials.client_secret,
                credentials.redirect_uri,
            ),
            http_client,
        )?;
        manager.register_provider(Arc::new(provider))?;
    }

    if manager.list_providers().is_empty() {
        warn!("No OAuth providers are configured; every flow will fail with not found");
    }

    Ok(manager)
}
