//! OAuth manager composing the provider registry, state codec and nonce store.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::Duration;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, info};

use super::{FlowState, InMemoryNonceStore, NonceStore, Profile, Provider, StateCodec, Token};
use crate::error::{config_error, registry_error, ConfigErrorKind, Error, RegistryErrorKind};

/// Orchestrator-wide settings.
///
/// The signing secret is a `SecretString`, so `Debug` never prints it.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// HMAC key for state tokens.
    pub signing_secret: SecretString,
    /// How long an issued state stays valid.
    pub ttl: Duration,
    /// Capacity of the in-memory nonce store.
    pub max_pending_states: usize,
    /// Return target used when `initiate_flow` gets none.
    pub default_return_to: String,
}

impl ManagerConfig {
    pub const DEFAULT_TTL_MS: i64 = 10 * 60 * 1_000;
    pub const DEFAULT_MAX_PENDING_STATES: usize = 10_000;
    pub const DEFAULT_RETURN_TO: &'static str = "/";
    const MAX_TTL_DAYS: i64 = 1;

    /// Create a config with defaults for everything but the secret.
    pub fn new(signing_secret: SecretString) -> Self {
        Self {
            signing_secret,
            ttl: Duration::milliseconds(Self::DEFAULT_TTL_MS),
            max_pending_states: Self::DEFAULT_MAX_PENDING_STATES,
            default_return_to: Self::DEFAULT_RETURN_TO.to_string(),
        }
    }

    /// Set the state lifetime in milliseconds.
    pub fn with_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.ttl = i64::try_from(ttl_ms)
            .ok()
            .and_then(Duration::try_milliseconds)
            .unwrap_or(Duration::MAX);
        self
    }

    /// Set the nonce store capacity.
    pub fn with_max_pending_states(mut self, max_pending_states: usize) -> Self {
        self.max_pending_states = max_pending_states;
        self
    }

    /// Set the fallback return target.
    pub fn with_default_return_to(mut self, default_return_to: impl Into<String>) -> Self {
        self.default_return_to = default_return_to.into();
        self
    }

    fn validate(&self) -> Result<(), Error> {
        if self.signing_secret.expose_secret().is_empty() {
            return Err(config_error(
                ConfigErrorKind::InvalidManagerConfig,
                "State signing secret must not be empty",
            ));
        }
        if self.ttl <= Duration::zero() || self.ttl > Duration::days(Self::MAX_TTL_DAYS) {
            return Err(config_error(
                ConfigErrorKind::InvalidManagerConfig,
                "State TTL must be positive and at most one day",
            ));
        }
        if self.max_pending_states == 0 {
            return Err(config_error(
                ConfigErrorKind::InvalidManagerConfig,
                "Max pending states must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Result of starting a flow.
#[derive(Debug, Clone)]
pub struct FlowStart {
    /// Where to redirect the user agent.
    pub authorization_url: String,
    /// Opaque state; already embedded in `authorization_url`.
    pub state: String,
    pub provider: String,
}

/// Result of a completed callback.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub token: Token,
    pub profile: Profile,
    /// The validated state, including the caller's `return_to` and metadata.
    pub state: FlowState,
}

/// Entry point for both halves of the authorization-code flow.
///
/// Construct one per application configuration and share it (e.g. behind an `Arc`) with
/// the web layer. Safe to call concurrently; the only shared mutable pieces are the
/// registry and the nonce store.
pub struct OAuthManager {
    providers: DashMap<String, Arc<dyn Provider>>,
    codec: StateCodec,
    default_return_to: String,
}

impl OAuthManager {
    /// Create a manager with an in-memory nonce store sized by `max_pending_states`.
    pub fn new(config: ManagerConfig) -> Result<Self, Error> {
        let nonces = Arc::new(InMemoryNonceStore::new(config.max_pending_states));
        Self::with_nonce_store(config, nonces)
    }

    /// Create a manager backed by a caller-supplied nonce store.
    pub fn with_nonce_store(
        config: ManagerConfig,
        nonces: Arc<dyn NonceStore>,
    ) -> Result<Self, Error> {
        config.validate()?;

        Ok(Self {
            providers: DashMap::new(),
            codec: StateCodec::new(config.signing_secret, config.ttl, nonces),
            default_return_to: config.default_return_to,
        })
    }

    /// Register a provider under its name. Never overwrites an existing entry.
    pub fn register_provider(&self, provider: Arc<dyn Provider>) -> Result<(), Error> {
        let name = provider.name().to_string();
        match self.providers.entry(name.clone()) {
            Entry::Occupied(_) => Err(registry_error(
                RegistryErrorKind::Conflict,
                &name,
                &format!("Provider '{}' is already registered", name),
            )),
            Entry::Vacant(slot) => {
                slot.insert(provider);
                info!("Registered OAuth provider {}", name);
                Ok(())
            }
        }
    }

    /// Remove a provider. Returns whether an entry was removed.
    pub fn unregister_provider(&self, name: &str) -> bool {
        let removed = self.providers.remove(name).is_some();
        if removed {
            info!("Unregistered OAuth provider {}", name);
        }
        removed
    }

    pub fn get_provider(&self, name: &str) -> Option<Arc<dyn Provider>> {
        self.providers
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
    }

    pub fn has_provider(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// Registered provider names, sorted.
    pub fn list_providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .providers
            .iter()
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Start a flow: issue a signed state and build the vendor authorization URL.
    ///
    /// # Arguments
    ///
    /// * `provider_name` - Registered provider to sign in with
    /// * `return_to` - Post-login target; falls back to the configured default
    /// * `metadata` - Caller data carried through the round trip
    pub async fn initiate_flow(
        &self,
        provider_name: &str,
        return_to: Option<&str>,
        metadata: Option<BTreeMap<String, String>>,
    ) -> Result<FlowStart, Error> {
        let provider = self.require_provider(provider_name)?;
        let return_to = return_to.unwrap_or(&self.default_return_to);

        let (state, _) = self
            .codec
            .issue(provider_name, return_to, metadata.unwrap_or_default())
            .await?;
        let authorization_url = provider.authorization_url(&state);

        info!(
            "Initiated OAuth flow for provider {} (return_to={})",
            provider_name, return_to
        );

        Ok(FlowStart {
            authorization_url,
            state,
            provider: provider_name.to_string(),
        })
    }

    /// Complete a flow: consume the state, exchange the code and fetch the profile.
    ///
    /// The state is spent before any vendor call is made, so a failed exchange cannot be
    /// retried with the same state; the caller must re-initiate the flow.
    pub async fn handle_callback(&self, code: &str, state: &str) -> Result<CallbackOutcome, Error> {
        let state = self.codec.consume(state).await?;
        let provider = self.require_provider(&state.provider)?;

        debug!("Exchanging authorization code with {}", state.provider);
        let token = provider.exchange_code(code).await?;
        let profile = provider.fetch_profile(&token).await?;

        info!(
            "Completed OAuth callback for provider {} (user {})",
            state.provider, profile.provider_id
        );

        Ok(CallbackOutcome {
            token,
            profile,
            state,
        })
    }

    /// Check a state without consuming it.
    pub async fn validate_state(&self, state: &str) -> Result<FlowState, Error> {
        self.codec.peek(state).await
    }

    /// Build an authorization URL around an externally managed state string.
    pub fn get_authorization_url(&self, provider_name: &str, state: &str) -> Result<String, Error> {
        Ok(self.require_provider(provider_name)?.authorization_url(state))
    }

    fn require_provider(&self, name: &str) -> Result<Arc<dyn Provider>, Error> {
        self.get_provider(name).ok_or_else(|| {
            registry_error(
                RegistryErrorKind::NotFound,
                name,
                &format!("Provider '{}' is not registered", name),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{provider_error, ErrorKind, ProviderErrorKind};
    use crate::oauth::providers::bitbucket;
    use async_trait::async_trait;
    use chrono::Utc;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Mock provider for testing
    struct MockProvider {
        name: String,
        fail_exchange: bool,
        exchanges: AtomicUsize,
    }

    impl MockProvider {
        fn new(name: &str) -> Self {
            Self {
                name: name.to_string(),
                fail_exchange: false,
                exchanges: AtomicUsize::new(0),
            }
        }

        fn failing(name: &str) -> Self {
            Self {
                fail_exchange: true,
                ..Self::new(name)
            }
        }
    }

    #[async_trait]
    impl Provider for MockProvider {
        fn name(&self) -> &str {
            &self.name
        }

        fn authorization_url(&self, state: &str) -> String {
            format!("https://{}.example.com/authorize?state={}", self.name, state)
        }

        async fn exchange_code(&self, code: &str) -> Result<Token, Error> {
            self.exchanges.fetch_add(1, Ordering::SeqCst);
            if self.fail_exchange {
                return Err(provider_error(
                    ProviderErrorKind::TokenExchange(StatusCode::SERVICE_UNAVAILABLE),
                    &self.name,
                    "token endpoint returned 503: maintenance",
                ));
            }
            Ok(Token {
                access_token: SecretString::new(format!("access-for-{}", code)),
                token_type: "Bearer".to_string(),
                expires_in: Some(3600),
                refresh_token: None,
                scope: None,
                obtained_at: Utc::now(),
            })
        }

        async fn fetch_profile(&self, _token: &Token) -> Result<Profile, Error> {
            Ok(Profile {
                provider_id: "user-1".to_string(),
                provider: self.name.clone(),
                email: Some("user@example.com".to_string()),
                email_verified: true,
                display_name: None,
                username: "user".to_string(),
                avatar_url: None,
                profile_url: None,
                raw: serde_json::json!({}),
            })
        }

        async fn refresh_token(&self, _refresh_token: &str) -> Result<Token, Error> {
            unimplemented!("not exercised by the manager")
        }
    }

    fn manager() -> OAuthManager {
        let config = ManagerConfig::new(SecretString::new("manager-test-secret".to_string()))
            .with_default_return_to("/home");
        OAuthManager::new(config).unwrap()
    }

    #[test]
    fn test_duplicate_registration_conflicts() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap();

        let err = manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap_err();
        assert_eq!(err.error_kind, ErrorKind::Registry(RegistryErrorKind::Conflict));
        assert_eq!(err.status(), StatusCode::CONFLICT);

        assert!(manager.unregister_provider("gitea"));
        assert!(!manager.unregister_provider("gitea"));
        assert!(manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .is_ok());
    }

    #[test]
    fn test_lookups() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("zeta")))
            .unwrap();
        manager
            .register_provider(Arc::new(MockProvider::new("alpha")))
            .unwrap();

        assert!(manager.has_provider("alpha"));
        assert!(!manager.has_provider("gitlab"));
        assert_eq!(manager.get_provider("zeta").unwrap().name(), "zeta");
        assert!(manager.get_provider("gitlab").is_none());
        assert_eq!(manager.list_providers(), vec!["alpha", "zeta"]);
    }

    #[test]
    fn test_invalid_configs_are_rejected() {
        let empty = ManagerConfig::new(SecretString::new(String::new()));
        assert!(OAuthManager::new(empty).is_err());

        let no_room = ManagerConfig::new(SecretString::new("s".to_string()))
            .with_max_pending_states(0);
        assert!(OAuthManager::new(no_room).is_err());

        let no_ttl = ManagerConfig::new(SecretString::new("s".to_string())).with_ttl_ms(0);
        assert!(OAuthManager::new(no_ttl).is_err());

        let forever = ManagerConfig::new(SecretString::new("s".to_string())).with_ttl_ms(u64::MAX);
        assert!(OAuthManager::new(forever).is_err());
    }

    #[test]
    fn test_config_debug_hides_secret() {
        let config = ManagerConfig::new(SecretString::new("hunter2-hunter2".to_string()));
        assert!(!format!("{:?}", config).contains("hunter2"));
    }

    #[tokio::test]
    async fn test_initiate_unknown_provider_is_not_found() {
        let manager = manager();
        let err = manager
            .initiate_flow("gitlab", Some("/dashboard"), None)
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.provider(), Some("gitlab"));
    }

    #[tokio::test]
    async fn test_initiate_uses_default_return_to() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap();

        let start = manager.initiate_flow("gitea", None, None).await.unwrap();
        assert_eq!(start.provider, "gitea");
        assert!(start.authorization_url.ends_with(&start.state));

        let state = manager.validate_state(&start.state).await.unwrap();
        assert_eq!(state.return_to, "/home");
        assert!(state.metadata.is_empty());
    }

    #[tokio::test]
    async fn test_validate_state_round_trips_and_does_not_consume() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap();
        let metadata = BTreeMap::from([("invite".to_string(), "abc123".to_string())]);

        let start = manager
            .initiate_flow("gitea", Some("/settings"), Some(metadata.clone()))
            .await
            .unwrap();

        let state = manager.validate_state(&start.state).await.unwrap();
        assert_eq!(state.provider, "gitea");
        assert_eq!(state.return_to, "/settings");
        assert_eq!(state.metadata, metadata);

        let outcome = manager.handle_callback("code", &start.state).await.unwrap();
        assert_eq!(outcome.state, state);
    }

    #[tokio::test]
    async fn test_replay_is_rejected_like_a_forgery() {
        let manager = manager();
        let provider = Arc::new(MockProvider::new("gitea"));
        manager.register_provider(provider.clone()).unwrap();

        let start = manager.initiate_flow("gitea", None, None).await.unwrap();
        manager.handle_callback("code-1", &start.state).await.unwrap();

        let replay = manager
            .handle_callback("code-2", &start.state)
            .await
            .unwrap_err();
        let forged = manager
            .handle_callback("code-3", "eyJmYWtlIjp0cnVlfQ.deadbeef")
            .await
            .unwrap_err();

        assert_eq!(replay.status(), StatusCode::BAD_REQUEST);
        assert_eq!(replay.status(), forged.status());
        assert_eq!(replay.to_string(), forged.to_string());
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_callback_for_unregistered_provider_is_not_found() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap();
        let start = manager.initiate_flow("gitea", None, None).await.unwrap();

        manager.unregister_provider("gitea");
        let err = manager.handle_callback("code", &start.state).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_provider_failure_propagates_and_spends_state() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::failing("gitea")))
            .unwrap();
        let start = manager.initiate_flow("gitea", None, None).await.unwrap();

        let err = manager.handle_callback("code", &start.state).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(err.provider(), Some("gitea"));

        let retry = manager.handle_callback("code", &start.state).await.unwrap_err();
        assert!(retry.is_invalid_state());
    }

    #[tokio::test]
    async fn test_get_authorization_url_with_external_state() {
        let manager = manager();
        manager
            .register_provider(Arc::new(MockProvider::new("gitea")))
            .unwrap();

        let url = manager.get_authorization_url("gitea", "external-state").unwrap();
        assert_eq!(url, "https://gitea.example.com/authorize?state=external-state");
        assert!(manager.get_authorization_url("gitlab", "x").is_err());
    }

    #[tokio::test]
    async fn test_bitbucket_flow_end_to_end() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/site/oauth2/access_token")
            .match_body(mockito::Matcher::UrlEncoded(
                "code".into(),
                "code123".into(),
            ))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"bb-access","token_type":"bearer","expires_in":7200}"#)
            .expect(1)
            .create_async()
            .await;
        server
            .mock("GET", "/2.0/user")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"account_id":"557058:abc","username":"jdoe"}"#)
            .create_async()
            .await;
        server
            .mock("GET", "/2.0/user/emails")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"values":[{"email":"jane@example.com","is_primary":true,"is_confirmed":true}]}"#)
            .create_async()
            .await;

        let mut config = crate::providers::bitbucket_config(
            "bb-client".to_string(),
            SecretString::new("bb-secret".to_string()),
            "https://app.example.com/oauth/bitbucket/callback".to_string(),
        );
        config.token_url = format!("{}/site/oauth2/access_token", server.url());
        config.profile_url = format!("{}/2.0/user", server.url());
        config.emails_url = Some(format!("{}/2.0/user/emails", server.url()));
        let bitbucket = bitbucket::Provider::new(config, reqwest::Client::new()).unwrap();

        let manager = manager();
        manager.register_provider(Arc::new(bitbucket)).unwrap();

        let start = manager
            .initiate_flow("bitbucket", Some("/dashboard"), None)
            .await
            .unwrap();
        assert!(start
            .authorization_url
            .contains("bitbucket.org/site/oauth2/authorize"));

        let before = Utc::now();
        let outcome = manager.handle_callback("code123", &start.state).await.unwrap();
        assert!(outcome.token.obtained_at >= before);
        assert_eq!(outcome.profile.provider, "bitbucket");
        assert_eq!(outcome.profile.email.as_deref(), Some("jane@example.com"));
        assert_eq!(outcome.state.return_to, "/dashboard");

        let replay = manager
            .handle_callback("code123", &start.state)
            .await
            .unwrap_err();
        assert!(replay.is_invalid_state());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_callbacks_with_same_state_have_one_winner() {
        let manager = Arc::new(manager());
        let provider = Arc::new(MockProvider::new("gitea"));
        manager.register_provider(provider.clone()).unwrap();
        let start = manager.initiate_flow("gitea", None, None).await.unwrap();

        let handles: Vec<_> = (0..6)
            .map(|i| {
                let manager = Arc::clone(&manager);
                let state = start.state.clone();
                tokio::spawn(async move {
                    manager
                        .handle_callback(&format!("code-{}", i), &state)
                        .await
                        .is_ok()
                })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(provider.exchanges.load(Ordering::SeqCst), 1);
    }
}
