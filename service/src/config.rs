use clap::builder::TypedValueParser as _;
use clap::Parser;
use dotenvy::dotenv;
use log::{warn, LevelFilter};
use oauth_broker::ManagerConfig;
use secrecy::SecretString;
use std::convert::Infallible;
use std::time::Duration;

fn parse_secret(value: &str) -> Result<SecretString, Infallible> {
    Ok(SecretString::new(value.to_string()))
}

/// Client registration for one vendor, present only when fully configured.
#[derive(Clone, Debug)]
pub struct VendorCredentials {
    pub client_id: String,
    pub client_secret: SecretString,
    pub redirect_uri: String,
}

#[derive(Clone, Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    /// The HMAC key used to sign OAuth state tokens. Provision from a secret store.
    #[arg(long, env, value_parser = parse_secret)]
    state_signing_secret: SecretString,

    /// How long, in milliseconds, an issued state token stays valid
    #[arg(long, env, default_value_t = ManagerConfig::DEFAULT_TTL_MS as u64)]
    pub state_ttl_ms: u64,

    /// Maximum number of outstanding (issued but not yet used) state tokens
    #[arg(long, env, default_value_t = ManagerConfig::DEFAULT_MAX_PENDING_STATES)]
    pub max_pending_states: usize,

    /// Where users land after login when a flow names no return target
    #[arg(long, env, default_value = ManagerConfig::DEFAULT_RETURN_TO)]
    pub default_return_to: String,

    /// Timeout in seconds for calls to vendor token and profile endpoints
    #[arg(long, env, default_value_t = 30)]
    pub http_timeout_secs: u64,

    /// Bitbucket OAuth consumer key
    #[arg(long, env)]
    bitbucket_client_id: Option<String>,

    /// Bitbucket OAuth consumer secret
    #[arg(long, env, value_parser = parse_secret)]
    bitbucket_client_secret: Option<SecretString>,

    /// Callback URL registered on the Bitbucket consumer
    #[arg(long, env)]
    bitbucket_redirect_uri: Option<String>,

    /// GitHub OAuth app client ID
    #[arg(long, env)]
    github_client_id: Option<String>,

    /// GitHub OAuth app client secret
    #[arg(long, env, value_parser = parse_secret)]
    github_client_secret: Option<SecretString>,

    /// Callback URL registered on the GitHub OAuth app
    #[arg(long, env)]
    github_redirect_uri: Option<String>,

    /// Google OAuth client ID
    #[arg(long, env)]
    google_client_id: Option<String>,

    /// Google OAuth client secret
    #[arg(long, env, value_parser = parse_secret)]
    google_client_secret: Option<SecretString>,

    /// Callback URL registered on the Google OAuth client
    #[arg(long, env)]
    google_redirect_uri: Option<String>,

    /// Only print the authorization URL for this provider
    #[arg(short, long)]
    pub provider: Option<String>,

    /// Return target to carry through the printed flows
    #[arg(short, long)]
    pub return_to: Option<String>,

    /// Set the log level verbosity threshold (level) to control what gets displayed on console output
    #[arg(
        short,
        long,
        env,
        default_value_t = LevelFilter::Info,
        value_parser = clap::builder::PossibleValuesParser::new(["OFF", "ERROR", "WARN", "INFO", "DEBUG", "TRACE"])
            .map(|s| s.parse::<LevelFilter>().unwrap()),
        )]
    pub log_level_filter: LevelFilter,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        // Load .env file first
        dotenv().ok();
        // Then parse the command line parameters and flags
        Config::parse()
    }

    pub fn state_signing_secret(&self) -> SecretString {
        self.state_signing_secret.clone()
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Settings for the OAuth manager built from this configuration.
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig::new(self.state_signing_secret())
            .with_ttl_ms(self.state_ttl_ms)
            .with_max_pending_states(self.max_pending_states)
            .with_default_return_to(self.default_return_to.clone())
    }

    pub fn bitbucket_credentials(&self) -> Option<VendorCredentials> {
        Self::credentials(
            "bitbucket",
            &self.bitbucket_client_id,
            &self.bitbucket_client_secret,
            &self.bitbucket_redirect_uri,
        )
    }

    pub fn github_credentials(&self) -> Option<VendorCredentials> {
        Self::credentials(
            "github",
            &self.github_client_id,
            &self.github_client_secret,
            &self.github_redirect_uri,
        )
    }

    pub fn google_credentials(&self) -> Option<VendorCredentials> {
        Self::credentials(
            "google",
            &self.google_client_id,
            &self.google_client_secret,
            &self.google_redirect_uri,
        )
    }

    fn credentials(
        vendor: &str,
        client_id: &Option<String>,
        client_secret: &Option<SecretString>,
        redirect_uri: &Option<String>,
    ) -> Option<VendorCredentials> {
        match (client_id, client_secret, redirect_uri) {
            (Some(client_id), Some(client_secret), Some(redirect_uri)) => Some(VendorCredentials {
                client_id: client_id.clone(),
                client_secret: client_secret.clone(),
                redirect_uri: redirect_uri.clone(),
            }),
            (None, None, None) => None,
            _ => {
                warn!(
                    "Ignoring partial {} configuration: client id, client secret and redirect URI are all required",
                    vendor
                );
                None
            }
        }
    }
}
