//! Error types for the `oauth-broker` crate.
//!
//! Follows the same pattern as the other workspace crates: a root Error struct holding an
//! error kind, an optional source for chaining, and here additionally the name of the
//! provider a failure is attributed to.

use std::error::Error as StdError;
use std::fmt;

use reqwest::StatusCode;

/// The only message ever reported for a rejected state token.
pub const INVALID_STATE_MESSAGE: &str = "invalid or expired state";

/// Top-level error type for oauth-broker crate.
#[derive(Debug)]
pub struct Error {
    pub source: Option<Box<dyn StdError + Send + Sync>>,
    pub error_kind: ErrorKind,
    /// Provider the failure is attributed to, if any.
    pub provider: Option<String>,
}

/// Major categories of errors in oauth-broker.
#[derive(Debug, PartialEq)]
pub enum ErrorKind {
    Registry(RegistryErrorKind),
    State(StateErrorKind),
    Provider(ProviderErrorKind),
    Config(ConfigErrorKind),
    Http(HttpErrorKind),
}

/// Errors from provider registry lookups and mutations.
#[derive(Debug, PartialEq)]
pub enum RegistryErrorKind {
    Conflict,
    NotFound,
}

/// Errors from signed state handling.
#[derive(Debug, PartialEq)]
pub enum StateErrorKind {
    /// Bad signature, expired, replayed or malformed. These are never told apart.
    Invalid,
    /// The state could not be signed or the nonce store failed.
    Signing,
}

/// Errors reported by (or about) an identity vendor.
#[derive(Debug, PartialEq)]
pub enum ProviderErrorKind {
    /// Token endpoint answered the code exchange with a non-2xx status.
    TokenExchange(StatusCode),
    /// Token endpoint answered a refresh with a non-2xx status.
    TokenRefresh(StatusCode),
    /// User or email endpoint answered with a non-2xx status.
    Profile(StatusCode),
    /// Vendor reported an `error` / `error_description` pair.
    OAuth,
    /// Vendor answered 2xx with a body we could not understand.
    InvalidResponse,
}

/// Errors from static configuration.
#[derive(Debug, PartialEq)]
pub enum ConfigErrorKind {
    InvalidEndpoint,
    InvalidManagerConfig,
}

/// Errors from HTTP client operations.
#[derive(Debug, PartialEq)]
pub enum HttpErrorKind {
    BuilderFailed,
    Network,
}

impl Error {
    /// HTTP-style status a web layer should answer with.
    pub fn status(&self) -> StatusCode {
        match &self.error_kind {
            ErrorKind::Registry(RegistryErrorKind::Conflict) => StatusCode::CONFLICT,
            ErrorKind::Registry(RegistryErrorKind::NotFound) => StatusCode::NOT_FOUND,
            ErrorKind::State(StateErrorKind::Invalid) => StatusCode::BAD_REQUEST,
            ErrorKind::State(StateErrorKind::Signing) => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Provider(ProviderErrorKind::TokenExchange(status))
            | ErrorKind::Provider(ProviderErrorKind::TokenRefresh(status))
            | ErrorKind::Provider(ProviderErrorKind::Profile(status)) => *status,
            ErrorKind::Provider(ProviderErrorKind::OAuth) => StatusCode::BAD_REQUEST,
            ErrorKind::Provider(ProviderErrorKind::InvalidResponse) => StatusCode::BAD_GATEWAY,
            ErrorKind::Http(HttpErrorKind::Network) => StatusCode::BAD_GATEWAY,
            ErrorKind::Http(HttpErrorKind::BuilderFailed) | ErrorKind::Config(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Human-readable message.
    pub fn message(&self) -> String {
        match (&self.error_kind, &self.source) {
            (ErrorKind::State(StateErrorKind::Invalid), _) => INVALID_STATE_MESSAGE.to_string(),
            (_, Some(source)) => source.to_string(),
            (kind, None) => format!("{:?}", kind),
        }
    }

    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    /// Attribute this error to a provider, keeping an existing attribution.
    pub fn with_provider(mut self, provider: &str) -> Self {
        if self.provider.is_none() {
            self.provider = Some(provider.to_string());
        }
        self
    }

    pub fn is_invalid_state(&self) -> bool {
        self.error_kind == ErrorKind::State(StateErrorKind::Invalid)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let category = match &self.error_kind {
            ErrorKind::Registry(_) => "Registry",
            ErrorKind::State(_) => "State",
            ErrorKind::Provider(_) => "Provider",
            ErrorKind::Config(_) => "Config",
            ErrorKind::Http(_) => "HTTP",
        };
        match &self.provider {
            Some(provider) => write!(f, "{} error ({}): {}", category, provider, self.message()),
            None => write!(f, "{} error: {}", category, self.message()),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn StdError + 'static))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        let error_kind = if err.is_builder() {
            ErrorKind::Http(HttpErrorKind::BuilderFailed)
        } else if err.is_decode() {
            ErrorKind::Provider(ProviderErrorKind::InvalidResponse)
        } else {
            ErrorKind::Http(HttpErrorKind::Network)
        };

        Error {
            source: Some(Box::new(err)),
            error_kind,
            provider: None,
        }
    }
}

/// Helper function to create registry errors.
pub fn registry_error(kind: RegistryErrorKind, provider: &str, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Registry(kind),
        provider: Some(provider.to_string()),
    }
}

/// The uniform state rejection. Carries no source so nothing about the cause leaks.
pub fn invalid_state() -> Error {
    Error {
        source: None,
        error_kind: ErrorKind::State(StateErrorKind::Invalid),
        provider: None,
    }
}

/// Helper function to create signing errors.
pub fn signing_error(message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::State(StateErrorKind::Signing),
        provider: None,
    }
}

/// Helper function to create provider errors.
pub fn provider_error(kind: ProviderErrorKind, provider: &str, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Provider(kind),
        provider: Some(provider.to_string()),
    }
}

/// Helper function to create configuration errors.
pub fn config_error(kind: ConfigErrorKind, message: &str) -> Error {
    Error {
        source: Some(message.to_string().into()),
        error_kind: ErrorKind::Config(kind),
        provider: None,
    }
}
