//! # oauth-broker
//!
//! Multi-provider OAuth 2.0 authorization-code broker:
//! - Provider registry keyed by name (Bitbucket, GitHub, Google included)
//! - HMAC-signed, time-bounded, single-use `state` tokens
//! - Callback pipeline: validate state, exchange code, fetch and normalize the profile
//! - Shared HTTP client building
//!
//! The crate exposes no routes; a web layer calls [`oauth::OAuthManager::initiate_flow`]
//! from its start route and [`oauth::OAuthManager::handle_callback`] from its callback
//! route, mapping any [`Error`] to a response with [`Error::status`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use oauth_broker::{
//!     http::ClientBuilder,
//!     oauth::{providers::bitbucket, ManagerConfig, OAuthManager},
//!     providers::bitbucket_config,
//! };
//! ```

pub mod error;
pub mod http;
pub mod oauth;
pub mod providers;

// Re-export commonly used types
pub use error::{Error, ErrorKind};
pub use oauth::{CallbackOutcome, FlowStart, FlowState, ManagerConfig, OAuthManager, Profile, Token};
