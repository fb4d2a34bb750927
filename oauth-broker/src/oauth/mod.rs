//! OAuth 2.0 authorization-code broker.
//!
//! Signed single-use state, a provider registry, and the callback pipeline that turns an
//! authorization code into a token and a normalized profile.

mod manager;
mod nonce;
mod profile;
mod provider;
mod state;
mod token;

pub mod providers;

pub use manager::{CallbackOutcome, FlowStart, ManagerConfig, OAuthManager};
pub use nonce::{InMemoryNonceStore, NonceStore};
pub use profile::{select_email, EmailCandidate, Profile};
pub use provider::Provider;
pub use state::{FlowState, StateCodec};
pub use token::Token;
