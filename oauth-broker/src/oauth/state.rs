//! Signed, single-use state tokens for CSRF protection.
//!
//! Token format: `base64url(json payload) "." hex(HMAC-SHA256(secret, base64url payload))`.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::debug;

use super::NonceStore;
use crate::error::{invalid_state, signing_error, Error};

type HmacSha256 = Hmac<Sha256>;

/// Hex length of an HMAC-SHA256 tag.
const SIGNATURE_HEX_LEN: usize = 64;

/// Flow context carried through the redirect round trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowState {
    /// Registry name of the provider the flow was started for.
    pub provider: String,
    /// Where the caller wants the user sent after login.
    pub return_to: String,
    /// Caller metadata, kept sorted so the encoding is deterministic.
    pub metadata: BTreeMap<String, String>,
    /// Set by the codec at issuance, millisecond precision.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub issued_at: DateTime<Utc>,
    /// Random single-use value guarding against replay.
    pub nonce: String,
}

/// Issues and validates signed state tokens.
///
/// Every issued nonce is registered in the nonce store; consuming validation removes it.
pub struct StateCodec {
    signing_secret: SecretString,
    ttl: Duration,
    nonces: Arc<dyn NonceStore>,
}

impl StateCodec {
    /// Create a codec.
    ///
    /// # Arguments
    ///
    /// * `signing_secret` - HMAC key; never logged
    /// * `ttl` - Maximum accepted age of a token
    /// * `nonces` - Store tracking outstanding nonces
    pub fn new(signing_secret: SecretString, ttl: Duration, nonces: Arc<dyn NonceStore>) -> Self {
        Self {
            signing_secret,
            ttl,
            nonces,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issue a signed state and register its nonce.
    ///
    /// # Returns
    ///
    /// The opaque token string and the state it encodes.
    pub async fn issue(
        &self,
        provider: &str,
        return_to: &str,
        metadata: BTreeMap<String, String>,
    ) -> Result<(String, FlowState), Error> {
        let state = FlowState {
            provider: provider.to_string(),
            return_to: return_to.to_string(),
            metadata,
            issued_at: now_millis(),
            nonce: generate_nonce(),
        };

        let token = self.encode(&state)?;
        self.nonces
            .register(&state.nonce, state.issued_at + self.ttl)
            .await?;

        Ok((token, state))
    }

    /// Validate a token and spend its nonce in one step.
    ///
    /// Every failure is the same invalid-state error.
    pub async fn consume(&self, token: &str) -> Result<FlowState, Error> {
        self.consume_at(token, Utc::now()).await
    }

    /// Validate a token without spending its nonce.
    ///
    /// A token whose nonce was already consumed (or evicted) is rejected here too.
    pub async fn peek(&self, token: &str) -> Result<FlowState, Error> {
        let state = self.verify_at(token, Utc::now())?;
        if !self.nonces.is_pending(&state.nonce).await? {
            debug!("Rejected state: nonce is not pending");
            return Err(invalid_state());
        }
        Ok(state)
    }

    pub(crate) async fn consume_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<FlowState, Error> {
        let state = self.verify_at(token, now)?;
        if !self.nonces.consume(&state.nonce).await? {
            debug!("Rejected state: nonce unknown or already consumed");
            return Err(invalid_state());
        }
        Ok(state)
    }

    pub(crate) fn encode(&self, state: &FlowState) -> Result<String, Error> {
        let json = serde_json::to_vec(state)
            .map_err(|e| signing_error(&format!("Failed to serialize state: {}", e)))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = hex::encode(self.mac(payload.as_bytes())?.finalize().into_bytes());

        Ok(format!("{}.{}", payload, signature))
    }

    /// Check signature and age. The payload is only decoded once the signature holds.
    pub(crate) fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<FlowState, Error> {
        let (payload, signature) = token.rsplit_once('.').ok_or_else(invalid_state)?;

        // Only the canonical lowercase form is accepted, so no two strings share a tag.
        if !is_lower_hex(signature) {
            return Err(invalid_state());
        }
        let signature = hex::decode(signature).map_err(|_| invalid_state())?;

        self.mac(payload.as_bytes())?
            .verify_slice(&signature)
            .map_err(|_| {
                debug!("Rejected state: signature mismatch");
                invalid_state()
            })?;

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| invalid_state())?;
        let state: FlowState = serde_json::from_slice(&json).map_err(|_| invalid_state())?;

        let age = now - state.issued_at;
        if age < Duration::zero() || age > self.ttl {
            debug!("Rejected state: outside validity window");
            return Err(invalid_state());
        }

        Ok(state)
    }

    fn mac(&self, payload: &[u8]) -> Result<HmacSha256, Error> {
        let mut mac = HmacSha256::new_from_slice(self.signing_secret.expose_secret().as_bytes())
            .map_err(|_| signing_error("Invalid HMAC key"))?;
        mac.update(payload);
        Ok(mac)
    }
}

/// Generate a cryptographically random nonce (256 bits, hex encoded).
fn generate_nonce() -> String {
    let random_bytes: [u8; 32] = rand::thread_rng().gen();
    hex::encode(random_bytes)
}

/// Current time truncated to what the payload encoding preserves.
fn now_millis() -> DateTime<Utc> {
    let now = Utc::now();
    DateTime::from_timestamp_millis(now.timestamp_millis()).unwrap_or(now)
}

fn is_lower_hex(s: &str) -> bool {
    s.len() == SIGNATURE_HEX_LEN && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}
