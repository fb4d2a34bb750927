//! Normalized identity returned by every provider.

use serde::{Deserialize, Serialize};

/// Vendor-neutral user profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Vendor's stable user identifier.
    pub provider_id: String,
    /// Registry name of the provider that produced this profile.
    pub provider: String,
    pub email: Option<String>,
    pub email_verified: bool,
    pub display_name: Option<String>,
    pub username: String,
    pub avatar_url: Option<String>,
    pub profile_url: Option<String>,
    /// The vendor payload the profile was built from.
    pub raw: serde_json::Value,
}

/// One address from a vendor's email listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailCandidate {
    pub address: String,
    pub primary: bool,
    pub verified: bool,
}

/// Picks the address a profile reports.
///
/// First primary and verified address, else first verified address, else none. An
/// unverified address is never selected, even when it is the primary one.
pub fn select_email(candidates: &[EmailCandidate]) -> Option<&EmailCandidate> {
    candidates
        .iter()
        .find(|c| c.primary && c.verified)
        .or_else(|| candidates.iter().find(|c| c.verified))
}
