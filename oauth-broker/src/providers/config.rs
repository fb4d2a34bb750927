//! Pre-configured provider settings.

use secrecy::SecretString;

/// Static configuration for one identity vendor.
///
/// Constructed once at startup. The client secret is held as a `SecretString`, so the
/// derived `Debug` output redacts it.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    /// OAuth client ID registered with the vendor.
    pub client_id: String,
    /// OAuth client secret registered with the vendor.
    pub client_secret: SecretString,
    /// Callback URL registered with the vendor. Empty means "use the registered default".
    pub redirect_uri: String,
    /// Scopes requested on the authorization URL.
    pub scopes: Vec<String>,
    /// Vendor authorization endpoint the user agent is redirected to.
    pub authorization_url: String,
    /// Vendor token endpoint.
    pub token_url: String,
    /// Vendor user resource.
    pub profile_url: String,
    /// Separate email listing endpoint, for vendors that keep emails off the user resource.
    pub emails_url: Option<String>,
    /// Extra query parameters appended to the authorization URL, in order.
    pub extra_auth_params: Vec<(String, String)>,
}

/// Get Bitbucket Cloud configuration.
///
/// # Arguments
///
/// * `client_id` - OAuth consumer key
/// * `client_secret` - OAuth consumer secret
/// * `redirect_uri` - Callback URL registered on the consumer
pub fn bitbucket_config(
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
) -> ProviderConfig {
    ProviderConfig {
        client_id,
        client_secret,
        redirect_uri,
        scopes: vec!["account".to_string(), "email".to_string()],
        authorization_url: "https://bitbucket.org/site/oauth2/authorize".to_string(),
        token_url: "https://bitbucket.org/site/oauth2/access_token".to_string(),
        profile_url: "https://api.bitbucket.org/2.0/user".to_string(),
        emails_url: Some("https://api.bitbucket.org/2.0/user/emails".to_string()),
        extra_auth_params: Vec::new(),
    }
}

/// Get GitHub configuration.
pub fn github_config(
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
) -> ProviderConfig {
    ProviderConfig {
        client_id,
        client_secret,
        redirect_uri,
        scopes: vec!["read:user".to_string(), "user:email".to_string()],
        authorization_url: "https://github.com/login/oauth/authorize".to_string(),
        token_url: "https://github.com/login/oauth/access_token".to_string(),
        profile_url: "https://api.github.com/user".to_string(),
        emails_url: Some("https://api.github.com/user/emails".to_string()),
        extra_auth_params: Vec::new(),
    }
}

/// Get Google configuration.
///
/// Requests offline access so the token response carries a refresh token.
pub fn google_config(
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
) -> ProviderConfig {
    ProviderConfig {
        client_id,
        client_secret,
        redirect_uri,
        scopes: vec![
            "openid".to_string(),
            "email".to_string(),
            "profile".to_string(),
        ],
        authorization_url: "https://accounts.google.com/o/oauth2/v2/auth".to_string(),
        token_url: "https://oauth2.googleapis.com/token".to_string(),
        profile_url: "https://openidconnect.googleapis.com/v1/userinfo".to_string(),
        emails_url: None,
        extra_auth_params: vec![
            ("access_type".to_string(), "offline".to_string()),
            ("prompt".to_string(), "consent".to_string()),
        ],
    }
}
