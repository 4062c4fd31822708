//! Credentials and cached tokens

use crate::config::TapConfig;
use chrono::{DateTime, TimeDelta, Utc};

/// Seconds before expiry at which a cached token is refreshed
const EXPIRY_BUFFER_SECS: i64 = 30;

/// How requests are authorized
#[derive(Debug, Clone, Default)]
pub enum AuthConfig {
    #[default]
    None,

    /// Fixed bearer token
    Bearer { token: String },

    /// OAuth2 client-credentials grant
    ClientCredentials(ClientCredentials),
}

impl AuthConfig {
    /// Client-credentials auth against the configured token endpoint
    pub fn from_tap_config(config: &TapConfig) -> Self {
        Self::ClientCredentials(ClientCredentials {
            token_url: config.token_url.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        })
    }

    /// Whether a token has to be requested before the first call
    pub fn needs_token(&self) -> bool {
        matches!(self, Self::ClientCredentials(_))
    }

    pub(crate) fn kind(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Bearer { .. } => "bearer",
            Self::ClientCredentials(_) => "client_credentials",
        }
    }
}

/// Integration credentials issued by Listrak
#[derive(Clone)]
pub struct ClientCredentials {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl ClientCredentials {
    /// Form body of the token request
    pub(crate) fn form(&self) -> [(&'static str, &str); 3] {
        [
            ("grant_type", "client_credentials"),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ]
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

/// Access token with its expiry
#[derive(Debug, Clone)]
pub struct CachedToken {
    pub token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CachedToken {
    pub fn new(token: String, expires_at: Option<DateTime<Utc>>) -> Self {
        Self { token, expires_at }
    }

    /// A token valid for `seconds` from now
    pub fn expires_in(token: String, seconds: i64) -> Self {
        let expires_at =
            TimeDelta::try_seconds(seconds).and_then(|ttl| Utc::now().checked_add_signed(ttl));
        Self { token, expires_at }
    }

    /// Expired, or close enough to expiry that it should be replaced
    pub fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|expires_at| {
            Utc::now() + TimeDelta::seconds(EXPIRY_BUFFER_SECS) >= expires_at
        })
    }
}
