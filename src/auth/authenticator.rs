//! Request authorization
//!
//! The access token from the client-credentials grant is cached and
//! replaced shortly before it expires, or after the API rejects it.

use super::types::{AuthConfig, CachedToken, ClientCredentials};
use crate::error::{Error, Result};
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Authorizes outgoing requests
pub struct Authenticator {
    config: AuthConfig,
    cached: Mutex<Option<CachedToken>>,
    client: Client,
}

impl Authenticator {
    pub fn new(config: AuthConfig) -> Self {
        Self::with_client(config, Client::new())
    }

    /// Use `client` for token requests
    pub fn with_client(config: AuthConfig, client: Client) -> Self {
        Self {
            config,
            cached: Mutex::new(None),
            client,
        }
    }

    /// Attach credentials to a request
    pub async fn authorize(&self, req: RequestBuilder) -> Result<RequestBuilder> {
        Ok(match &self.config {
            AuthConfig::None => req,
            AuthConfig::Bearer { token } => req.bearer_auth(token),
            AuthConfig::ClientCredentials(_) => req.bearer_auth(self.token().await?),
        })
    }

    /// A valid access token, requesting a new one when needed
    pub async fn token(&self) -> Result<String> {
        let credentials = match &self.config {
            AuthConfig::ClientCredentials(credentials) => credentials,
            AuthConfig::Bearer { token } => return Ok(token.clone()),
            AuthConfig::None => return Err(Error::auth("No credentials configured")),
        };

        // Held across the request so a refresh happens once
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.token.clone());
        }

        let fresh = self.request_token(credentials).await?;
        let token = fresh.token.clone();
        *cached = Some(fresh);
        Ok(token)
    }

    /// Forget the cached token so the next request fetches a new one
    pub async fn invalidate(&self) {
        if self.cached.lock().await.take().is_some() {
            debug!("Discarded cached access token");
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    /// Run the client-credentials grant
    ///
    /// 5xx from the token endpoint is a retryable HTTP status error; any
    /// other failure is a fatal OAuth2 error.
    async fn request_token(&self, credentials: &ClientCredentials) -> Result<CachedToken> {
        debug!(token_url = %credentials.token_url, "Requesting access token");

        let response = self
            .client
            .post(&credentials.token_url)
            .form(&credentials.form())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(Error::http_status(status.as_u16(), body));
            }
            return Err(Error::OAuth2 {
                message: format!(
                    "token endpoint returned {}: {body}. Check the integration's client id, \
                     secret and IP whitelist",
                    status.as_u16()
                ),
            });
        }

        let grant: TokenGrant = response.json().await.map_err(|e| Error::OAuth2 {
            message: format!("Malformed token response: {e}"),
        })?;

        info!(expires_in = ?grant.expires_in, "Obtained access token");
        Ok(match grant.expires_in {
            Some(secs) => CachedToken::expires_in(grant.access_token, secs),
            None => CachedToken::new(grant.access_token, None),
        })
    }
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator")
            .field("kind", &self.config.kind())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct TokenGrant {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}
