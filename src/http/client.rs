//! HTTP client with retry and rate limiting
//!
//! Every call goes through [`HttpClient::get_json`]: throttle, authorize,
//! send, classify the status, decode. Transient failures are retried per the
//! [`RetryPolicy`]; everything else is returned on the first attempt.

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::auth::{AuthConfig, Authenticator};
use crate::config::HttpConfig;
use crate::error::{Error, Result};
use crate::types::BackoffType;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};

/// When and how long to wait before another attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffType,
    pub initial_backoff: Duration,
    /// Cap for a single delay
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            backoff: BackoffType::Exponential,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    /// Backoff before retry number `attempt + 1`
    pub fn delay(&self, attempt: u32) -> Duration {
        let delay = match self.backoff {
            BackoffType::Constant => self.initial_backoff,
            BackoffType::Linear => self.initial_backoff.saturating_mul(attempt.saturating_add(1)),
            BackoffType::Exponential => self
                .initial_backoff
                .saturating_mul(2u32.saturating_pow(attempt)),
        };
        delay.min(self.max_backoff)
    }

    /// Delay after `error`; the server's Retry-After wins over backoff
    fn delay_after(&self, error: &Error, attempt: u32) -> Duration {
        match error {
            Error::RateLimited {
                retry_after_seconds,
            } => Duration::from_secs(*retry_after_seconds),
            _ => self.delay(attempt),
        }
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Prefix for relative paths
    pub base_url: Option<String>,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    /// `None` disables throttling
    pub rate_limit: Option<RateLimiterConfig>,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(300),
            retry: RetryPolicy::default(),
            rate_limit: Some(RateLimiterConfig::default()),
            user_agent: format!("listrak-sync/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    /// Build from the `http` block of the run configuration
    pub fn from_http_config(http: &HttpConfig, base_url: impl Into<String>) -> Self {
        let builder = Self::builder()
            .base_url(base_url)
            .timeout(Duration::from_secs(http.timeout_secs))
            .max_retries(http.max_retries)
            .backoff(
                http.backoff,
                Duration::from_millis(http.initial_backoff_ms),
                Duration::from_secs(http.max_backoff_secs),
            );

        match http.requests_per_second {
            Some(rps) => builder.rate_limit(RateLimiterConfig::per_second(rps)),
            None => builder.no_rate_limit(),
        }
        .build()
    }
}

#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    #[must_use]
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.retry.max_retries = retries;
        self
    }

    #[must_use]
    pub fn backoff(mut self, backoff: BackoffType, initial: Duration, max: Duration) -> Self {
        self.config.retry.backoff = backoff;
        self.config.retry.initial_backoff = initial;
        self.config.retry.max_backoff = max;
        self
    }

    #[must_use]
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    #[must_use]
    pub fn no_rate_limit(mut self) -> Self {
        self.config.rate_limit = None;
        self
    }

    #[must_use]
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// JSON-over-HTTP client for the Listrak API
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    authenticator: Option<Authenticator>,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// An unauthenticated client
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;
        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            authenticator: None,
            rate_limiter,
        })
    }

    /// A client whose requests are authorized per `auth`
    ///
    /// Token requests share the connection pool but not the rate limiter.
    pub fn with_auth(config: HttpClientConfig, auth: AuthConfig) -> Result<Self> {
        let mut client = Self::with_config(config)?;
        client.authenticator = Some(Authenticator::with_client(auth, client.client.clone()));
        Ok(client)
    }

    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// GET `path` with `query` and decode the JSON body
    ///
    /// An undecodable body is treated like a 5xx and retried.
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(String, String)],
    ) -> Result<T> {
        let url = self.url(path);
        let policy = self.config.retry;
        let mut attempt = 0;

        loop {
            let outcome = match self.send(&url, query).await {
                Ok(response) => response
                    .json::<T>()
                    .await
                    .map_err(|e| Error::decode(format!("{url}: {e}"))),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(body) => return Ok(body),
                Err(e) if e.is_retryable() && attempt < policy.max_retries => {
                    let delay = policy.delay_after(&e, attempt);
                    attempt += 1;
                    warn!(
                        url = %url,
                        error = %e,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "Request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// One attempt, with the status already classified
    async fn send(&self, url: &str, query: &[(String, String)]) -> Result<Response> {
        if let Some(limiter) = &self.rate_limiter {
            limiter.wait().await;
        }

        let mut req = self.client.get(url).timeout(self.config.timeout);
        if !query.is_empty() {
            req = req.query(query);
        }
        if let Some(auth) = &self.authenticator {
            req = auth.authorize(req).await?;
        }

        let response = req.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout {
                    timeout_ms: self.config.timeout.as_millis() as u64,
                }
            } else {
                Error::Http(e)
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "Request succeeded");
            return Ok(response);
        }

        if matches!(status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            if let Some(auth) = &self.authenticator {
                auth.invalidate().await;
            }
        }
        Err(self.status_error(response).await)
    }

    /// Map a non-success response to its error class
    async fn status_error(&self, response: Response) -> Error {
        match response.status() {
            StatusCode::TOO_MANY_REQUESTS => Error::RateLimited {
                retry_after_seconds: retry_after(&response)
                    .unwrap_or_else(|| self.config.retry.initial_backoff.as_secs().max(1)),
            },
            StatusCode::NOT_FOUND => Error::not_found(response.url().path()),
            status => {
                let body = response.text().await.unwrap_or_default();
                Error::http_status(status.as_u16(), body)
            }
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        match &self.config.base_url {
            Some(base) => format!(
                "{}/{}",
                base.trim_end_matches('/'),
                path.trim_start_matches('/')
            ),
            None => path.to_string(),
        }
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("authenticator", &self.authenticator)
            .field("rate_limiter", &self.rate_limiter)
            .finish_non_exhaustive()
    }
}

/// Retry-After header in whole seconds
fn retry_after(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}
