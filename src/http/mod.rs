//! HTTP client module
//!
//! Provides HTTP client with retry, rate limiting, and backoff strategies.
//!
//! # Features
//!
//! - **Automatic Retries**: 429, 5xx, timeouts, connection faults and
//!   malformed bodies are retried with backoff
//! - **Fatal Classes**: 401/403 and OAuth2 failures are returned at once;
//!   404 becomes `Error::NotFound`
//! - **Rate Limiting**: Token bucket rate limiter using governor
//! - **Authentication**: bearer or OAuth2 token from the auth module

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RetryPolicy};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
