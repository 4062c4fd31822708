//! Transport seam
//!
//! The orchestrator only ever asks for one page of one endpoint at a time.
//! `ListrakClient` answers over HTTP; tests substitute scripted transports.

use crate::auth::AuthConfig;
use crate::config::TapConfig;
use crate::error::{Error, Result};
use crate::http::{HttpClient, HttpClientConfig};
use crate::pagination::{Page, PageCursor, PaginationStyle};
use crate::types::{JsonValue, Record};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

/// One endpoint to page through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    /// Stream the records belong to
    pub stream: String,
    /// Rendered endpoint path
    pub path: String,
    /// Query parameters sent with every page
    pub params: Vec<(String, String)>,
    /// How the endpoint is paged
    pub style: PaginationStyle,
}

impl PageRequest {
    /// A single-request endpoint
    pub fn new(stream: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            stream: stream.into(),
            path: path.into(),
            params: Vec::new(),
            style: PaginationStyle::None,
        }
    }

    /// Add a query parameter
    #[must_use]
    pub fn param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Set the pagination style
    #[must_use]
    pub fn style(mut self, style: PaginationStyle) -> Self {
        self.style = style;
        self
    }

    /// Value of a query parameter
    pub fn get_param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Source of pages
///
/// Implementations retry [`ErrorClass::Transient`](crate::error::ErrorClass)
/// failures themselves and return only final outcomes; callers branch on
/// `Error::class()`.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Fetch the page of `request` at `cursor`
    async fn fetch_page(&self, request: &PageRequest, cursor: &PageCursor) -> Result<Page>;
}

/// Listrak response envelope
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    data: JsonValue,
    #[serde(rename = "nextPageCursor", default)]
    next_page_cursor: Option<String>,
}

fn into_records(data: JsonValue) -> Vec<Record> {
    match data {
        JsonValue::Array(items) => items,
        JsonValue::Null => Vec::new(),
        other => vec![other],
    }
}

/// Listrak email API over HTTP with OAuth2 client credentials
#[derive(Debug)]
pub struct ListrakClient {
    http: HttpClient,
}

impl ListrakClient {
    /// Build a client from the run configuration
    pub fn new(config: &TapConfig) -> Result<Self> {
        let http_config = HttpClientConfig::from_http_config(&config.http, &config.base_url);
        let http = HttpClient::with_auth(http_config, AuthConfig::from_tap_config(config))?;
        Ok(Self { http })
    }

    /// Wrap a preconfigured HTTP client
    pub fn with_http(http: HttpClient) -> Self {
        Self { http }
    }

    /// Verify credentials and connectivity
    ///
    /// Obtains an access token and fetches the list collection once.
    pub async fn check(&self) -> Result<()> {
        if let Some(auth) = self.http.authenticator() {
            if auth.config().needs_token() {
                auth.token().await.map_err(|e| Error::ConnectionCheck {
                    message: format!("authentication failed: {e}"),
                })?;
            }
        }

        let request = PageRequest::new(crate::streams::LISTS, "/List");
        let page = self
            .fetch_page(&request, &PageCursor::Start)
            .await
            .map_err(|e| Error::ConnectionCheck {
                message: format!("list request failed: {e}"),
            })?;

        info!(lists = page.len(), "Connection check passed");
        Ok(())
    }
}

#[async_trait]
impl Transport for ListrakClient {
    async fn fetch_page(&self, request: &PageRequest, cursor: &PageCursor) -> Result<Page> {
        let mut query = request.params.clone();
        query.extend(request.style.request_params(cursor));

        let envelope: Envelope = self.http.get_json(&request.path, &query).await?;
        let records = into_records(envelope.data);
        let next_cursor =
            request
                .style
                .next_cursor(cursor, envelope.next_page_cursor, records.len());

        debug!(
            stream = %request.stream,
            path = %request.path,
            cursor = %cursor,
            records = records.len(),
            more = next_cursor.is_some(),
            "Fetched page"
        );

        Ok(Page {
            records,
            next_cursor,
        })
    }
}
