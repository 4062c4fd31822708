//! Run configuration and the catalog document
//!
//! [`TapConfig`] holds credentials, the start date, the activity window and
//! HTTP tuning. [`Catalog`] carries per-stream selection metadata.

use crate::error::{Error, Result};
use crate::state::parse_timestamp;
use crate::types::{BackoffType, Inclusion};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_BASE_URL: &str = "https://api.listrak.com/email/v1";
pub const DEFAULT_TOKEN_URL: &str = "https://auth.listrak.com/OAuth2/Token";

/// Run configuration loaded from JSON or YAML
///
/// Every field is optional in the document; the required ones are enforced
/// by [`validate`](Self::validate) so that a missing field is reported by name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TapConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Lower bound for the first-ever sync (ISO-8601)
    pub start_date: String,
    /// Activity look-back window in days
    pub num_activity_days: i64,
    pub base_url: String,
    pub token_url: String,
    /// Records requested per page
    pub page_size: u32,
    pub http: HttpConfig,
}

impl Default for TapConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            client_secret: String::new(),
            start_date: String::new(),
            num_activity_days: 7,
            base_url: DEFAULT_BASE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            page_size: 5000,
            http: HttpConfig::default(),
        }
    }
}

impl TapConfig {
    /// Parse a config document, choosing YAML or JSON by the file extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("Failed to read config file: {e}")))?;

        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"));

        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse an inline JSON config
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| Error::config(format!("Invalid config JSON: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Check required fields and value formats
    pub fn validate(&self) -> Result<()> {
        for (field, value) in [
            ("start_date", &self.start_date),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
        ] {
            if value.trim().is_empty() {
                return Err(Error::missing_field(field));
            }
        }

        if parse_timestamp(&self.start_date).is_none() {
            return Err(Error::invalid_value(
                "start_date",
                format!("'{}' is not an ISO-8601 date", self.start_date),
            ));
        }

        if self.num_activity_days < 0 {
            return Err(Error::invalid_value(
                "num_activity_days",
                "must not be negative",
            ));
        }

        if self.page_size == 0 {
            return Err(Error::invalid_value("page_size", "must be positive"));
        }

        for (field, value) in [("base_url", &self.base_url), ("token_url", &self.token_url)] {
            url::Url::parse(value).map_err(|e| Error::invalid_value(field, e.to_string()))?;
        }

        Ok(())
    }
}

/// Timeouts, retries and throttling for API calls
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub timeout_secs: u64,
    /// Retries after the first attempt
    pub max_retries: u32,
    pub backoff: BackoffType,
    pub initial_backoff_ms: u64,
    /// Cap for a single backoff delay
    pub max_backoff_secs: u64,
    /// `null` disables the limiter
    pub requests_per_second: Option<u32>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            max_retries: 4,
            backoff: BackoffType::Exponential,
            initial_backoff_ms: 2000,
            max_backoff_secs: 60,
            requests_per_second: Some(10),
        }
    }
}

/// Catalog of streams with selection metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default)]
    pub streams: Vec<CatalogEntry>,
}

impl Catalog {
    /// Load a catalog document from a file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::config(format!("Failed to read catalog file: {e}")))?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Entry for `tap_stream_id`, if listed
    pub fn get_stream(&self, tap_stream_id: &str) -> Option<&CatalogEntry> {
        self.streams
            .iter()
            .find(|s| s.tap_stream_id == tap_stream_id)
    }

    /// Ids of all streams whose root metadata carries `selected: true`
    pub fn selected_stream_ids(&self) -> Vec<&str> {
        self.streams
            .iter()
            .filter(|s| s.is_selected())
            .map(|s| s.tap_stream_id.as_str())
            .collect()
    }
}

/// One stream of a catalog document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub tap_stream_id: String,

    #[serde(default)]
    pub stream: String,

    #[serde(default)]
    pub key_properties: Vec<String>,

    #[serde(default)]
    pub schema: serde_json::Value,

    #[serde(default)]
    pub metadata: Vec<MetadataEntry>,
}

impl CatalogEntry {
    /// Root (stream-level) metadata, if present
    pub fn root_metadata(&self) -> Option<&FieldMetadata> {
        self.metadata
            .iter()
            .find(|m| m.breadcrumb.is_empty())
            .map(|m| &m.metadata)
    }

    /// Whether the stream is selected for this run
    pub fn is_selected(&self) -> bool {
        self.root_metadata()
            .and_then(|m| m.selected)
            .unwrap_or(false)
    }
}

/// A single metadata entry keyed by breadcrumb
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataEntry {
    /// Path to the element (empty = stream root)
    #[serde(default)]
    pub breadcrumb: Vec<String>,

    #[serde(default)]
    pub metadata: FieldMetadata,
}

/// Metadata values attached to a breadcrumb
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected: Option<bool>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inclusion: Option<Inclusion>,

    /// Primary key fields (stream root only)
    #[serde(
        default,
        rename = "table-key-properties",
        skip_serializing_if = "Option::is_none"
    )]
    pub table_key_properties: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn base_config() -> serde_json::Value {
        json!({
            "client_id": "id",
            "client_secret": "secret",
            "start_date": "2024-01-01T00:00:00Z"
        })
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = TapConfig::from_json(&base_config().to_string()).unwrap();
        assert_eq!(config.num_activity_days, 7);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.token_url, DEFAULT_TOKEN_URL);
        assert_eq!(config.page_size, 5000);
        assert_eq!(config.http.max_retries, 4);
        assert_eq!(config.http.requests_per_second, Some(10));
    }

    #[test]
    fn test_missing_required_field() {
        let mut value = base_config();
        value.as_object_mut().unwrap().remove("client_secret");

        let err = TapConfig::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::MissingConfigField { ref field } if field == "client_secret"));
    }

    #[test]
    fn test_invalid_start_date() {
        let mut value = base_config();
        value["start_date"] = json!("last tuesday");

        let err = TapConfig::from_json(&value.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { ref field, .. } if field == "start_date"));
    }

    #[test]
    fn test_invalid_base_url() {
        let mut config = base_config();
        config["base_url"] = json!("not a url");
        let err = TapConfig::from_json(&config.to_string()).unwrap_err();
        assert!(matches!(err, Error::InvalidConfigValue { ref field, .. } if field == "base_url"));
    }

    #[test]
    fn test_yaml_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            "client_id: id\nclient_secret: secret\nstart_date: \"2024-01-01\"\nnum_activity_days: 30\nhttp:\n  requests_per_second: null\n",
        )
        .unwrap();

        let config = TapConfig::from_file(&path).unwrap();
        assert_eq!(config.num_activity_days, 30);
        assert!(config.http.requests_per_second.is_none());
    }

    #[test]
    fn test_catalog_selection() {
        let catalog: Catalog = serde_json::from_value(json!({
            "streams": [
                {
                    "tap_stream_id": "lists",
                    "stream": "lists",
                    "key_properties": ["listId"],
                    "schema": {},
                    "metadata": [
                        {"breadcrumb": [], "metadata": {"selected": true}},
                        {"breadcrumb": ["properties", "listId"], "metadata": {"inclusion": "automatic"}}
                    ]
                },
                {
                    "tap_stream_id": "contacts",
                    "stream": "contacts",
                    "metadata": [
                        {"breadcrumb": [], "metadata": {"selected": false}}
                    ]
                },
                {
                    "tap_stream_id": "campaigns",
                    "stream": "campaigns"
                }
            ]
        }))
        .unwrap();

        assert_eq!(catalog.selected_stream_ids(), vec!["lists"]);
        assert!(catalog.get_stream("contacts").is_some());
        assert!(!catalog.get_stream("campaigns").unwrap().is_selected());
        assert!(catalog.get_stream("messages").is_none());
    }
}
