//! Error types for listrak-sync
//!
//! One enum for the whole crate. Transport failures are sorted into a closed
//! set of [`ErrorClass`]es, which is all the retry loop and the orchestrator
//! look at.

use thiserror::Error;

/// The main error type for listrak-sync
#[derive(Error, Debug)]
pub enum Error {
    // ============================================================================
    // Configuration
    // ============================================================================
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Missing required config field: {field}")]
    MissingConfigField { field: String },

    #[error("Invalid value for '{field}': {message}")]
    InvalidConfigValue { field: String, message: String },

    #[error("Invalid YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    // ============================================================================
    // Credentials
    // ============================================================================
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    #[error("OAuth2 token request failed: {message}")]
    OAuth2 { message: String },

    // ============================================================================
    // Transport
    // ============================================================================
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status}: {body}")]
    HttpStatus { status: u16, body: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Rate limited, retry after {retry_after_seconds}s")]
    RateLimited { retry_after_seconds: u64 },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Undecodable response: {message}")]
    Decode { message: String },

    // ============================================================================
    // Sync
    // ============================================================================
    #[error("Connection check failed: {message}")]
    ConnectionCheck { message: String },

    #[error("Unknown stream '{stream}'")]
    StreamNotFound { stream: String },

    #[error("Invalid dependency table: {message}")]
    Dependency { message: String },

    #[error("Undefined path variable: {variable}")]
    UndefinedVariable { variable: String },

    // ============================================================================
    // State and output
    // ============================================================================
    #[error("State error: {message}")]
    State { message: String },

    #[error("Checkpoint write failed: {message}")]
    Checkpoint { message: String },

    #[error("Output error: {message}")]
    Output { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Worth another attempt after a backoff
    Transient,
    /// The resource is gone; an empty result for that scope
    NotFound,
    /// Credentials were rejected; never retried
    Auth,
    /// Anything else; stops the run
    Fatal,
}

impl Error {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn missing_field(field: impl Into<String>) -> Self {
        Self::MissingConfigField {
            field: field.into(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidConfigValue {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    pub fn http_status(status: u16, body: impl Into<String>) -> Self {
        Self::HttpStatus {
            status,
            body: body.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    pub fn undefined_var(variable: impl Into<String>) -> Self {
        Self::UndefinedVariable {
            variable: variable.into(),
        }
    }

    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
        }
    }

    pub fn checkpoint(message: impl Into<String>) -> Self {
        Self::Checkpoint {
            message: message.into(),
        }
    }

    pub fn dependency(message: impl Into<String>) -> Self {
        Self::Dependency {
            message: message.into(),
        }
    }

    pub fn output(message: impl Into<String>) -> Self {
        Self::Output {
            message: message.into(),
        }
    }

    /// Sort this error into its handling class
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Http(_)
            | Self::RateLimited { .. }
            | Self::Timeout { .. }
            | Self::Decode { .. } => ErrorClass::Transient,
            Self::NotFound { .. } => ErrorClass::NotFound,
            Self::Auth { .. } | Self::OAuth2 { .. } => ErrorClass::Auth,
            Self::HttpStatus { status, .. } => match status {
                404 => ErrorClass::NotFound,
                401 | 403 => ErrorClass::Auth,
                429 | 500..=599 => ErrorClass::Transient,
                _ => ErrorClass::Fatal,
            },
            _ => ErrorClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    pub fn is_not_found(&self) -> bool {
        self.class() == ErrorClass::NotFound
    }

    pub fn is_auth(&self) -> bool {
        self.class() == ErrorClass::Auth
    }
}

/// Result type alias for listrak-sync
pub type Result<T> = std::result::Result<T, Error>;

/// Prefix errors with what was being attempted
pub trait ResultExt<T> {
    fn context(self, message: impl Into<String>) -> Result<T>;

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T>;
}

impl<T, E: Into<Error>> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.with_context(|| message.into())
    }

    fn with_context<F: FnOnce() -> String>(self, f: F) -> Result<T> {
        self.map_err(|e| Error::Other(format!("{}: {}", f(), e.into())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(Error::http_status(429, ""), ErrorClass::Transient; "too many requests")]
    #[test_case(Error::http_status(502, ""), ErrorClass::Transient; "bad gateway")]
    #[test_case(Error::http_status(501, ""), ErrorClass::Transient; "not implemented")]
    #[test_case(Error::http_status(507, ""), ErrorClass::Transient; "insufficient storage")]
    #[test_case(Error::http_status(520, ""), ErrorClass::Transient; "cloudflare unknown")]
    #[test_case(Error::http_status(599, ""), ErrorClass::Transient; "last server status")]
    #[test_case(Error::http_status(600, ""), ErrorClass::Fatal; "out of range status")]
    #[test_case(Error::RateLimited { retry_after_seconds: 60 }, ErrorClass::Transient; "rate limited")]
    #[test_case(Error::Timeout { timeout_ms: 1000 }, ErrorClass::Transient; "timeout")]
    #[test_case(Error::decode("truncated body"), ErrorClass::Transient; "malformed body")]
    #[test_case(Error::not_found("/List/1/Message/9"), ErrorClass::NotFound; "not found")]
    #[test_case(Error::http_status(404, ""), ErrorClass::NotFound; "status 404")]
    #[test_case(Error::http_status(401, ""), ErrorClass::Auth; "unauthorized")]
    #[test_case(Error::http_status(403, ""), ErrorClass::Auth; "forbidden")]
    #[test_case(Error::auth("bad credentials"), ErrorClass::Auth; "auth")]
    #[test_case(Error::http_status(400, ""), ErrorClass::Fatal; "bad request")]
    #[test_case(Error::config("x"), ErrorClass::Fatal; "config")]
    fn test_error_class(error: Error, expected: ErrorClass) {
        assert_eq!(error.class(), expected);
        assert_eq!(error.is_retryable(), expected == ErrorClass::Transient);
        assert_eq!(error.is_not_found(), expected == ErrorClass::NotFound);
        assert_eq!(error.is_auth(), expected == ErrorClass::Auth);
    }

    #[test]
    fn test_error_display() {
        assert_eq!(
            Error::missing_field("client_id").to_string(),
            "Missing required config field: client_id"
        );
        assert_eq!(Error::http_status(503, "down").to_string(), "HTTP 503: down");
        assert_eq!(
            Error::not_found("/List/1/Message/9").to_string(),
            "Not found: /List/1/Message/9"
        );
    }

    #[test]
    fn test_result_context() {
        let result: Result<()> = Err(Error::config("inner"));
        let err = result.context("loading catalog").unwrap_err();
        assert_eq!(err.to_string(), "loading catalog: Configuration error: inner");
    }
}
