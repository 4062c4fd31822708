//! Authentication module
//!
//! Listrak integrations authenticate with the OAuth2 client-credentials
//! grant; a fixed bearer token is accepted for tests and proxies.

mod authenticator;
mod types;

pub use authenticator::Authenticator;
pub use types::{AuthConfig, CachedToken, ClientCredentials};
