// Allow common clippy pedantic lints that aren't critical for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ref_option)]
#![allow(clippy::unused_self)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::items_after_statements)]
#![allow(clippy::unnecessary_wraps)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::unused_async)]

//! # listrak-sync
//!
//! Incremental, resumable extraction of the Listrak email API.
//!
//! Every entity hangs off a contact list. The orchestrator walks the lists
//! in ascending id order and, inside each list, syncs the selected entities
//! in a fixed dependency order, so that children always see their parents'
//! records. Progress is recorded in a state document:
//!
//! - **bookmarks** - per-scope watermarks (`contacts/12/Subscribed`)
//! - **checkpoint** - the last completed `(list, entity)` step
//!
//! A crashed run restarts after its last checkpoint and re-requests each
//! scope from its bookmark, so output is at-least-once.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use listrak_sync::{
//!     config::TapConfig, engine::{SyncConfig, SyncEngine}, output::JsonLinesSink,
//!     selection, state::StateManager, streams, transport::ListrakClient,
//! };
//!
//! #[tokio::main]
//! async fn main() -> listrak_sync::Result<()> {
//!     let config = TapConfig::from_file("config.json")?;
//!     let selection = selection::resolve(["contacts"], &streams::dependency_table())?;
//!     let state = StateManager::from_file("state.json")?;
//!
//!     let client = ListrakClient::new(&config)?;
//!     let mut engine = SyncEngine::new(client, state, SyncConfig::from_tap_config(&config));
//!     let stats = engine.run(&selection, &mut JsonLinesSink::stdout()).await?;
//!     println!("{} records", stats.records_emitted);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │  cli  →  selection  →  engine (lists → per-list entity order) │
//! └───────────────────────────────────────────────────────────────┘
//!                               │
//! ┌───────────┬─────────────┬───┴────────┬───────────┬──────────┐
//! │ transport │ pagination  │   state    │  enrich   │  output  │
//! ├───────────┼─────────────┼────────────┼───────────┼──────────┤
//! │ OAuth2    │ cursor      │ bookmarks  │ parent    │ SCHEMA   │
//! │ retry     │ single page │ checkpoint │ keys      │ RECORD   │
//! │ rate limit│             │            │           │ STATE    │
//! └───────────┴─────────────┴────────────┴───────────┴──────────┘
//! ```

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]

// ============================================================================
// Module declarations
// ============================================================================

/// Error types
pub mod error;

/// Common types and type aliases
pub mod types;

/// OAuth2 client-credentials authentication
pub mod auth;

/// HTTP client with retry and rate limiting
pub mod http;

/// Cursor pagination
pub mod pagination;

/// Request/response seam to the Listrak API
pub mod transport;

/// Entity definitions and dependency table
pub mod streams;

/// Dependency-closed stream selection
pub mod selection;

/// Parent-key enrichment of records
pub mod enrich;

/// Bookmarks, checkpoint and persistence
pub mod state;

/// SCHEMA / RECORD / STATE output
pub mod output;

/// Sync orchestrator
pub mod engine;

/// Run configuration and catalog
pub mod config;

/// Path templating
pub mod template;

/// Command-line interface
pub mod cli;

// ============================================================================
// Re-exports
// ============================================================================

pub use error::{Error, ErrorClass, Result};
pub use types::*;

pub use engine::{SyncConfig, SyncEngine, SyncStats};
pub use selection::Selection;
pub use state::StateManager;
pub use transport::{ListrakClient, Transport};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name
pub const NAME: &str = env!("CARGO_PKG_NAME");
