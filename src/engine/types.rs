//! Engine types
//!
//! Configuration, statistics and run phase for the sync engine.

use crate::config::TapConfig;
use crate::state::Watermark;
use std::collections::BTreeSet;
use std::fmt;

/// Configuration for sync operation
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Lower bound for every bookmark
    pub start_date: Watermark,
    /// Activity look-back window in days
    pub num_activity_days: i64,
    /// Records requested per page
    pub page_size: u32,
}

impl SyncConfig {
    /// Create a sync config with default window and page size
    pub fn new(start_date: impl Into<Watermark>) -> Self {
        Self {
            start_date: start_date.into(),
            num_activity_days: 7,
            page_size: 5000,
        }
    }

    /// Take the run parameters from the run configuration
    pub fn from_tap_config(config: &TapConfig) -> Self {
        Self::new(config.start_date.as_str())
            .with_activity_days(config.num_activity_days)
            .with_page_size(config.page_size)
    }

    /// Set the activity look-back window
    #[must_use]
    pub fn with_activity_days(mut self, days: i64) -> Self {
        self.num_activity_days = days;
        self
    }

    /// Set the page size
    #[must_use]
    pub fn with_page_size(mut self, size: u32) -> Self {
        self.page_size = size;
        self
    }
}

/// Statistics from a sync operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Records emitted
    pub records_emitted: usize,
    /// Records fetched, emitted or not
    pub records_fetched: usize,
    /// Pages fetched (detail requests included)
    pub pages_fetched: usize,
    /// Parents fully processed
    pub parents_synced: usize,
    /// Scopes that came back not-found
    pub scopes_not_found: usize,
    /// Parent messages skipped by the activity window
    pub activity_skipped: usize,
    /// Streams that emitted a schema
    pub streams: BTreeSet<String>,
    /// Duration in milliseconds
    pub duration_ms: u64,
}

impl SyncStats {
    /// Create new stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a page with its record count
    pub fn add_page(&mut self, records: usize) {
        self.pages_fetched += 1;
        self.records_fetched += records;
    }

    /// Add an emitted record
    pub fn add_emitted(&mut self) {
        self.records_emitted += 1;
    }

    /// Add a stream
    pub fn add_stream(&mut self, stream: &str) {
        self.streams.insert(stream.to_string());
    }

    /// Set duration
    pub fn set_duration(&mut self, ms: u64) {
        self.duration_ms = ms;
    }
}

/// Position of the orchestrator
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum SyncPhase {
    /// Nothing fetched yet
    #[default]
    NotStarted,
    /// Inside a parent, before any entity completed
    InParent(String),
    /// Fetching an entity within a parent
    InEntity(String, String),
    /// All parents processed and end-of-run state written
    Done,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => f.write_str("not started"),
            Self::InParent(parent) => write!(f, "in parent {parent}"),
            Self::InEntity(parent, entity) => write!(f, "in {entity} of parent {parent}"),
            Self::Done => f.write_str("done"),
        }
    }
}
