//! Bookmark store
//!
//! A flat `key -> watermark` map persisted inside the state document.
//! Writes never move a watermark backwards.

use super::types::{BookmarkKey, Watermark};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Monotonic watermark map
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookmarkStore {
    entries: BTreeMap<String, Watermark>,
}

impl BookmarkStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Watermark for a key, never earlier than `start`
    ///
    /// `start` is the run's global start date: a missing bookmark yields it,
    /// and a stored bookmark older than it is lifted to it.
    pub fn get(&self, key: &BookmarkKey, start: &Watermark) -> Watermark {
        match self.entries.get(&key.to_string()) {
            Some(stored) if stored > start => stored.clone(),
            _ => start.clone(),
        }
    }

    /// Stored watermark, without defaulting
    pub fn get_stored(&self, key: &BookmarkKey) -> Option<&Watermark> {
        self.entries.get(&key.to_string())
    }

    /// Advance a watermark
    ///
    /// Returns `true` when the stored value changed. A value that is not
    /// greater than the stored one is ignored.
    pub fn set(&mut self, key: &BookmarkKey, watermark: Watermark) -> bool {
        let key = key.to_string();
        match self.entries.get(&key) {
            Some(existing) if *existing >= watermark => {
                debug!(
                    bookmark = %key,
                    existing = %existing,
                    candidate = %watermark,
                    "Ignoring non-advancing bookmark"
                );
                false
            }
            _ => {
                self.entries.insert(key, watermark);
                true
            }
        }
    }

    /// Number of stored bookmarks
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no bookmark has been stored
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over stored `(key, watermark)` pairs in key order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Watermark)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}
