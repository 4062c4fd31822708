//! State types for tracking sync progress
//!
//! These types are serialized to JSON and persisted between runs.

use super::bookmarks::BookmarkStore;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Complete persisted state document
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    /// Watermarks keyed by entity and scope
    #[serde(default)]
    pub bookmarks: BookmarkStore,

    /// Resume position of the last completed step
    #[serde(default)]
    pub checkpoint: Checkpoint,
}

impl State {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }
}

/// Orchestrator resume position
///
/// `current_entity_name == None` with a parent set means the parent was
/// entered but no entity within it has completed yet.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Parent (list) being processed
    #[serde(default)]
    pub current_parent_id: Option<String>,

    /// Last entity completed within that parent
    #[serde(default)]
    pub current_entity_name: Option<String>,
}

impl Checkpoint {
    /// A checkpoint for a freshly entered parent
    pub fn in_parent(parent_id: impl Into<String>) -> Self {
        Self {
            current_parent_id: Some(parent_id.into()),
            current_entity_name: None,
        }
    }

    /// A checkpoint after an entity completed within a parent
    pub fn completed(parent_id: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            current_parent_id: Some(parent_id.into()),
            current_entity_name: Some(entity.into()),
        }
    }

    /// Whether there is no resume position
    pub fn is_clear(&self) -> bool {
        self.current_parent_id.is_none()
    }
}

// ============================================================================
// Bookmark keys
// ============================================================================

/// Address of a watermark: entity plus optional scope parts
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BookmarkKey {
    entity: String,
    scope: Vec<String>,
}

impl BookmarkKey {
    /// A single watermark for the whole entity
    pub fn global(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            scope: Vec::new(),
        }
    }

    /// A watermark scoped by e.g. list id and subscription state
    pub fn scoped<I, S>(entity: impl Into<String>, scope: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            scope: scope.into_iter().map(Into::into).collect(),
        }
    }

    /// Entity name
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Scope parts
    pub fn scope(&self) -> &[String] {
        &self.scope
    }
}

impl fmt::Display for BookmarkKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.entity)?;
        for part in &self.scope {
            write!(f, "/{part}")?;
        }
        Ok(())
    }
}

// ============================================================================
// Watermarks
// ============================================================================

/// A bookmark value: an ISO-8601 timestamp or an opaque cursor
///
/// Values that parse as timestamps compare chronologically, so
/// `2024-03-01T00:00:00Z` and `2024-03-01T00:00:00+00:00` are equal.
/// Anything else falls back to string ordering.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(String);

impl Watermark {
    /// Wrap a raw value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Watermark for the current instant
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Watermark for a given instant
    pub fn from_datetime(at: DateTime<Utc>) -> Self {
        Self(at.to_rfc3339())
    }

    /// Raw value
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Parsed instant, if this is a timestamp
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.0)
    }
}

/// Timestamps compare chronologically. Values that do not parse rank below
/// every timestamp and compare lexically among themselves.
impl Ord for Watermark {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.timestamp(), other.timestamp()) {
            (Some(a), Some(b)) => a.cmp(&b),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => self.0.cmp(&other.0),
        }
    }
}

impl PartialOrd for Watermark {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Watermark {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Watermark {}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Watermark {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Watermark {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Parse the date formats the API and configs use
///
/// Accepts RFC 3339, zone-less date-times (read as UTC) and plain dates
/// (midnight UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn test_state_default() {
        let state = State::new();
        assert!(state.bookmarks.is_empty());
        assert!(state.checkpoint.is_clear());
    }

    #[test]
    fn test_bookmark_key_display() {
        assert_eq!(BookmarkKey::global("message_activity").to_string(), "message_activity");
        assert_eq!(
            BookmarkKey::scoped("contacts", ["1", "Subscribed"]).to_string(),
            "contacts/1/Subscribed"
        );
    }

    #[test_case("2024-03-01T00:00:00Z" ; "rfc3339 utc")]
    #[test_case("2024-03-01T02:00:00+02:00" ; "rfc3339 offset")]
    #[test_case("2024-03-01T00:00:00" ; "naive datetime")]
    #[test_case("2024-03-01T00:00:00.000" ; "naive datetime fraction")]
    #[test_case("2024-03-01 00:00:00" ; "space separated")]
    #[test_case("2024-03-01" ; "plain date")]
    fn test_parse_timestamp_formats(input: &str) {
        let expected = DateTime::parse_from_rfc3339("2024-03-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(parse_timestamp(input), Some(expected));
    }

    #[test]
    fn test_parse_timestamp_rejects_garbage() {
        assert!(parse_timestamp("not a date").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn test_watermark_chronological_order() {
        let earlier = Watermark::new("2024-01-01");
        let later = Watermark::new("2024-03-01T00:00:00Z");
        assert!(earlier < later);

        // Different spellings of the same instant are equal
        assert_eq!(
            Watermark::new("2024-03-01T00:00:00Z"),
            Watermark::new("2024-03-01T00:00:00")
        );

        // Lexical order would get this wrong
        assert!(Watermark::new("2024-03-01T05:00:00+05:00") < Watermark::new("2024-03-01T01:00:00Z"));
    }

    #[test]
    fn test_watermark_opaque_cursor_order() {
        assert!(Watermark::new("cursor-a") < Watermark::new("cursor-b"));
    }

    #[test]
    fn test_unparsable_values_rank_below_timestamps() {
        // "zzz" sorts after "2024-..." lexically but still loses to any timestamp
        let garbage = Watermark::new("zzz");
        let early = Watermark::new("2020-01-01");
        let late = Watermark::new("2024-03-01T00:00:00Z");
        assert!(garbage < early);
        assert!(garbage < late);
        assert!(early < late);

        // The running max does not depend on arrival order
        let values = [late.clone(), garbage.clone(), early.clone()];
        let forward = values.iter().max().cloned();
        let backward = values.iter().rev().max().cloned();
        assert_eq!(forward, Some(late.clone()));
        assert_eq!(backward, Some(late));
    }

    #[test]
    fn test_state_serialization_shape() {
        let mut state = State::new();
        state.bookmarks.set(
            &BookmarkKey::scoped("contacts", ["1", "Subscribed"]),
            Watermark::new("2024-03-01"),
        );
        state.checkpoint = Checkpoint::completed("5", "campaigns");

        let value = serde_json::to_value(&state).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "bookmarks": {"contacts/1/Subscribed": "2024-03-01"},
                "checkpoint": {"current_parent_id": "5", "current_entity_name": "campaigns"}
            })
        );

        let restored: State = serde_json::from_value(value).unwrap();
        assert_eq!(restored, state);
    }
}
