//! State management module
//!
//! Handles bookmark tracking, checkpointing, and resumability.
//! State is persisted between sync runs to enable incremental syncs.
//!
//! # Overview
//!
//! The state module provides:
//! - `State` - The persisted document: bookmarks plus resume checkpoint
//! - `BookmarkStore` - Monotonic watermarks keyed by entity and scope
//! - `StateManager` - File-based persistence and checkpoint writes

mod bookmarks;
mod manager;
mod types;

pub use bookmarks::BookmarkStore;
pub use manager::StateManager;
pub use types::{parse_timestamp, BookmarkKey, Checkpoint, State, Watermark};
