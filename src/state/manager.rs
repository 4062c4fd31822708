//! State manager implementation
//!
//! Owns the state document for a run. When backed by a file, every bookmark
//! advance and checkpoint update is written through before the call returns.

use super::types::{BookmarkKey, Checkpoint, State, Watermark};
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Loads, updates and persists the sync state
#[derive(Debug, Clone)]
pub struct StateManager {
    /// Backing file; `None` keeps the state in memory only
    path: Option<PathBuf>,
    state: State,
    /// Persist after every update instead of only on [`save`](Self::save)
    write_through: bool,
}

impl StateManager {
    /// A fresh state persisted to `path` on every update
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            state: State::new(),
            write_through: true,
        }
    }

    /// A fresh state persisted to `path` only when [`save`](Self::save) is called
    pub fn without_auto_save(path: impl Into<PathBuf>) -> Self {
        Self {
            write_through: false,
            ..Self::new(path)
        }
    }

    pub fn in_memory() -> Self {
        Self::with_state(State::new())
    }

    /// In-memory manager seeded with `state`
    pub fn with_state(state: State) -> Self {
        Self {
            path: None,
            state,
            write_through: false,
        }
    }

    /// Load `path`, starting empty when it is missing or blank
    pub fn from_file(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut state = State::new();

        if path.exists() {
            let contents = std::fs::read_to_string(&path).map_err(|e| {
                Error::state(format!("Cannot read state file {}: {e}", path.display()))
            })?;
            if !contents.trim().is_empty() {
                state = parse(&contents)?;
            }
        }
        Ok(Self {
            state,
            ..Self::new(path)
        })
    }

    /// In-memory manager seeded from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(Self::with_state(parse(json)?))
    }

    /// Persist to the backing file, if any
    pub async fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.persist(path).await,
            None => Ok(()),
        }
    }

    /// Temp file, fsync, rename: the target always holds a whole document
    async fn persist(&self, path: &Path) -> Result<()> {
        let contents = serde_json::to_vec_pretty(&self.state)
            .map_err(|e| Error::state(format!("Cannot serialize state: {e}")))?;
        let staging = path.with_extension("tmp");
        let fail = |step: &str, e: std::io::Error| {
            Error::checkpoint(format!("{step} {}: {e}", staging.display()))
        };

        let mut file = tokio::fs::File::create(&staging)
            .await
            .map_err(|e| fail("create", e))?;
        file.write_all(&contents)
            .await
            .map_err(|e| fail("write", e))?;
        file.sync_all().await.map_err(|e| fail("sync", e))?;
        drop(file);
        tokio::fs::rename(&staging, path)
            .await
            .map_err(|e| fail("rename", e))?;

        debug!(path = %path.display(), "State saved");
        Ok(())
    }

    async fn updated(&self) -> Result<()> {
        if self.write_through {
            self.save().await
        } else {
            Ok(())
        }
    }

    pub fn state(&self) -> &State {
        &self.state
    }

    pub fn to_value(&self) -> Result<serde_json::Value> {
        serde_json::to_value(&self.state)
            .map_err(|e| Error::state(format!("Cannot serialize state: {e}")))
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(&self.state)
            .map_err(|e| Error::state(format!("Cannot serialize state: {e}")))
    }

    /// Watermark for a key, defaulting to (and never below) `start`
    pub fn bookmark(&self, key: &BookmarkKey, start: &Watermark) -> Watermark {
        self.state.bookmarks.get(key, start)
    }

    /// Advance a watermark; returns whether it moved
    pub async fn set_bookmark(&mut self, key: &BookmarkKey, watermark: Watermark) -> Result<bool> {
        let moved = self.state.bookmarks.set(key, watermark);
        if moved {
            self.updated().await?;
        }
        Ok(moved)
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.state.checkpoint
    }

    pub async fn write_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<()> {
        self.state.checkpoint = checkpoint;
        self.updated().await
    }

    pub async fn clear_checkpoint(&mut self) -> Result<()> {
        self.write_checkpoint(Checkpoint::default()).await
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn is_in_memory(&self) -> bool {
        self.path.is_none()
    }
}

fn parse(json: &str) -> Result<State> {
    serde_json::from_str(json).map_err(|e| Error::state(format!("Malformed state document: {e}")))
}
