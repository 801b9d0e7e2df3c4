//! Durable state storage
//!
//! The whole state is rewritten on every committed detection; there is a
//! single writer, so the last write wins.

use crate::ledger::StateSnapshot;
use joinwatch_common::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Loads state at startup and persists it after each committed detection
pub trait StateStore: Send + Sync {
    /// Previously saved state, or empty state if none was saved
    fn load(&self) -> Result<StateSnapshot>;

    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;
}

/// JSON file written with temp-file + rename
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<StateSnapshot> {
        if !self.path.exists() {
            info!("No state file at {}, starting fresh", self.path.display());
            return Ok(StateSnapshot::default());
        }

        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::InvalidInput(format!("State file {} is unreadable: {}", self.path.display(), e))
        })?;
        let snapshot: StateSnapshot = serde_json::from_str(&content).map_err(|e| {
            Error::InvalidInput(format!("State file {} is corrupt: {}", self.path.display(), e))
        })?;

        info!(
            "Loaded state: {} reported events, {} communities",
            snapshot.processed_messages.len(),
            snapshot.known_users.len()
        );
        Ok(snapshot)
    }

    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let json = serde_json::to_vec_pretty(snapshot)?;
        joinwatch_common::fs::write_atomic(&self.path, &json)?;
        tracing::debug!(path = %self.path.display(), "State saved");
        Ok(())
    }
}
