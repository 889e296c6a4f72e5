//! Durable counter store
//!
//! Persists the [`CounterState`] used to name activity files as a three-line
//! text file. Every save writes a temporary sibling file and renames it over
//! the canonical path, so readers see either the old or the new state.
//!
//! The store serializes its own reads and writes but does not provide an
//! atomic increment: callers read, compute the next state and save it, and
//! must run that sequence from a single writer.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use activity_core::CounterState;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::error::StorageError;

/// File-backed counter store
#[derive(Debug)]
pub struct CounterStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CounterStore {
    /// Create a store persisting to `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Path of the counter file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensure the directory holding the counter file exists
    pub async fn initialize(&self) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        Ok(())
    }

    /// Current counter state
    ///
    /// A missing or unparsable file yields [`CounterState::initial`]. Falling
    /// back after corruption restarts numbering at 1 and can collide with
    /// files already published.
    #[instrument(skip(self), fields(path = %self.path.display()))]
    pub async fn get_current(&self) -> Result<CounterState, StorageError> {
        let _guard = self.lock.lock().await;

        let text = match fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No counter file, starting from zero");
                return Ok(CounterState::initial());
            }
            Err(e) if e.kind() == ErrorKind::InvalidData => {
                warn!(error = %e, "Counter file is not text, starting from zero");
                return Ok(CounterState::initial());
            }
            Err(e) => return Err(e.into()),
        };

        match CounterState::parse(&text) {
            Some(state) => Ok(state),
            None => {
                warn!("Counter file is corrupt, starting from zero");
                Ok(CounterState::initial())
            }
        }
    }

    /// Persist `state`, atomically replacing the previous file
    #[instrument(skip(self, state), fields(counter = state.counter))]
    pub async fn save(&self, state: &CounterState) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;

        let temp_path = self.temp_path();
        {
            let mut file = File::create(&temp_path).await?;
            file.write_all(state.to_text().as_bytes()).await?;
            file.sync_all().await?;
        }

        // Atomic replace
        fs::rename(&temp_path, &self.path).await?;

        debug!(file = %state.last_generated_file, "Saved counter state");
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "counter".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}
