//! Batch to activity file materialization
//!
//! A batch is encoded into a staging file, published into the output
//! directory under its final name, and only then recorded in the counter
//! store. Publishing uses a hard link, which fails instead of replacing an
//! existing file and never exposes a partially written one.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use activity_core::{Batch, CounterState, SiteId, activity_file_name, encode_batch};
use activity_storage::CounterStore;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument, warn};

use crate::error::{GeneratorError, GeneratorResult};

/// Writes batches as NC activity files
#[derive(Debug, Clone)]
pub struct FileMaterializer {
    output_dir: PathBuf,
    staging_dir: PathBuf,
    site_id: SiteId,
    counter_store: Arc<CounterStore>,
}

impl FileMaterializer {
    pub fn new(
        output_dir: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        site_id: SiteId,
        counter_store: Arc<CounterStore>,
    ) -> Self {
        Self {
            output_dir: output_dir.into(),
            staging_dir: staging_dir.into(),
            site_id,
            counter_store,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn counter_store(&self) -> &Arc<CounterStore> {
        &self.counter_store
    }

    /// Create the output and staging directories and the counter directory
    pub async fn prepare(&self) -> GeneratorResult<()> {
        fs::create_dir_all(&self.output_dir).await?;
        fs::create_dir_all(&self.staging_dir).await?;
        self.counter_store.initialize().await?;
        Ok(())
    }

    /// Read the current counter and materialize `batch` after it
    pub async fn publish_next(&self, batch: &Batch) -> GeneratorResult<Option<String>> {
        let state = self.counter_store.get_current().await?;
        self.materialize(batch, &state).await
    }

    /// Materialize `batch` as the file following `state`
    ///
    /// Returns `None` for an empty batch without touching disk. The file date
    /// comes from the first event only. The counter is saved strictly after
    /// the file is published; a name that already exists in the output
    /// directory is [`GeneratorError::AlreadyPublished`].
    #[instrument(skip(self, batch, state), fields(events = batch.len(), counter = state.counter))]
    pub async fn materialize(
        &self,
        batch: &Batch,
        state: &CounterState,
    ) -> GeneratorResult<Option<String>> {
        let Some(first) = batch.first() else {
            debug!("Empty batch, nothing to write");
            return Ok(None);
        };

        let date = first.timestamp.date();
        let next_counter = state.next_counter();
        let file_name = activity_file_name(&self.site_id, date, next_counter)?;

        let staging_path = self.staging_dir.join(format!("{file_name}.tmp"));
        let final_path = self.output_dir.join(&file_name);

        let encoded = encode_batch(batch);
        {
            let mut file = File::create(&staging_path).await?;
            file.write_all(&encoded).await?;
            file.sync_all().await?;
        }

        // No-overwrite publish
        if let Err(e) = fs::hard_link(&staging_path, &final_path).await {
            discard_staging(&staging_path).await;
            if e.kind() == ErrorKind::AlreadyExists {
                return Err(GeneratorError::AlreadyPublished { file_name });
            }
            return Err(e.into());
        }
        discard_staging(&staging_path).await;

        self.counter_store
            .save(&CounterState::new(date, next_counter, file_name.clone()))
            .await?;

        info!(file = %file_name, bytes = encoded.len(), "Materialized activity file");
        Ok(Some(file_name))
    }
}

async fn discard_staging(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        warn!(path = %path.display(), error = %e, "Failed to remove staging file");
    }
}
