//! Persisted {state, log offset} snapshots of the keyed store.
//!
//! Files are written to a sibling `.tmp` path, synced, then renamed over the
//! target, so a reader sees either the previous checkpoint or the new one.

use anyhow::{Context, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::store::CityAggregateState;

pub const CHECKPOINT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Checkpoint {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    /// Highest offset handed to the engine when the checkpoint was taken.
    /// Informational: replay decisions use each city's own `lastOffset`.
    pub log_offset: Option<u64>,
    pub cities: BTreeMap<String, CityAggregateState>,
}

impl Checkpoint {
    pub fn new(log_offset: Option<u64>, cities: BTreeMap<String, CityAggregateState>) -> Self {
        Self {
            version: CHECKPOINT_VERSION,
            saved_at: Utc::now(),
            log_offset,
            cities,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CheckpointFile {
    path: PathBuf,
}

impl CheckpointFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        self.write(checkpoint).map_err(|source| self.error(source))?;
        debug!(
            path = %self.path.display(),
            cities = checkpoint.cities.len(),
            log_offset = ?checkpoint.log_offset,
            "Checkpoint written"
        );
        Ok(())
    }

    /// Loads the checkpoint, or `None` if none has been written yet.
    pub fn load(&self) -> Result<Option<Checkpoint>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let checkpoint = self.read().map_err(|source| self.error(source))?;
        info!(
            path = %self.path.display(),
            cities = checkpoint.cities.len(),
            log_offset = ?checkpoint.log_offset,
            saved_at = %checkpoint.saved_at,
            "Checkpoint loaded"
        );
        Ok(Some(checkpoint))
    }

    fn write(&self, checkpoint: &Checkpoint) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("creating {}", parent.display()))?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        let file = File::create(&tmp_path)
            .with_context(|| format!("creating {}", tmp_path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer(&mut writer, checkpoint)?;
        writer.flush()?;
        writer.get_ref().sync_all()?;

        fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming {}", tmp_path.display()))?;
        Ok(())
    }

    fn read(&self) -> anyhow::Result<Checkpoint> {
        let content = fs::read_to_string(&self.path)?;
        let checkpoint: Checkpoint = serde_json::from_str(&content)?;
        if checkpoint.version != CHECKPOINT_VERSION {
            bail!(
                "unsupported checkpoint version {} (expected {})",
                checkpoint.version,
                CHECKPOINT_VERSION
            );
        }
        Ok(checkpoint)
    }

    fn error(&self, source: anyhow::Error) -> PipelineError {
        PipelineError::Checkpoint {
            path: self.path.display().to_string(),
            source,
        }
    }
}
