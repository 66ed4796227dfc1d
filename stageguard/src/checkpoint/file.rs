//! File-backed checkpoint store.
//!
//! Each run gets `<dir>/<run_id>.checkpoint.json` holding a
//! [`CheckpointEnvelope`]. Writes go to a uniquely named temp file in the
//! same directory, are fsynced, then renamed over the previous file, so a
//! crash mid-write leaves the last good checkpoint intact.

use super::{Checkpoint, CheckpointStore};
use crate::errors::{Result, SupervisorError};
use crate::utils::{generate_uuid, is_valid_run_id};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// Version of the on-disk envelope format.
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

const FILE_SUFFIX: &str = ".checkpoint.json";

/// On-disk wrapper around a checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckpointEnvelope {
    /// Envelope format version.
    pub schema_version: u32,
    /// Hex SHA-256 of the serialized checkpoint.
    pub checksum: String,
    /// The checkpoint itself.
    pub checkpoint: Checkpoint,
}

impl CheckpointEnvelope {
    /// Wraps a checkpoint, computing its checksum.
    pub fn seal(checkpoint: Checkpoint) -> Result<Self> {
        let checksum = checksum_of(&checkpoint)?;
        Ok(Self {
            schema_version: CHECKPOINT_SCHEMA_VERSION,
            checksum,
            checkpoint,
        })
    }

    /// Verifies the envelope and returns the checkpoint it carries.
    pub fn open(self, expected_run_id: &str) -> std::result::Result<Checkpoint, String> {
        if self.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(format!(
                "unsupported schema version {} (expected {CHECKPOINT_SCHEMA_VERSION})",
                self.schema_version
            ));
        }
        let actual = checksum_of(&self.checkpoint).map_err(|e| e.to_string())?;
        if actual != self.checksum {
            return Err("checksum mismatch".to_string());
        }
        if self.checkpoint.run_id != expected_run_id {
            return Err(format!(
                "checkpoint belongs to run '{}'",
                self.checkpoint.run_id
            ));
        }
        self.checkpoint.validate()?;
        Ok(self.checkpoint)
    }
}

fn checksum_of(checkpoint: &Checkpoint) -> Result<String> {
    let bytes = serde_json::to_vec(checkpoint)?;
    Ok(hex::encode(Sha256::digest(&bytes)))
}

/// Checkpoint store writing one JSON file per run.
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    directory: PathBuf,
}

impl FileCheckpointStore {
    /// Creates a store rooted at `directory`, creating it if needed.
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        tokio::fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    /// Returns the store directory.
    #[must_use]
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Returns the checkpoint file path for a run.
    #[must_use]
    pub fn path_for(&self, run_id: &str) -> PathBuf {
        self.directory.join(format!("{run_id}{FILE_SUFFIX}"))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8], run_id: &str) -> Result<()> {
        let temp_path = self
            .directory
            .join(format!(".{run_id}.{}.tmp", generate_uuid().simple()));

        let write = async {
            let mut file = tokio::fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&temp_path, path).await
        };

        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn save(&self, checkpoint: &Checkpoint) -> Result<()> {
        if !is_valid_run_id(&checkpoint.run_id) {
            return Err(SupervisorError::Checkpoint(format!(
                "run id '{}' cannot be used as a file name",
                checkpoint.run_id
            )));
        }

        let envelope = CheckpointEnvelope::seal(checkpoint.clone())?;
        let data = serde_json::to_vec_pretty(&envelope)?;
        let path = self.path_for(&checkpoint.run_id);
        self.write_atomic(&path, &data, &checkpoint.run_id).await?;

        debug!(
            run_id = %checkpoint.run_id,
            checkpoint_id = %checkpoint.checkpoint_id,
            stages = checkpoint.stage_results.len(),
            status = %checkpoint.overall_status,
            "Checkpoint saved"
        );
        Ok(())
    }

    async fn load(&self, run_id: &str) -> Option<Checkpoint> {
        if !is_valid_run_id(run_id) {
            warn!(run_id = %run_id, "Ignoring checkpoint lookup for invalid run id");
            return None;
        }

        let path = self.path_for(run_id);
        let data = match tokio::fs::read(&path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(run_id = %run_id, path = %path.display(), error = %e, "Checkpoint unreadable, starting fresh");
                return None;
            }
        };

        let envelope: CheckpointEnvelope = match serde_json::from_slice(&data) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(run_id = %run_id, path = %path.display(), error = %e, "Checkpoint corrupt, starting fresh");
                return None;
            }
        };

        match envelope.open(run_id) {
            Ok(checkpoint) => Some(checkpoint),
            Err(reason) => {
                warn!(run_id = %run_id, path = %path.display(), reason = %reason, "Checkpoint failed validation, starting fresh");
                None
            }
        }
    }

    async fn delete(&self, run_id: &str) -> Result<bool> {
        if !is_valid_run_id(run_id) {
            return Ok(false);
        }
        match tokio::fs::remove_file(self.path_for(run_id)).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_runs(&self) -> Result<Vec<String>> {
        let mut runs = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.directory).await?;
        while let Some(entry) = dir.next_entry().await? {
            let name = entry.file_name();
            if let Some(run_id) = name.to_str().and_then(|n| n.strip_suffix(FILE_SUFFIX)) {
                if is_valid_run_id(run_id) {
                    runs.push(run_id.to_string());
                }
            }
        }
        runs.sort();
        Ok(runs)
    }
}
