//! Durable seen-set and counters.
//!
//! Two JSON shapes are accepted on load: a bare array of identities
//! (attachment mode) and `{"seen_hrefs": [...], "total_count": n, "file_idx": k}`
//! (text mode). Saves always replace the whole file atomically.
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine_logging::{engine_debug, engine_info};
use harvester_core::{Checkpoint, RunCounters, RunMode, SeenSet};
use serde::{Deserialize, Serialize};

use crate::persist::{AtomicFileWriter, PersistError};

#[derive(Debug, thiserror::Error)]
pub enum CheckpointError {
    #[error("failed to read checkpoint {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("checkpoint {path:?} is corrupt: {message}")]
    Corrupt { path: PathBuf, message: String },
    #[error("failed to write checkpoint: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(untagged)]
enum PersistedCheckpoint {
    Attachments(Vec<String>),
    Text {
        seen_hrefs: Vec<String>,
        #[serde(default)]
        total_count: u64,
        #[serde(default = "first_file_idx")]
        file_idx: u64,
    },
}

fn first_file_idx() -> u64 {
    RunCounters::default().file_idx
}

/// Owns the checkpoint file of one run mode.
#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
    mode: RunMode,
}

impl CheckpointStore {
    pub fn new(path: PathBuf, mode: RunMode) -> Self {
        Self { path, mode }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Empty state when no checkpoint exists yet.
    pub fn load(&self) -> Result<Checkpoint, CheckpointError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                engine_info!("No checkpoint at {:?}; starting fresh", self.path);
                return Ok(Checkpoint::default());
            }
            Err(source) => {
                return Err(CheckpointError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let persisted: PersistedCheckpoint =
            serde_json::from_str(&content).map_err(|err| CheckpointError::Corrupt {
                path: self.path.clone(),
                message: err.to_string(),
            })?;

        let checkpoint = match persisted {
            PersistedCheckpoint::Attachments(seen) => Checkpoint {
                seen: seen.into_iter().collect::<SeenSet>(),
                counters: None,
            },
            PersistedCheckpoint::Text {
                seen_hrefs,
                total_count,
                file_idx,
            } => Checkpoint {
                seen: seen_hrefs.into_iter().collect::<SeenSet>(),
                counters: Some(RunCounters {
                    total_count,
                    file_idx,
                }),
            },
        };
        engine_info!(
            "Loaded checkpoint {:?}: {} seen, counters {:?}",
            self.path,
            checkpoint.seen.len(),
            checkpoint.counters
        );
        Ok(checkpoint)
    }

    pub fn save(&self, checkpoint: &Checkpoint) -> Result<(), CheckpointError> {
        let seen: Vec<String> = checkpoint.seen.iter().map(str::to_string).collect();
        let persisted = match self.mode {
            RunMode::Attachments => PersistedCheckpoint::Attachments(seen),
            RunMode::Text => {
                let counters = checkpoint.counters.unwrap_or_default();
                PersistedCheckpoint::Text {
                    seen_hrefs: seen,
                    total_count: counters.total_count,
                    file_idx: counters.file_idx,
                }
            }
        };
        let content = serde_json::to_vec(&persisted).map_err(|err| {
            CheckpointError::Persist(PersistError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                err,
            )))
        })?;

        let writer = AtomicFileWriter::new(self.parent_dir());
        writer.replace(&self.file_name(), &content)?;
        engine_debug!(
            "Checkpoint saved to {:?} ({} seen)",
            self.path,
            checkpoint.seen.len()
        );
        Ok(())
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "checkpoint.json".to_string())
    }
}
