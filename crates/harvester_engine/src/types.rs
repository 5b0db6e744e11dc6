use std::path::PathBuf;
use std::time::Duration;

use harvester_core::{HarvestView, ItemOutcome, RunEnd};

use crate::browser::BrowserError;
use crate::checkpoint::CheckpointError;
use crate::persist::PersistError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HarvestEvent {
    PageScanned {
        page_index: u32,
        entries: usize,
    },
    ItemStarted {
        page_index: u32,
        identity: String,
        title: String,
    },
    AttachmentSaved {
        identity: String,
        path: PathBuf,
    },
    AttachmentSkipped {
        identity: String,
        index: usize,
        reason: String,
    },
    ItemFinished {
        identity: String,
        title: String,
        outcome: ItemOutcome,
    },
    BatchFlushed {
        file_idx: u64,
        path: PathBuf,
        records: usize,
    },
    CheckpointSaved {
        seen: usize,
        total_count: u64,
    },
    PageAdvanced {
        page_index: u32,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: HarvestEvent);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgressSink;

impl ProgressSink for NoopProgressSink {
    fn emit(&self, _event: HarvestEvent) {}
}

/// Failure of one download affordance. Never affects its siblings.
#[derive(Debug, thiserror::Error)]
pub enum AffordanceError {
    #[error("no download within {0:?}")]
    DownloadTimeout(Duration),
    #[error("{0}")]
    Browser(#[from] BrowserError),
    #[error("could not save attachment: {0}")]
    Persist(#[from] PersistError),
}

/// Failure of one listing entry. The run continues with the next entry.
#[derive(Debug, thiserror::Error)]
pub enum ItemError {
    #[error("detail view did not open within {0:?}")]
    DetailNotOpened(Duration),
    #[error("content `{selector}` not available: {source}")]
    ContentMissing {
        selector: String,
        source: BrowserError,
    },
    #[error("listing link for this entry is gone")]
    LinkMissing,
    #[error("{0}")]
    Browser(#[from] BrowserError),
}

/// Failure that ends the run.
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("{0}")]
    Checkpoint(#[from] CheckpointError),
    #[error("output: {0}")]
    Persist(#[from] PersistError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub end: RunEnd,
    pub view: HarvestView,
    pub attachments_written: usize,
    pub artifacts_written: Vec<PathBuf>,
}
