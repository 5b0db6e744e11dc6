use std::sync::atomic::{AtomicU64, Ordering};

use engine_logging::{engine_debug, engine_info};
use harvester_core::ItemOutcome;
use harvester_engine::{HarvestEvent, ProgressSink};

const STATUS_EVERY: u64 = 10;

/// Renders engine events as log lines and keeps running totals.
#[derive(Debug, Default)]
pub struct LogProgressSink {
    finished: AtomicU64,
    failed: AtomicU64,
    attachments: AtomicU64,
}

impl LogProgressSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn finished(&self) -> u64 {
        self.finished.load(Ordering::Relaxed)
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn attachments(&self) -> u64 {
        self.attachments.load(Ordering::Relaxed)
    }
}

impl ProgressSink for LogProgressSink {
    fn emit(&self, event: HarvestEvent) {
        match event {
            HarvestEvent::PageScanned {
                page_index,
                entries,
            } => engine_debug!("[page {}] {} entries listed", page_index, entries),
            HarvestEvent::ItemStarted {
                page_index, title, ..
            } => engine_debug!("[page {}] opening {:?}", page_index, title),
            HarvestEvent::AttachmentSaved { .. } => {
                self.attachments.fetch_add(1, Ordering::Relaxed);
            }
            HarvestEvent::AttachmentSkipped {
                identity, index, ..
            } => engine_debug!("attachment #{} of {} skipped", index + 1, identity),
            HarvestEvent::ItemFinished { outcome, .. } => {
                if matches!(outcome, ItemOutcome::Failed { .. }) {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                }
                let finished = self.finished.fetch_add(1, Ordering::Relaxed) + 1;
                if finished % STATUS_EVERY == 0 {
                    engine_info!(
                        "... {} entries handled this run ({} failed, {} attachments)",
                        finished,
                        self.failed(),
                        self.attachments()
                    );
                }
            }
            HarvestEvent::BatchFlushed { .. } | HarvestEvent::PageAdvanced { .. } => {}
            HarvestEvent::CheckpointSaved { seen, total_count } => {
                engine_debug!("checkpoint: {} seen, {} records", seen, total_count)
            }
        }
    }
}
