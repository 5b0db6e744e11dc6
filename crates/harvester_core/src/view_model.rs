use crate::{Phase, RunMode, RunStats};

/// Read-only snapshot of a run, for progress lines and the final summary.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarvestView {
    pub mode: RunMode,
    pub phase: Phase,
    pub seen_count: usize,
    pub total_count: u64,
    pub file_idx: u64,
    pub batch_len: u64,
    pub queued: usize,
    pub stats: RunStats,
}
