use std::collections::{HashSet, VecDeque};

use crate::view_model::HarvestView;
use crate::{Checkpoint, ItemOutcome, RunCounters, RunEnd, SeenSet};

/// Records per text batch artifact.
pub const DEFAULT_BATCH_SIZE: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Save every download affordance of a detail view as a file.
    #[default]
    Attachments,
    /// Collect the content block of each detail view into batch documents.
    Text,
}

/// One entry of a listing page. Only `identity` outlives the scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub identity: String,
    pub title: String,
    pub page_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Idle,
    Scanning {
        page_index: u32,
    },
    OnPage {
        page_index: u32,
    },
    CheckingNextPage {
        page_index: u32,
    },
    Advancing {
        to_page: u32,
    },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RunStats {
    pub pages_visited: u32,
    pub entries_skipped: u64,
    pub items_attempted: u64,
    pub items_harvested: u64,
    pub items_empty: u64,
    pub items_failed: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestState {
    mode: RunMode,
    seen: SeenSet,
    counters: RunCounters,
    batch_size: u64,
    batch_len: u64,
    flushing: Option<u64>,
    phase: Phase,
    queue: VecDeque<ListingEntry>,
    in_flight: Option<ListingEntry>,
    stats: RunStats,
    end: Option<RunEnd>,
}

impl Default for HarvestState {
    fn default() -> Self {
        Self::new(RunMode::default())
    }
}

impl HarvestState {
    pub fn new(mode: RunMode) -> Self {
        Self::resume(mode, Checkpoint::default())
    }

    /// Continue from a persisted checkpoint. Counters are ignored outside text mode.
    pub fn resume(mode: RunMode, checkpoint: Checkpoint) -> Self {
        let counters = match mode {
            RunMode::Text => checkpoint.counters.unwrap_or_default(),
            RunMode::Attachments => RunCounters::default(),
        };
        Self {
            mode,
            seen: checkpoint.seen,
            counters,
            batch_size: DEFAULT_BATCH_SIZE,
            batch_len: 0,
            flushing: None,
            phase: Phase::Idle,
            queue: VecDeque::new(),
            in_flight: None,
            stats: RunStats::default(),
            end: None,
        }
    }

    pub fn with_batch_size(mut self, batch_size: u64) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn seen(&self) -> &SeenSet {
        &self.seen
    }

    pub fn is_seen(&self, identity: &str) -> bool {
        self.seen.contains(identity)
    }

    pub fn counters(&self) -> RunCounters {
        self.counters
    }

    pub fn batch_size(&self) -> u64 {
        self.batch_size
    }

    pub fn batch_len(&self) -> u64 {
        self.batch_len
    }

    /// A batch reached its boundary but its artifact was never written.
    /// Its identities must not reach the checkpoint until it is.
    pub fn has_overdue_batch(&self) -> bool {
        self.mode == RunMode::Text && self.batch_len >= self.batch_size
    }

    pub fn stats(&self) -> RunStats {
        self.stats
    }

    pub fn in_flight(&self) -> Option<&ListingEntry> {
        self.in_flight.as_ref()
    }

    pub fn end(&self) -> Option<&RunEnd> {
        self.end.as_ref()
    }

    /// Snapshot of what must be persisted right now.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            seen: self.seen.clone(),
            counters: match self.mode {
                RunMode::Text => Some(self.counters),
                RunMode::Attachments => None,
            },
        }
    }

    pub fn view(&self) -> HarvestView {
        HarvestView {
            mode: self.mode,
            phase: self.phase,
            seen_count: self.seen.len(),
            total_count: self.counters.total_count,
            file_idx: self.counters.file_idx,
            batch_len: self.batch_len,
            queued: self.queue.len(),
            stats: self.stats,
        }
    }

    pub(crate) fn begin_scan(&mut self, page_index: u32) {
        self.queue.clear();
        self.phase = Phase::Scanning { page_index };
    }

    /// Queues unseen entries in listing order. Returns how many were skipped.
    pub(crate) fn enqueue_page(&mut self, page_index: u32, entries: Vec<ListingEntry>) -> u64 {
        let mut on_page = HashSet::new();
        let mut skipped = 0;
        for entry in entries {
            if self.seen.contains(&entry.identity) || !on_page.insert(entry.identity.clone()) {
                skipped += 1;
                continue;
            }
            self.queue.push_back(entry);
        }
        self.stats.entries_skipped += skipped;
        self.phase = Phase::OnPage { page_index };
        skipped
    }

    pub(crate) fn take_next(&mut self) -> Option<ListingEntry> {
        let next = self.queue.pop_front();
        self.in_flight = next.clone();
        next
    }

    pub(crate) fn is_in_flight(&self, identity: &str) -> bool {
        self.in_flight
            .as_ref()
            .is_some_and(|entry| entry.identity == identity)
    }

    /// Marks the in-flight entry seen and applies its outcome.
    /// Returns `true` when the text batch just reached its boundary.
    pub(crate) fn finish_item(&mut self, outcome: &ItemOutcome) -> bool {
        let Some(entry) = self.in_flight.take() else {
            return false;
        };
        self.seen.insert(entry.identity);
        self.stats.items_attempted += 1;

        match outcome {
            ItemOutcome::Harvested { .. } => self.stats.items_harvested += 1,
            ItemOutcome::NothingFound => self.stats.items_empty += 1,
            ItemOutcome::Failed { .. } => self.stats.items_failed += 1,
        }

        if self.mode == RunMode::Text && matches!(outcome, ItemOutcome::Harvested { .. }) {
            self.counters.total_count += 1;
            self.batch_len += 1;
            return self.counters.total_count % self.batch_size == 0;
        }
        false
    }

    /// Returns the index of the artifact the current batch goes to.
    pub(crate) fn begin_flush(&mut self) -> u64 {
        let file_idx = self.counters.file_idx;
        self.flushing = Some(file_idx);
        file_idx
    }

    pub(crate) fn is_flushing(&self, file_idx: u64) -> bool {
        self.flushing == Some(file_idx)
    }

    /// The batch artifact is on disk: start the next one.
    pub(crate) fn roll_batch(&mut self) {
        self.flushing = None;
        self.counters.file_idx += 1;
        self.batch_len = 0;
    }

    /// The records stay in the batch and go out with the next flush.
    pub(crate) fn keep_batch(&mut self) {
        self.flushing = None;
    }

    pub(crate) fn page_complete(&mut self) {
        if let Phase::OnPage { page_index } = self.phase {
            self.stats.pages_visited += 1;
            self.phase = Phase::CheckingNextPage { page_index };
        }
    }

    pub(crate) fn start_advance(&mut self) -> Option<u32> {
        match self.phase {
            Phase::CheckingNextPage { page_index } => {
                let to_page = page_index + 1;
                self.phase = Phase::Advancing { to_page };
                Some(to_page)
            }
            _ => None,
        }
    }

    pub(crate) fn finish(&mut self, end: RunEnd) {
        self.queue.clear();
        self.phase = Phase::Done;
        self.end = Some(end);
    }
}
