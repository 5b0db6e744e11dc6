#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    ScanListing { page_index: u32 },
    OpenItem(crate::ListingEntry),
    FlushBatch { file_idx: u64 },
    SaveCheckpoint,
    CheckNextPage,
    AdvancePage { to_page: u32 },
    Finish(RunEnd),
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEnd {
    /// The last listing page was processed.
    Completed,
    ListingUnavailable { reason: String },
    Cancelled,
    Aborted { cause: String },
}
