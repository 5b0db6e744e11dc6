#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Msg {
    /// Operator confirmed that page one of the listing is open.
    Start,
    /// The current listing page was read.
    ListingScanned { entries: Vec<crate::ListingEntry> },
    /// The listing never rendered or could not be read.
    ListingUnavailable { reason: String },
    /// The harvesting attempt for an entry completed, successfully or not.
    ItemFinished {
        identity: String,
        outcome: ItemOutcome,
    },
    /// The batch artifact `file_idx` was written.
    BatchFlushed { file_idx: u64 },
    /// The batch artifact `file_idx` could not be written.
    BatchFlushFailed { file_idx: u64, reason: String },
    /// The "next" affordance is present, visible, enabled and has a target.
    NextPageAvailable,
    /// There is no usable "next" affordance.
    NoNextPage { reason: String },
    /// The "next" affordance was invoked and the settle interval elapsed.
    PageAdvanced,
    /// Stop before the next item.
    CancelRequested,
    /// Unexpected failure outside item granularity.
    Aborted { cause: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// Content or at least one attachment was saved.
    Harvested { artifacts: usize },
    /// The detail view opened but held nothing to save.
    NothingFound,
    /// The detail view could not be opened or read.
    Failed { reason: String },
}
