use crate::{Effect, HarvestState, Msg, Phase, RunEnd};

/// Pure update function: applies a message to state and returns any effects.
///
/// Effects are executed in order. At most one `OpenItem` is outstanding at a
/// time; the next one is only produced by the `ItemFinished` of the previous,
/// or by the flush result when that item closed a batch.
pub fn update(mut state: HarvestState, msg: Msg) -> (HarvestState, Vec<Effect>) {
    if state.phase() == Phase::Done {
        return (state, Vec::new());
    }

    let effects = match msg {
        Msg::Start => {
            if state.phase() != Phase::Idle {
                return (state, Vec::new());
            }
            state.begin_scan(1);
            vec![Effect::ScanListing { page_index: 1 }]
        }
        Msg::ListingScanned { entries } => {
            let Phase::Scanning { page_index } = state.phase() else {
                return (state, Vec::new());
            };
            let entries = entries
                .into_iter()
                .map(|mut entry| {
                    entry.page_index = page_index;
                    entry
                })
                .collect();
            state.enqueue_page(page_index, entries);
            next_item_or_page_end(&mut state)
        }
        Msg::ListingUnavailable { reason } => {
            finish(&mut state, RunEnd::ListingUnavailable { reason })
        }
        Msg::ItemFinished { identity, outcome } => {
            if !state.is_in_flight(&identity) {
                return (state, Vec::new());
            }
            if state.finish_item(&outcome) {
                let file_idx = state.begin_flush();
                vec![Effect::FlushBatch { file_idx }]
            } else {
                next_item_or_page_end(&mut state)
            }
        }
        Msg::BatchFlushed { file_idx } => {
            if !state.is_flushing(file_idx) {
                return (state, Vec::new());
            }
            state.roll_batch();
            let mut effects = vec![Effect::SaveCheckpoint];
            effects.extend(next_item_or_page_end(&mut state));
            effects
        }
        Msg::BatchFlushFailed { file_idx, .. } => {
            if !state.is_flushing(file_idx) {
                return (state, Vec::new());
            }
            state.keep_batch();
            next_item_or_page_end(&mut state)
        }
        Msg::NextPageAvailable => match state.start_advance() {
            Some(to_page) => vec![Effect::AdvancePage { to_page }],
            None => Vec::new(),
        },
        Msg::NoNextPage { .. } => finish(&mut state, RunEnd::Completed),
        Msg::PageAdvanced => {
            let Phase::Advancing { to_page } = state.phase() else {
                return (state, Vec::new());
            };
            state.begin_scan(to_page);
            vec![Effect::ScanListing { page_index: to_page }]
        }
        Msg::CancelRequested => finish(&mut state, RunEnd::Cancelled),
        Msg::Aborted { cause } => finish(&mut state, RunEnd::Aborted { cause }),
    };

    (state, effects)
}

fn next_item_or_page_end(state: &mut HarvestState) -> Vec<Effect> {
    match state.take_next() {
        Some(entry) => vec![Effect::OpenItem(entry)],
        None => {
            state.page_complete();
            if state.has_overdue_batch() {
                vec![Effect::CheckNextPage]
            } else {
                vec![Effect::SaveCheckpoint, Effect::CheckNextPage]
            }
        }
    }
}

fn finish(state: &mut HarvestState, end: RunEnd) -> Vec<Effect> {
    state.finish(end.clone());
    vec![Effect::Finish(end)]
}
