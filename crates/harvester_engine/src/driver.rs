//! Executes the effects of the core state machine against a browser.
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use engine_logging::{engine_debug, engine_error, engine_info, engine_warn};
use harvester_core::{
    update, Effect, HarvestState, ItemOutcome, ListingEntry, Msg, RunEnd, RunMode,
};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::attachments::AttachmentHarvester;
use crate::batch::{Clock, TextBatch};
use crate::browser::{Browser, ClickModifier, ElementHandle, FrameHandle, ViewId};
use crate::checkpoint::CheckpointStore;
use crate::frames::FrameResolver;
use crate::persist::ensure_output_dir;
use crate::settings::HarvestSettings;
use crate::text::harvest_text;
use crate::types::{HarvestEvent, ItemError, NoopProgressSink, ProgressSink, RunError, RunSummary};
use crate::views::{new_views, ViewSnapshot};

const VIEW_POLL_INTERVAL: Duration = Duration::from_millis(100);
const FRAME_POLL_INTERVAL: Duration = Duration::from_millis(200);

pub struct Harvester {
    browser: Arc<dyn Browser>,
    settings: HarvestSettings,
    store: CheckpointStore,
    resolver: FrameResolver,
    batch: TextBatch,
    sink: Arc<dyn ProgressSink>,
    cancel: CancellationToken,
    listing_frame: Option<FrameHandle>,
    page_links: HashMap<String, ElementHandle>,
    next_link: Option<ElementHandle>,
    attachments_written: usize,
    artifacts_written: Vec<PathBuf>,
    end: Option<RunEnd>,
}

impl Harvester {
    pub fn new(browser: Arc<dyn Browser>, settings: HarvestSettings) -> Self {
        let store = CheckpointStore::new(settings.checkpoint_path.clone(), settings.mode);
        let resolver = FrameResolver::new(
            settings.selectors.download_link.clone(),
            settings.selectors.preview_link.clone(),
        );
        let batch = TextBatch::new(
            settings.output_dir.clone(),
            settings.artifact_prefix.clone(),
            Arc::new(|| "unknown".to_string()),
        );
        Self {
            browser,
            settings,
            store,
            resolver,
            batch,
            sink: Arc::new(NoopProgressSink),
            cancel: CancellationToken::new(),
            listing_frame: None,
            page_links: HashMap::new(),
            next_link: None,
            attachments_written: 0,
            artifacts_written: Vec::new(),
            end: None,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn ProgressSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Timestamp source for batch documents.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.batch = TextBatch::new(
            self.settings.output_dir.clone(),
            self.settings.artifact_prefix.clone(),
            clock,
        );
        self
    }

    /// Cancelling stops the run before the next item; final state is still saved.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Harvest starting from the listing page currently shown in `listing`.
    ///
    /// Every exit path flushes the unsaved batch (text mode) and saves the
    /// checkpoint before returning.
    pub async fn run(&mut self, listing: &ViewId) -> Result<RunSummary, RunError> {
        let checkpoint = self.store.load()?;
        ensure_output_dir(&self.settings.output_dir)?;
        self.end = None;
        self.attachments_written = 0;
        self.artifacts_written.clear();

        let state = HarvestState::resume(self.settings.mode, checkpoint)
            .with_batch_size(self.settings.batch_size);
        engine_info!(
            ">>> Resuming with {} processed entries ({} records so far)",
            state.seen().len(),
            state.counters().total_count
        );

        let (state, outcome) = self.drive(state, listing).await;
        let shutdown = self.shutdown(&state);
        outcome?;
        shutdown?;

        let summary = RunSummary {
            end: self.end.clone().unwrap_or(RunEnd::Completed),
            view: state.view(),
            attachments_written: self.attachments_written,
            artifacts_written: self.artifacts_written.clone(),
        };
        engine_info!(
            ">>> Run finished ({:?}): {} seen, {} records, {} attachments",
            summary.end,
            summary.view.seen_count,
            summary.view.total_count,
            summary.attachments_written
        );
        Ok(summary)
    }

    async fn drive(
        &mut self,
        state: HarvestState,
        listing: &ViewId,
    ) -> (HarvestState, Result<(), RunError>) {
        let (mut state, effects) = update(state, Msg::Start);
        let mut queue: VecDeque<Effect> = effects.into();

        while let Some(effect) = queue.pop_front() {
            let msg = match self.execute(effect, &state, listing).await {
                Ok(msg) => msg,
                Err(err) => {
                    engine_error!(">>> Run interrupted: {}", err);
                    self.end = Some(RunEnd::Aborted {
                        cause: err.to_string(),
                    });
                    let (state, _) = update(
                        state,
                        Msg::Aborted {
                            cause: err.to_string(),
                        },
                    );
                    return (state, Err(err));
                }
            };
            if let Some(msg) = msg {
                let (next, more) = update(state, msg);
                state = next;
                queue.extend(more);
            }
        }
        (state, Ok(()))
    }

    async fn execute(
        &mut self,
        effect: Effect,
        state: &HarvestState,
        listing: &ViewId,
    ) -> Result<Option<Msg>, RunError> {
        match effect {
            Effect::ScanListing { page_index } => {
                Ok(Some(self.scan_listing(listing, page_index).await))
            }
            Effect::OpenItem(entry) => {
                if self.cancel.is_cancelled() {
                    engine_info!(">>> Cancellation requested; stopping before {:?}", entry.title);
                    return Ok(Some(Msg::CancelRequested));
                }
                let outcome = self.process_item(&entry).await;
                self.pause(self.settings.item_pause).await;
                Ok(Some(Msg::ItemFinished {
                    identity: entry.identity,
                    outcome,
                }))
            }
            Effect::FlushBatch { file_idx } => Ok(Some(self.flush_batch(file_idx))),
            Effect::SaveCheckpoint => {
                self.save_checkpoint(state)?;
                Ok(None)
            }
            Effect::CheckNextPage => Ok(Some(self.check_next_page().await)),
            Effect::AdvancePage { to_page } => Ok(Some(self.advance_page(to_page).await)),
            Effect::Finish(end) => {
                engine_info!(">>> Stopping: {:?}", end);
                self.end = Some(end);
                Ok(None)
            }
        }
    }

    async fn scan_listing(&mut self, listing: &ViewId, page_index: u32) -> Msg {
        self.page_links.clear();
        self.next_link = None;

        let frame = match self.locate_listing_frame(listing).await {
            Ok(frame) => frame,
            Err(reason) => {
                engine_warn!(">>> Listing frame not found: {}", reason);
                return Msg::ListingUnavailable { reason };
            }
        };
        let selector = self.settings.selectors.entry_link.clone();
        if let Err(err) = self
            .browser
            .wait_for_visible(&frame, &selector, self.settings.timeouts.listing)
            .await
        {
            engine_warn!(">>> No listing entries on page {}: {}", page_index, err);
            return Msg::ListingUnavailable {
                reason: err.to_string(),
            };
        }
        let links = match self.browser.find_all(&frame, &selector).await {
            Ok(links) => links,
            Err(err) => {
                return Msg::ListingUnavailable {
                    reason: err.to_string(),
                }
            }
        };

        let mut entries = Vec::with_capacity(links.len());
        for link in links {
            let identity = match self.browser.attribute(&link, "href").await {
                Ok(Some(href)) if !href.trim().is_empty() => href,
                Ok(_) => continue,
                Err(err) => {
                    engine_warn!("Could not read entry link on page {}: {}", page_index, err);
                    continue;
                }
            };
            let title = match self.browser.text(&link).await {
                Ok(text) => text.trim().to_string(),
                Err(err) => {
                    engine_debug!("Could not read title of {}: {}", identity, err);
                    String::new()
                }
            };
            self.page_links.entry(identity.clone()).or_insert(link);
            entries.push(ListingEntry {
                identity,
                title,
                page_index,
            });
        }

        engine_info!(">>> Scanning page {} ({} entries)", page_index, entries.len());
        self.sink.emit(HarvestEvent::PageScanned {
            page_index,
            entries: entries.len(),
        });
        self.listing_frame = Some(frame);
        Msg::ListingScanned { entries }
    }

    async fn locate_listing_frame(&self, listing: &ViewId) -> Result<FrameHandle, String> {
        let Some(name) = self.settings.selectors.listing_frame.as_deref() else {
            return Ok(FrameHandle::root(listing.clone()));
        };
        let timeout = self.settings.timeouts.listing;
        let deadline = Instant::now() + timeout;
        loop {
            match self.browser.frames(listing).await {
                Ok(frames) => {
                    if let Some(frame) = frames
                        .into_iter()
                        .find(|frame| frame.name.as_deref() == Some(name))
                    {
                        return Ok(frame.handle);
                    }
                }
                Err(err) => engine_debug!("Frame enumeration failed: {}", err),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(format!("frame `{name}` not present after {timeout:?}"));
            }
            tokio::time::sleep(FRAME_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn process_item(&mut self, entry: &ListingEntry) -> ItemOutcome {
        self.sink.emit(HarvestEvent::ItemStarted {
            page_index: entry.page_index,
            identity: entry.identity.clone(),
            title: entry.title.clone(),
        });

        let result = match ViewSnapshot::capture(self.browser.as_ref()).await {
            Ok(snapshot) => {
                let result = self.harvest_item(entry, &snapshot).await;
                let closed = snapshot.reap(self.browser.as_ref(), &[]).await;
                engine_debug!("Closed {} view(s) after {}", closed, entry.identity);
                result
            }
            Err(err) => Err(ItemError::from(err)),
        };

        let outcome = match result {
            Ok(outcome) => outcome,
            Err(err) => {
                engine_warn!("  [!] skipped {:?} ({}): {}", entry.title, entry.identity, err);
                ItemOutcome::Failed {
                    reason: err.to_string(),
                }
            }
        };
        match &outcome {
            ItemOutcome::Harvested { artifacts } => {
                engine_info!("  [+] {:?}: {} artifact(s)", entry.title, artifacts)
            }
            ItemOutcome::NothingFound => engine_info!("  [ ] {:?}: nothing to save", entry.title),
            ItemOutcome::Failed { .. } => {}
        }
        self.sink.emit(HarvestEvent::ItemFinished {
            identity: entry.identity.clone(),
            title: entry.title.clone(),
            outcome: outcome.clone(),
        });
        outcome
    }

    async fn harvest_item(
        &mut self,
        entry: &ListingEntry,
        before: &ViewSnapshot,
    ) -> Result<ItemOutcome, ItemError> {
        let link = self
            .page_links
            .get(&entry.identity)
            .cloned()
            .ok_or(ItemError::LinkMissing)?;
        let detail = self.open_detail(&link, before).await?;
        self.browser
            .wait_for_load(&detail, self.settings.timeouts.detail_load)
            .await?;

        match self.settings.mode {
            RunMode::Attachments => {
                let report = {
                    let harvester = AttachmentHarvester::new(
                        self.browser.as_ref(),
                        &self.resolver,
                        self.settings.output_dir.clone(),
                        self.settings.timeouts.download,
                    );
                    harvester.harvest(&detail, &entry.title).await
                };
                for path in &report.saved {
                    self.sink.emit(HarvestEvent::AttachmentSaved {
                        identity: entry.identity.clone(),
                        path: path.clone(),
                    });
                }
                for (index, reason) in &report.skipped {
                    self.sink.emit(HarvestEvent::AttachmentSkipped {
                        identity: entry.identity.clone(),
                        index: *index,
                        reason: reason.clone(),
                    });
                }
                self.attachments_written += report.saved.len();
                if report.any_captured() {
                    Ok(ItemOutcome::Harvested {
                        artifacts: report.saved.len(),
                    })
                } else {
                    Ok(ItemOutcome::NothingFound)
                }
            }
            RunMode::Text => {
                let record = harvest_text(
                    self.browser.as_ref(),
                    &detail,
                    &entry.title,
                    &self.settings.selectors.content,
                    self.settings.timeouts.content,
                )
                .await?;
                self.batch.push(record);
                Ok(ItemOutcome::Harvested { artifacts: 1 })
            }
        }
    }

    /// Ctrl-click the entry and wait for the view it opens.
    async fn open_detail(
        &self,
        link: &ElementHandle,
        before: &ViewSnapshot,
    ) -> Result<ViewId, ItemError> {
        self.browser.click(link, ClickModifier::Control).await?;
        let timeout = self.settings.timeouts.detail_open;
        let deadline = Instant::now() + timeout;
        loop {
            let views = self.browser.views().await?;
            if let Some(view) = new_views(before, views).into_iter().next() {
                return Ok(view);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(ItemError::DetailNotOpened(timeout));
            }
            tokio::time::sleep(VIEW_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn check_next_page(&mut self) -> Msg {
        self.next_link = None;
        let Some(frame) = self.listing_frame.clone() else {
            return next_page_unreadable("listing frame unknown");
        };
        let next = match self
            .browser
            .find_all(&frame, &self.settings.selectors.next_link)
            .await
        {
            Ok(links) => match links.into_iter().next() {
                Some(next) => next,
                None => return no_next_page("no next link"),
            },
            Err(err) => return next_page_unreadable(err),
        };

        match self.browser.is_visible(&next).await {
            Ok(true) => {}
            Ok(false) => return no_next_page("next link hidden"),
            Err(err) => return next_page_unreadable(err),
        }
        match self.browser.attribute(&next, "href").await {
            Ok(Some(href)) if !href.trim().is_empty() => {}
            Ok(_) => return no_next_page("next link has no target"),
            Err(err) => return next_page_unreadable(err),
        }
        let class = match self.browser.attribute(&next, "class").await {
            Ok(class) => class.unwrap_or_default(),
            Err(err) => return next_page_unreadable(err),
        };
        let aria_disabled = match self.browser.attribute(&next, "aria-disabled").await {
            Ok(value) => value.is_some_and(|value| value.eq_ignore_ascii_case("true")),
            Err(err) => return next_page_unreadable(err),
        };
        if class.contains("disabled") || aria_disabled {
            return no_next_page("next link disabled");
        }

        self.next_link = Some(next);
        Msg::NextPageAvailable
    }

    async fn advance_page(&mut self, to_page: u32) -> Msg {
        let Some(next) = self.next_link.take() else {
            return Msg::ListingUnavailable {
                reason: "next link lost before advancing".to_string(),
            };
        };
        if let Err(err) = self.browser.click(&next, ClickModifier::None).await {
            engine_warn!(">>> Could not advance to page {}: {}", to_page, err);
            return Msg::ListingUnavailable {
                reason: err.to_string(),
            };
        }
        engine_info!(">>> Turning to page {}", to_page);
        self.pause(self.settings.page_settle).await;
        if self.cancel.is_cancelled() {
            return Msg::CancelRequested;
        }
        self.sink.emit(HarvestEvent::PageAdvanced {
            page_index: to_page,
        });
        Msg::PageAdvanced
    }

    /// Records stay in memory when the part cannot be written.
    fn flush_batch(&mut self, file_idx: u64) -> Msg {
        let records = self.batch.len();
        match self.batch.flush_part(file_idx) {
            Ok(path) => {
                engine_info!("--- Batch {} written to {} ({} records)", file_idx, path.display(), records);
                self.sink.emit(HarvestEvent::BatchFlushed {
                    file_idx,
                    path: path.clone(),
                    records,
                });
                self.artifacts_written.push(path);
                Msg::BatchFlushed { file_idx }
            }
            Err(err) => {
                engine_error!(
                    "Could not write batch {}: {}; keeping {} records, checkpoint held back",
                    file_idx,
                    err,
                    records
                );
                Msg::BatchFlushFailed {
                    file_idx,
                    reason: err.to_string(),
                }
            }
        }
    }

    fn save_checkpoint(&self, state: &HarvestState) -> Result<(), RunError> {
        let checkpoint = state.checkpoint();
        self.store.save(&checkpoint)?;
        self.sink.emit(HarvestEvent::CheckpointSaved {
            seen: checkpoint.seen.len(),
            total_count: state.counters().total_count,
        });
        Ok(())
    }

    /// Final artifact and checkpoint. When the final artifact cannot be
    /// written the previous checkpoint is kept so the unsaved records are
    /// harvested again on the next run.
    fn shutdown(&mut self, state: &HarvestState) -> Result<(), RunError> {
        if self.settings.mode == RunMode::Text {
            if self.batch.is_empty() {
                engine_debug!(">>> No unflushed records; final part will be empty");
            }
            let records = self.batch.len();
            match self.batch.flush_final() {
                Ok(path) => {
                    engine_info!(">>> Final part written to {} ({} records)", path.display(), records);
                    self.artifacts_written.push(path);
                }
                Err(err) => {
                    engine_error!(
                        ">>> Could not write final part ({} records): {}; checkpoint left unchanged",
                        records,
                        err
                    );
                    return Err(err.into());
                }
            }
        }
        self.save_checkpoint(state)?;
        engine_info!(
            ">>> Progress saved: {} entries processed, {} records",
            state.seen().len(),
            state.counters().total_count
        );
        Ok(())
    }

    async fn pause(&self, duration: Duration) {
        if duration.is_zero() {
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.cancel.cancelled() => {}
        }
    }
}

fn no_next_page(reason: impl Into<String>) -> Msg {
    let reason = reason.into();
    engine_info!(">>> Last page reached: {}", reason);
    Msg::NoNextPage { reason }
}

/// The listing cannot tell whether it goes on; the run stops and can be resumed.
fn next_page_unreadable(cause: impl std::fmt::Display) -> Msg {
    let reason = format!("next link unreadable: {cause}");
    engine_warn!(">>> {}", reason);
    Msg::ListingUnavailable { reason }
}
