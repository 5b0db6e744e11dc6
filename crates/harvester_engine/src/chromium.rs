//! [`Browser`] over the Chrome DevTools Protocol, driven through `chromiumoxide`.
//!
//! Views are page targets and frames are addressed by their CDP frame id.
//! Elements found by [`Browser::find_all`] are tagged with a marker attribute
//! so later calls can find them again inside the frame's script context.
//! Downloads are saved by guid and matched to the click that started them
//! through the `Browser.downloadWillBegin` and `Browser.downloadProgress`
//! events.
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chromiumoxide::browser::{Browser as Chromium, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::browser::{
    DownloadProgressState, EventDownloadProgress, EventDownloadWillBegin,
    SetDownloadBehaviorBehavior, SetDownloadBehaviorParams,
};
use chromiumoxide::cdp::browser_protocol::dom::GetContentQuadsParams;
use chromiumoxide::cdp::browser_protocol::input::{
    DispatchMouseEventParams, DispatchMouseEventType, MouseButton,
};
use chromiumoxide::cdp::browser_protocol::page::{FrameId, FrameTree, GetFrameTreeParams};
use chromiumoxide::cdp::browser_protocol::target::{CloseTargetParams, TargetId};
use chromiumoxide::cdp::js_protocol::runtime::EvaluateParams;
use chromiumoxide::error::CdpError;
use chromiumoxide::layout::{ElementQuad, Point};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::{Handler, Page};
use engine_logging::{engine_debug, engine_info, engine_warn};
use futures::StreamExt;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::browser::{
    Browser, BrowserError, BrowserErrorKind, ClickModifier, Download, ElementHandle, Frame,
    FrameHandle, ViewId,
};

const MARKER: &str = "data-harvester-ref";
const LOAD_POLL_INTERVAL: Duration = Duration::from_millis(100);
// CDP modifier bit for Ctrl.
const CONTROL_MODIFIER: i64 = 2;
// A fresh view reports `complete` for about:blank before its navigation starts.
const READY_STATE_SCRIPT: &str =
    "document.location.href === 'about:blank' ? 'loading' : document.readyState";

#[derive(Debug, Clone)]
pub struct ChromiumSettings {
    /// DevTools endpoint of a browser that is already running, e.g.
    /// `http://127.0.0.1:9222`. `None` launches a new browser window.
    pub connect_url: Option<String>,
    pub executable: Option<PathBuf>,
    /// Browser profile directory. A persistent one keeps the forum login.
    pub profile_dir: Option<PathBuf>,
    /// Scratch directory for transfers. Must not be the output directory.
    pub download_dir: PathBuf,
    pub headless: bool,
    pub request_timeout: Duration,
}

impl ChromiumSettings {
    pub fn new(download_dir: PathBuf) -> Self {
        Self {
            connect_url: None,
            executable: None,
            profile_dir: None,
            download_dir,
            headless: false,
            request_timeout: Duration::from_secs(60),
        }
    }
}

pub struct ChromiumBrowser {
    browser: tokio::sync::Mutex<Chromium>,
    owns_browser: bool,
    downloads: Arc<DownloadEvents>,
    tasks: Vec<JoinHandle<()>>,
}

impl ChromiumBrowser {
    /// Launch a browser, or connect to the one at `settings.connect_url`,
    /// and route its downloads into `settings.download_dir`.
    pub async fn start(settings: ChromiumSettings) -> Result<Self, BrowserError> {
        tokio::fs::create_dir_all(&settings.download_dir)
            .await
            .map_err(io_error)?;
        let download_dir = tokio::fs::canonicalize(&settings.download_dir)
            .await
            .map_err(io_error)?;

        let (browser, handler, owns_browser) = match &settings.connect_url {
            Some(url) => {
                let (browser, handler) = Chromium::connect(url.clone()).await.map_err(cdp_error)?;
                engine_info!("Connected to the browser at {}", url);
                (browser, handler, false)
            }
            None => {
                let (browser, handler) = Chromium::launch(launch_config(&settings)?)
                    .await
                    .map_err(cdp_error)?;
                engine_info!("Browser launched");
                (browser, handler, true)
            }
        };
        let mut tasks = vec![tokio::spawn(drive_handler(handler))];

        let begins = browser
            .event_listener::<EventDownloadWillBegin>()
            .await
            .map_err(cdp_error)?;
        let progress = browser
            .event_listener::<EventDownloadProgress>()
            .await
            .map_err(cdp_error)?;
        let behavior = SetDownloadBehaviorParams::builder()
            .behavior(SetDownloadBehaviorBehavior::AllowAndName)
            .download_path(download_dir.to_string_lossy().into_owned())
            .events_enabled(true)
            .build()
            .map_err(protocol)?;
        browser.execute(behavior).await.map_err(cdp_error)?;

        let downloads = Arc::new(DownloadEvents::new(download_dir));
        tasks.push(tokio::spawn(track_downloads(
            downloads.clone(),
            begins,
            progress,
        )));

        Ok(Self {
            browser: tokio::sync::Mutex::new(browser),
            owns_browser,
            downloads,
            tasks,
        })
    }

    /// The first open view, or a new blank one.
    pub async fn current_view(&self) -> Result<ViewId, BrowserError> {
        let browser = self.browser.lock().await;
        let pages = browser.pages().await.map_err(cdp_error)?;
        let page = match pages.into_iter().next() {
            Some(page) => page,
            None => browser.new_page("about:blank").await.map_err(cdp_error)?,
        };
        Ok(view_of(&page))
    }

    /// Close the browser if this client launched it, and stop listening.
    pub async fn quit(&self) -> Result<(), BrowserError> {
        if self.owns_browser {
            let mut browser = self.browser.lock().await;
            browser.close().await.map_err(cdp_error)?;
            browser.wait().await.map_err(io_error)?;
            engine_info!("Browser closed");
        }
        for task in &self.tasks {
            task.abort();
        }
        Ok(())
    }

    async fn page(&self, view: &ViewId) -> Result<Page, BrowserError> {
        let browser = self.browser.lock().await;
        browser
            .get_page(TargetId::new(view.0.clone()))
            .await
            .map_err(|err| match err {
                CdpError::NotFound => {
                    BrowserError::new(BrowserErrorKind::ViewClosed, format!("view {view} is gone"))
                }
                other => cdp_error(other),
            })
    }

    /// Evaluate `expression` in the script context of `frame`.
    async fn evaluate(
        &self,
        frame: &FrameHandle,
        expression: String,
        by_value: bool,
    ) -> Result<(Page, chromiumoxide::js::EvaluationResult), BrowserError> {
        let page = self.page(&frame.view).await?;
        let frame_id = match frame.path.last() {
            Some(id) => FrameId::new(id.clone()),
            None => page
                .mainframe()
                .await
                .map_err(cdp_error)?
                .ok_or_else(|| stale("view has no document yet"))?,
        };
        let context = page
            .frame_execution_context(frame_id)
            .await
            .map_err(cdp_error)?
            .ok_or_else(|| stale("frame has no script context"))?;
        let params = EvaluateParams::builder()
            .expression(expression)
            .context_id(context)
            .return_by_value(by_value)
            .await_promise(true)
            .build()
            .map_err(protocol)?;
        let result = page.evaluate_expression(params).await.map_err(cdp_error)?;
        Ok((page, result))
    }

    async fn value(&self, frame: &FrameHandle, expression: String) -> Result<Value, BrowserError> {
        let (_, result) = self.evaluate(frame, expression, true).await?;
        Ok(result.value().cloned().unwrap_or(Value::Null))
    }

    /// Evaluate `body` with `el` bound to the element. A vanished element is stale.
    async fn on_element(&self, element: &ElementHandle, body: &str) -> Result<Value, BrowserError> {
        let script = format!(
            "(() => {{ const el = {}; if (!el) return null; return {{ v: ({body}) }}; }})()",
            lookup(element)?
        );
        match self.value(&element.frame, script).await? {
            Value::Object(mut wrapped) => Ok(wrapped.remove("v").unwrap_or(Value::Null)),
            _ => Err(stale(format!("element {} is gone", element.id))),
        }
    }

    /// Viewport point at the centre of the element, after scrolling it into view.
    async fn click_point(&self, element: &ElementHandle) -> Result<(Page, Point), BrowserError> {
        let script = format!(
            "(() => {{ const el = {}; if (el) el.scrollIntoView({{ block: 'center', inline: 'center' }}); return el; }})()",
            lookup(element)?
        );
        let (page, result) = self.evaluate(&element.frame, script, false).await?;
        let object_id = result
            .object()
            .object_id
            .clone()
            .ok_or_else(|| stale(format!("element {} is gone", element.id)))?;
        let quads = page
            .execute(GetContentQuadsParams::builder().object_id(object_id).build())
            .await
            .map_err(cdp_error)?;
        let point = quads
            .result
            .quads
            .iter()
            .filter(|quad| quad.inner().len() == 8)
            .map(ElementQuad::from_quad)
            .filter(|quad| quad.quad_area() > 1.0)
            .map(|quad| quad.quad_center())
            .next()
            .ok_or_else(|| {
                BrowserError::new(
                    BrowserErrorKind::NoSuchElement,
                    format!("element {} has no clickable area", element.id),
                )
            })?;
        Ok((page, point))
    }

    /// Frame ids of `view` and of every view not in `before`.
    async fn frames_owned_by(
        &self,
        view: &ViewId,
        before: &HashSet<ViewId>,
    ) -> Result<HashSet<String>, BrowserError> {
        let mut owned = HashSet::new();
        for candidate in self.views().await? {
            if &candidate != view && before.contains(&candidate) {
                continue;
            }
            match self.frames(&candidate).await {
                Ok(frames) => owned.extend(frames.into_iter().map(|frame| frame_id_of(&frame))),
                Err(err) if &candidate == view => return Err(err),
                Err(err) => engine_debug!("Skipping frames of {}: {}", candidate, err),
            }
        }
        Ok(owned)
    }

    async fn collect_download(&self, guid: &str, timeout: Duration) -> Result<Vec<u8>, BrowserError> {
        let path = self.downloads.wait_finished(guid, timeout).await?;
        let bytes = tokio::fs::read(&path).await.map_err(io_error)?;
        if let Err(err) = tokio::fs::remove_file(&path).await {
            engine_warn!("Could not remove {} from download dir: {}", path.display(), err);
        }
        Ok(bytes)
    }
}

#[async_trait::async_trait]
impl Browser for ChromiumBrowser {
    async fn navigate(&self, view: &ViewId, url: &str) -> Result<(), BrowserError> {
        let page = self.page(view).await?;
        page.goto(url).await.map_err(cdp_error)?;
        Ok(())
    }

    async fn wait_for_load(&self, view: &ViewId, timeout: Duration) -> Result<(), BrowserError> {
        let root = FrameHandle::root(view.clone());
        let deadline = Instant::now() + timeout;
        loop {
            let state = match self.value(&root, READY_STATE_SCRIPT.to_string()).await {
                Ok(state) => state.as_str().unwrap_or_default().to_string(),
                Err(err) if err.kind == BrowserErrorKind::ViewClosed => return Err(err),
                // A view that was just opened may not have a script context yet.
                Err(err) => err.to_string(),
            };
            if state == "interactive" || state == "complete" {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(BrowserError::timeout(format!(
                    "{view} still `{state}` after {timeout:?}"
                )));
            }
            tokio::time::sleep(LOAD_POLL_INTERVAL.min(deadline - now)).await;
        }
    }

    async fn views(&self) -> Result<Vec<ViewId>, BrowserError> {
        let browser = self.browser.lock().await;
        let pages = browser.pages().await.map_err(cdp_error)?;
        Ok(pages.iter().map(view_of).collect())
    }

    async fn frames(&self, view: &ViewId) -> Result<Vec<Frame>, BrowserError> {
        let page = self.page(view).await?;
        let tree = page
            .execute(GetFrameTreeParams::default())
            .await
            .map_err(cdp_error)?
            .result
            .frame_tree;
        Ok(flatten_frames(view, tree))
    }

    async fn find_all(
        &self,
        scope: &FrameHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BrowserError> {
        let script = format!(
            "(() => {{ \
                window.__harvesterRefs = window.__harvesterRefs || 0; \
                return Array.from(document.querySelectorAll({selector})).map(el => {{ \
                    if (!el.hasAttribute('{MARKER}')) el.setAttribute('{MARKER}', String(++window.__harvesterRefs)); \
                    return el.getAttribute('{MARKER}'); \
                }}); \
            }})()",
            selector = js_string(selector)
        );
        let value = self.value(scope, script).await?;
        let ids = value
            .as_array()
            .ok_or_else(|| protocol("element query did not return a list"))?;
        Ok(ids
            .iter()
            .filter_map(Value::as_str)
            .map(|id| ElementHandle {
                frame: scope.clone(),
                id: id.to_string(),
            })
            .collect())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let value = self.on_element(element, "el.innerText").await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let body = format!("el.getAttribute({})", js_string(name));
        let value = self.on_element(element, &body).await?;
        Ok(value.as_str().map(str::to_string))
    }

    async fn is_visible(&self, element: &ElementHandle) -> Result<bool, BrowserError> {
        let value = self
            .on_element(
                element,
                "el.getClientRects().length > 0 && getComputedStyle(el).visibility !== 'hidden'",
            )
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn remove_attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<(), BrowserError> {
        let body = format!("el.removeAttribute({}) === undefined", js_string(name));
        self.on_element(element, &body).await?;
        Ok(())
    }

    async fn click(
        &self,
        element: &ElementHandle,
        modifier: ClickModifier,
    ) -> Result<(), BrowserError> {
        let (page, point) = self.click_point(element).await?;
        let modifiers = match modifier {
            ClickModifier::None => 0,
            ClickModifier::Control => CONTROL_MODIFIER,
        };
        for kind in [
            DispatchMouseEventType::MouseMoved,
            DispatchMouseEventType::MousePressed,
            DispatchMouseEventType::MouseReleased,
        ] {
            let mut event = DispatchMouseEventParams::builder()
                .r#type(kind.clone())
                .x(point.x)
                .y(point.y)
                .modifiers(modifiers);
            if kind != DispatchMouseEventType::MouseMoved {
                event = event.button(MouseButton::Left).click_count(1);
            }
            page.execute(event.build().map_err(protocol)?)
                .await
                .map_err(cdp_error)?;
        }
        Ok(())
    }

    async fn download(
        &self,
        link: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, BrowserError> {
        let deadline = Instant::now() + timeout;
        let before: HashSet<ViewId> = self.views().await?.into_iter().collect();
        let since = self.downloads.begin_click().await;
        self.click(link, ClickModifier::None).await?;

        let claimed = loop {
            let mut changes = self.downloads.changed.subscribe();
            if self.downloads.has_candidates(since) {
                let owned = self.frames_owned_by(&link.frame.view, &before).await?;
                if let Some(claimed) = self.downloads.claim(since, &owned).await {
                    break claimed;
                }
            }
            if !changed_before(&mut changes, deadline).await {
                return Err(BrowserError::timeout(format!(
                    "no download started within {timeout:?}"
                )));
            }
        };
        engine_debug!(
            "Download {} started: {}",
            claimed.guid,
            claimed.suggested_name
        );

        let remaining = deadline.saturating_duration_since(Instant::now());
        match self.collect_download(&claimed.guid, remaining).await {
            Ok(bytes) => Ok(Download {
                suggested_name: claimed.suggested_name,
                bytes,
            }),
            Err(err) => {
                self.downloads.abandon(&claimed.guid).await;
                Err(err)
            }
        }
    }

    async fn close_view(&self, view: &ViewId) -> Result<(), BrowserError> {
        let browser = self.browser.lock().await;
        browser
            .execute(CloseTargetParams::new(TargetId::new(view.0.clone())))
            .await
            .map_err(cdp_error)?;
        Ok(())
    }
}

fn launch_config(settings: &ChromiumSettings) -> Result<BrowserConfig, BrowserError> {
    let mut builder = BrowserConfig::builder().request_timeout(settings.request_timeout);
    if !settings.headless {
        builder = builder.with_head();
    }
    if let Some(executable) = &settings.executable {
        builder = builder.chrome_executable(executable);
    }
    if let Some(profile) = &settings.profile_dir {
        builder = builder.user_data_dir(profile);
    }
    builder.build().map_err(protocol)
}

async fn drive_handler(mut handler: Handler) {
    while let Some(event) = handler.next().await {
        if let Err(err) = event {
            engine_debug!("DevTools connection: {}", err);
        }
    }
    engine_debug!("DevTools connection closed");
}

async fn track_downloads(
    events: Arc<DownloadEvents>,
    mut begins: EventStream<EventDownloadWillBegin>,
    mut progress: EventStream<EventDownloadProgress>,
) {
    loop {
        let discarded = tokio::select! {
            Some(event) = begins.next() => events.update(|ledger| {
                ledger.began(&event.guid, event.frame_id.inner(), &event.suggested_filename);
                Vec::new()
            }),
            Some(event) = progress.next() => {
                let state = match event.state {
                    DownloadProgressState::InProgress => Transfer::Running,
                    DownloadProgressState::Completed => Transfer::Completed(
                        event
                            .file_path
                            .as_ref()
                            .map(PathBuf::from)
                            .unwrap_or_else(|| events.download_dir.join(&event.guid)),
                    ),
                    DownloadProgressState::Canceled => Transfer::Canceled,
                };
                events.update(|ledger| ledger.progressed(&event.guid, state).into_iter().collect())
            }
            else => break,
        };
        remove_discarded(discarded).await;
    }
}

async fn remove_discarded(paths: Vec<PathBuf>) {
    for path in paths {
        match tokio::fs::remove_file(&path).await {
            Ok(()) => engine_debug!("Discarded unclaimed download {}", path.display()),
            Err(err) => engine_debug!("Could not discard {}: {}", path.display(), err),
        }
    }
}

/// Wait for the next ledger change. `false` once `deadline` passes.
async fn changed_before(changes: &mut watch::Receiver<u64>, deadline: Instant) -> bool {
    tokio::select! {
        changed = changes.changed() => changed.is_ok(),
        _ = tokio::time::sleep_until(deadline) => false,
    }
}

/// Shared between the event listener task and the waiting click.
struct DownloadEvents {
    download_dir: PathBuf,
    ledger: Mutex<DownloadLedger>,
    changed: watch::Sender<u64>,
}

impl DownloadEvents {
    fn new(download_dir: PathBuf) -> Self {
        let (changed, _) = watch::channel(0);
        Self {
            download_dir,
            ledger: Mutex::new(DownloadLedger::default()),
            changed,
        }
    }

    fn update<R>(&self, apply: impl FnOnce(&mut DownloadLedger) -> R) -> R {
        let result = {
            let mut ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
            apply(&mut ledger)
        };
        self.changed.send_modify(|version| *version += 1);
        result
    }

    fn read<R>(&self, inspect: impl FnOnce(&DownloadLedger) -> R) -> R {
        let ledger = self.ledger.lock().unwrap_or_else(PoisonError::into_inner);
        inspect(&ledger)
    }

    async fn begin_click(&self) -> u64 {
        let (since, discarded) = self.update(DownloadLedger::begin_click);
        remove_discarded(discarded).await;
        since
    }

    fn has_candidates(&self, since: u64) -> bool {
        self.read(|ledger| ledger.has_candidates(since))
    }

    async fn claim(&self, since: u64, owned: &HashSet<String>) -> Option<Claimed> {
        let (claimed, discarded) = self.update(|ledger| ledger.claim(since, owned));
        remove_discarded(discarded).await;
        claimed
    }

    async fn abandon(&self, guid: &str) {
        let discarded = self.update(|ledger| ledger.abandon(guid));
        remove_discarded(discarded.into_iter().collect()).await;
    }

    async fn wait_finished(&self, guid: &str, timeout: Duration) -> Result<PathBuf, BrowserError> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut changes = self.changed.subscribe();
            match self.read(|ledger| ledger.transfer(guid)) {
                Some(Transfer::Completed(path)) => {
                    self.update(|ledger| ledger.forget(guid));
                    return Ok(path);
                }
                Some(Transfer::Canceled) => {
                    self.update(|ledger| ledger.forget(guid));
                    return Err(BrowserError::new(
                        BrowserErrorKind::Protocol("download canceled".to_string()),
                        format!("download {guid} was canceled"),
                    ));
                }
                Some(Transfer::Running) | None => {}
            }
            tokio::select! {
                changed = changes.changed() => {
                    if changed.is_err() {
                        return Err(BrowserError::new(BrowserErrorKind::Transport, "download events stopped"));
                    }
                }
                _ = tokio::time::sleep_until(deadline) => {
                    return Err(BrowserError::timeout(format!("download {guid} unfinished after {timeout:?}")));
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Transfer {
    Running,
    Completed(PathBuf),
    Canceled,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Claimed {
    guid: String,
    suggested_name: String,
}

#[derive(Debug)]
struct Started {
    seq: u64,
    guid: String,
    frame: String,
    suggested_name: String,
}

/// Bookkeeping of browser transfers. A transfer belongs to the click it was
/// claimed by; anything else is discarded once it completes.
#[derive(Debug, Default)]
struct DownloadLedger {
    next_seq: u64,
    unclaimed: Vec<Started>,
    transfers: HashMap<String, Transfer>,
    discarded: HashSet<String>,
}

impl DownloadLedger {
    fn began(&mut self, guid: &str, frame: &str, suggested_name: &str) {
        self.unclaimed.push(Started {
            seq: self.next_seq,
            guid: guid.to_string(),
            frame: frame.to_string(),
            suggested_name: suggested_name.to_string(),
        });
        self.next_seq += 1;
        self.transfers
            .entry(guid.to_string())
            .or_insert(Transfer::Running);
    }

    /// Returns the file to delete when a discarded transfer completes.
    fn progressed(&mut self, guid: &str, state: Transfer) -> Option<PathBuf> {
        if self.discarded.contains(guid) && state != Transfer::Running {
            self.discarded.remove(guid);
            self.transfers.remove(guid);
            return match state {
                Transfer::Completed(path) => Some(path),
                _ => None,
            };
        }
        self.transfers.insert(guid.to_string(), state);
        None
    }

    /// Starts a click: transfers nobody claimed so far are discarded.
    /// Returns the sequence number later transfers start from.
    fn begin_click(&mut self) -> (u64, Vec<PathBuf>) {
        let stale: Vec<Started> = self.unclaimed.drain(..).collect();
        let discarded = stale
            .into_iter()
            .filter_map(|started| self.discard(&started.guid))
            .collect();
        (self.next_seq, discarded)
    }

    fn has_candidates(&self, since: u64) -> bool {
        self.unclaimed.iter().any(|started| started.seq >= since)
    }

    /// First transfer started at or after `since` by one of the `owned`
    /// frames. Transfers from other frames are discarded.
    fn claim(&mut self, since: u64, owned: &HashSet<String>) -> (Option<Claimed>, Vec<PathBuf>) {
        let mut claimed = None;
        let mut foreign = Vec::new();
        let mut keep = Vec::new();
        for started in self.unclaimed.drain(..) {
            if started.seq < since || claimed.is_some() {
                keep.push(started);
            } else if owned.contains(&started.frame) {
                claimed = Some(Claimed {
                    guid: started.guid,
                    suggested_name: started.suggested_name,
                });
            } else {
                foreign.push(started.guid);
            }
        }
        self.unclaimed = keep;
        let discarded = foreign
            .iter()
            .filter_map(|guid| self.discard(guid))
            .collect();
        (claimed, discarded)
    }

    fn transfer(&self, guid: &str) -> Option<Transfer> {
        self.transfers.get(guid).cloned()
    }

    /// A claimed transfer that is no longer wanted.
    fn abandon(&mut self, guid: &str) -> Option<PathBuf> {
        self.discard(guid)
    }

    fn forget(&mut self, guid: &str) {
        self.transfers.remove(guid);
    }

    fn discard(&mut self, guid: &str) -> Option<PathBuf> {
        match self.transfers.get(guid) {
            Some(Transfer::Running) => {
                self.discarded.insert(guid.to_string());
                None
            }
            Some(Transfer::Completed(path)) => {
                let path = path.clone();
                self.transfers.remove(guid);
                Some(path)
            }
            Some(Transfer::Canceled) | None => {
                self.transfers.remove(guid);
                None
            }
        }
    }
}

/// Pre-order: the view itself, then nested frames in document order.
fn flatten_frames(view: &ViewId, tree: FrameTree) -> Vec<Frame> {
    let mut frames = Vec::new();
    let mut pending = vec![(Vec::<String>::new(), tree)];
    while let Some((path, node)) = pending.pop() {
        let name = node.frame.name.clone().filter(|name| !name.is_empty());
        frames.push(Frame {
            handle: FrameHandle {
                view: view.clone(),
                path: path.clone(),
            },
            name: if path.is_empty() { None } else { name },
        });
        for child in node.child_frames.unwrap_or_default().into_iter().rev() {
            let mut child_path = path.clone();
            child_path.push(child.frame.id.inner().clone());
            pending.push((child_path, child));
        }
    }
    frames
}

/// The CDP id of a frame. The view's own document has no path; it is
/// reported under the view id, which CDP uses for the main frame too.
fn frame_id_of(frame: &Frame) -> String {
    frame
        .handle
        .path
        .last()
        .cloned()
        .unwrap_or_else(|| frame.handle.view.0.clone())
}

fn view_of(page: &Page) -> ViewId {
    ViewId(page.target_id().inner().clone())
}

/// Script expression resolving the element, or `null`.
fn lookup(element: &ElementHandle) -> Result<String, BrowserError> {
    if element.id.is_empty() || !element.id.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BrowserError::new(
            BrowserErrorKind::NoSuchElement,
            format!("`{}` is not an element handle of this browser", element.id),
        ));
    }
    Ok(format!(
        "document.querySelector('[{MARKER}=\"{}\"]')",
        element.id
    ))
}

fn js_string(text: &str) -> String {
    Value::String(text.to_string()).to_string()
}

/// DevTools failures onto the capability's error kinds.
pub fn error_kind(err: &CdpError) -> BrowserErrorKind {
    match err {
        CdpError::Timeout => BrowserErrorKind::Timeout,
        CdpError::NotFound | CdpError::FrameNotFound(_) => BrowserErrorKind::NoSuchElement,
        CdpError::Ws(_) | CdpError::ChannelSendError(_) | CdpError::NoResponse => {
            BrowserErrorKind::Transport
        }
        CdpError::Io(_) => BrowserErrorKind::Io,
        CdpError::JavascriptException(_) => BrowserErrorKind::Protocol("script exception".to_string()),
        other => {
            let message = other.to_string();
            if message.contains("No target with given id") || message.contains("Target closed") {
                BrowserErrorKind::ViewClosed
            } else if message.contains("Cannot find context") || message.contains("does not belong to the document") {
                BrowserErrorKind::StaleElement
            } else {
                BrowserErrorKind::Protocol(message)
            }
        }
    }
}

fn cdp_error(err: CdpError) -> BrowserError {
    BrowserError::new(error_kind(&err), err.to_string())
}

fn io_error(err: std::io::Error) -> BrowserError {
    BrowserError::new(BrowserErrorKind::Io, err.to_string())
}

fn protocol(message: impl Into<String>) -> BrowserError {
    BrowserError::new(BrowserErrorKind::Protocol("invalid request".to_string()), message)
}

fn stale(message: impl Into<String>) -> BrowserError {
    BrowserError::new(BrowserErrorKind::StaleElement, message)
}
