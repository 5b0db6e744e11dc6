//! In-memory forum behind the `Browser` capability: a paginated listing in
//! frame `f3`, detail views with attachments in a nested frame, and text
//! bodies in `div.post_text`.
use std::sync::Mutex;
use std::time::Duration;

use harvester_engine::{
    Browser, BrowserError, BrowserErrorKind, ClickModifier, Download, ElementHandle, Frame,
    FrameHandle, ViewId,
};

pub const LISTING_VIEW: &str = "listing";
const LISTING_FRAME_ELEMENT: &str = "f3-element";
const CONTENT_FRAME_ELEMENT: &str = "content-element";

#[derive(Debug, Clone)]
pub enum Attachment {
    Downloads { name: String, bytes: Vec<u8> },
    /// Transfers the file and also leaves a preview view behind.
    OpensPreview { name: String, bytes: Vec<u8> },
    /// Nothing happens.
    Hangs,
}

impl Attachment {
    pub fn file(name: &str, bytes: &[u8]) -> Self {
        Attachment::Downloads {
            name: name.to_string(),
            bytes: bytes.to_vec(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Post {
    pub href: String,
    pub title: String,
    pub attachments: Vec<Attachment>,
    pub body: Option<String>,
    /// `false` makes the Ctrl-click open nothing.
    pub opens: bool,
}

impl Post {
    pub fn new(href: &str, title: &str) -> Self {
        Self {
            href: href.to_string(),
            title: title.to_string(),
            attachments: Vec::new(),
            body: None,
            opens: true,
        }
    }

    pub fn with_attachment(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    pub fn with_body(mut self, body: &str) -> Self {
        self.body = Some(body.to_string());
        self
    }

    pub fn never_opens(mut self) -> Self {
        self.opens = false;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ViewKind {
    Listing,
    Detail { page: usize, post: usize },
    Stray,
}

#[derive(Debug)]
struct ForumState {
    pages: Vec<Vec<Post>>,
    current_page: usize,
    views: Vec<(ViewId, ViewKind)>,
    next_view: usize,
    pending_download: Option<Download>,
    clicked_entries: Vec<String>,
    closed: Vec<ViewId>,
    next_link_unreadable: bool,
    failing_views_calls: usize,
}

pub struct ScriptedForum {
    state: Mutex<ForumState>,
}

impl ScriptedForum {
    pub fn new(pages: Vec<Vec<Post>>) -> Self {
        Self {
            state: Mutex::new(ForumState {
                pages,
                current_page: 0,
                views: vec![(ViewId(LISTING_VIEW.to_string()), ViewKind::Listing)],
                next_view: 1,
                pending_download: None,
                clicked_entries: Vec::new(),
                closed: Vec::new(),
                next_link_unreadable: false,
                failing_views_calls: 0,
            }),
        }
    }

    /// Every attribute read on the "next" link fails from now on.
    pub fn break_next_link(&self) {
        self.state.lock().unwrap().next_link_unreadable = true;
    }

    /// The next `calls` view enumerations fail.
    pub fn fail_views(&self, calls: usize) {
        self.state.lock().unwrap().failing_views_calls = calls;
    }

    pub fn listing_view() -> ViewId {
        ViewId(LISTING_VIEW.to_string())
    }

    /// Open the detail view of a post without going through the listing.
    pub fn open_detail(&self, page: usize, post: usize) -> ViewId {
        let mut state = self.state.lock().unwrap();
        open_view(&mut state, ViewKind::Detail { page, post }, "detail")
    }

    /// Hrefs of every entry that was Ctrl-clicked, in order.
    pub fn clicked_entries(&self) -> Vec<String> {
        self.state.lock().unwrap().clicked_entries.clone()
    }

    pub fn closed_views(&self) -> Vec<ViewId> {
        self.state.lock().unwrap().closed.clone()
    }

    pub fn open_views(&self) -> Vec<ViewId> {
        let state = self.state.lock().unwrap();
        state.views.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn current_page(&self) -> usize {
        self.state.lock().unwrap().current_page
    }
}

fn open_view(state: &mut ForumState, kind: ViewKind, prefix: &str) -> ViewId {
    let id = ViewId(format!("{prefix}-{}", state.next_view));
    state.next_view += 1;
    state.views.push((id.clone(), kind));
    id
}

fn missing(what: impl Into<String>) -> BrowserError {
    BrowserError::new(BrowserErrorKind::NoSuchElement, what)
}

fn view_kind(state: &ForumState, view: &ViewId) -> Result<ViewKind, BrowserError> {
    state
        .views
        .iter()
        .find(|(id, _)| id == view)
        .map(|(_, kind)| kind.clone())
        .ok_or_else(|| BrowserError::new(BrowserErrorKind::ViewClosed, view.0.clone()))
}

fn detail_post<'a>(state: &'a ForumState, view: &ViewId) -> Result<&'a Post, BrowserError> {
    match view_kind(state, view)? {
        ViewKind::Detail { page, post } => state
            .pages
            .get(page)
            .and_then(|posts| posts.get(post))
            .ok_or_else(|| missing("post")),
        _ => Err(missing("not a detail view")),
    }
}

fn indexed(id: &str, prefix: &str) -> Option<usize> {
    id.strip_prefix(prefix)?.parse().ok()
}

fn is_last_page(state: &ForumState) -> bool {
    state.current_page + 1 >= state.pages.len()
}

#[async_trait::async_trait]
impl Browser for ScriptedForum {
    async fn navigate(&self, _view: &ViewId, _url: &str) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn wait_for_load(&self, view: &ViewId, _timeout: Duration) -> Result<(), BrowserError> {
        let state = self.state.lock().unwrap();
        view_kind(&state, view).map(|_| ())
    }

    async fn views(&self) -> Result<Vec<ViewId>, BrowserError> {
        let mut state = self.state.lock().unwrap();
        if state.failing_views_calls > 0 {
            state.failing_views_calls -= 1;
            return Err(BrowserError::new(
                BrowserErrorKind::Transport,
                "connection reset while listing views",
            ));
        }
        Ok(state.views.iter().map(|(id, _)| id.clone()).collect())
    }

    async fn frames(&self, view: &ViewId) -> Result<Vec<Frame>, BrowserError> {
        let state = self.state.lock().unwrap();
        let root = FrameHandle::root(view.clone());
        let nested = match view_kind(&state, view)? {
            ViewKind::Listing => vec![Frame {
                handle: root.child(LISTING_FRAME_ELEMENT),
                name: Some("f3".to_string()),
            }],
            ViewKind::Detail { .. } => vec![Frame {
                handle: root.child(CONTENT_FRAME_ELEMENT),
                name: Some("content".to_string()),
            }],
            ViewKind::Stray => Vec::new(),
        };
        let mut frames = vec![Frame {
            handle: root,
            name: None,
        }];
        frames.extend(nested);
        Ok(frames)
    }

    async fn find_all(
        &self,
        scope: &FrameHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>, BrowserError> {
        let state = self.state.lock().unwrap();
        let element = |id: String| ElementHandle {
            frame: scope.clone(),
            id,
        };
        let ids: Vec<String> = match (view_kind(&state, &scope.view)?, scope.path.as_slice()) {
            (ViewKind::Listing, [frame]) if frame == LISTING_FRAME_ELEMENT => match selector {
                "a.o_title" => (0..state.pages[state.current_page].len())
                    .map(|i| format!("entry:{i}"))
                    .collect(),
                "a.next" => vec!["next".to_string()],
                _ => Vec::new(),
            },
            (ViewKind::Detail { .. }, [frame]) if frame == CONTENT_FRAME_ELEMENT => {
                let post = detail_post(&state, &scope.view)?;
                match selector {
                    "a[href*='dn?']" => (0..post.attachments.len())
                        .map(|k| format!("dn:{k}"))
                        .collect(),
                    "a[href*='sf?']" => (0..post.attachments.len())
                        .map(|k| format!("sf:{k}"))
                        .collect(),
                    _ => Vec::new(),
                }
            }
            (ViewKind::Detail { .. }, []) => {
                let post = detail_post(&state, &scope.view)?;
                match selector {
                    "div.post_text" if post.body.is_some() => vec!["body".to_string()],
                    _ => Vec::new(),
                }
            }
            _ => Vec::new(),
        };
        Ok(ids.into_iter().map(element).collect())
    }

    async fn text(&self, element: &ElementHandle) -> Result<String, BrowserError> {
        let state = self.state.lock().unwrap();
        if let Some(i) = indexed(&element.id, "entry:") {
            let post = state.pages[state.current_page]
                .get(i)
                .ok_or_else(|| missing(element.id.clone()))?;
            return Ok(format!("  {}  ", post.title));
        }
        if element.id == "body" {
            let post = detail_post(&state, &element.frame.view)?;
            return post.body.clone().ok_or_else(|| missing("body"));
        }
        Ok(String::new())
    }

    async fn attribute(
        &self,
        element: &ElementHandle,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        let state = self.state.lock().unwrap();
        if let Some(i) = indexed(&element.id, "entry:") {
            let post = state.pages[state.current_page]
                .get(i)
                .ok_or_else(|| missing(element.id.clone()))?;
            return Ok((name == "href").then(|| post.href.clone()));
        }
        if element.id == "next" {
            if state.next_link_unreadable {
                return Err(BrowserError::new(
                    BrowserErrorKind::StaleElement,
                    format!("`{name}` of the next link"),
                ));
            }
            return Ok(match name {
                "href" => Some("javascript:nextPage()".to_string()),
                "class" if is_last_page(&state) => Some("next disabled".to_string()),
                "class" => Some("next".to_string()),
                _ => None,
            });
        }
        Ok(None)
    }

    async fn is_visible(&self, _element: &ElementHandle) -> Result<bool, BrowserError> {
        Ok(true)
    }

    async fn remove_attribute(
        &self,
        _element: &ElementHandle,
        _name: &str,
    ) -> Result<(), BrowserError> {
        Ok(())
    }

    async fn click(
        &self,
        element: &ElementHandle,
        _modifier: ClickModifier,
    ) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        if let Some(i) = indexed(&element.id, "entry:") {
            let page = state.current_page;
            let post = state.pages[page]
                .get(i)
                .cloned()
                .ok_or_else(|| missing(element.id.clone()))?;
            state.clicked_entries.push(post.href.clone());
            if post.opens {
                open_view(&mut state, ViewKind::Detail { page, post: i }, "detail");
            }
            return Ok(());
        }
        if element.id == "next" {
            if !is_last_page(&state) {
                state.current_page += 1;
            }
            return Ok(());
        }
        if let Some(k) = indexed(&element.id, "dn:") {
            let post = detail_post(&state, &element.frame.view)?;
            let attachment = post
                .attachments
                .get(k)
                .cloned()
                .ok_or_else(|| missing(element.id.clone()))?;
            match attachment {
                Attachment::Downloads { name, bytes } => {
                    state.pending_download = Some(Download {
                        suggested_name: name,
                        bytes,
                    });
                }
                Attachment::OpensPreview { name, bytes } => {
                    state.pending_download = Some(Download {
                        suggested_name: name,
                        bytes,
                    });
                    open_view(&mut state, ViewKind::Stray, "preview");
                }
                Attachment::Hangs => {}
            }
            return Ok(());
        }
        Err(missing(element.id.clone()))
    }

    async fn download(
        &self,
        link: &ElementHandle,
        timeout: Duration,
    ) -> Result<Download, BrowserError> {
        // Only the transfer this click starts counts.
        self.state.lock().unwrap().pending_download = None;
        self.click(link, ClickModifier::None).await?;
        let mut state = self.state.lock().unwrap();
        state
            .pending_download
            .take()
            .ok_or_else(|| BrowserError::timeout(format!("no download within {timeout:?}")))
    }

    async fn close_view(&self, view: &ViewId) -> Result<(), BrowserError> {
        let mut state = self.state.lock().unwrap();
        let before = state.views.len();
        state.views.retain(|(id, _)| id != view);
        if state.views.len() == before {
            return Err(BrowserError::new(BrowserErrorKind::ViewClosed, view.0.clone()));
        }
        state.closed.push(view.clone());
        Ok(())
    }
}
