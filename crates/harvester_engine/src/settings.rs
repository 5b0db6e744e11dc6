use std::path::PathBuf;
use std::time::Duration;

use harvester_core::{RunMode, DEFAULT_BATCH_SIZE};

/// Selectors for the fixed listing → detail → attachment layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selectors {
    /// Name of the frame holding the listing; `None` means the page itself.
    pub listing_frame: Option<String>,
    pub entry_link: String,
    pub next_link: String,
    pub download_link: String,
    pub preview_link: String,
    pub content: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            listing_frame: Some("f3".to_string()),
            entry_link: "a.o_title".to_string(),
            next_link: "a.next".to_string(),
            download_link: "a[href*='dn?']".to_string(),
            preview_link: "a[href*='sf?']".to_string(),
            content: "div.post_text".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Timeouts {
    /// Wait for the listing to render.
    pub listing: Duration,
    /// Wait for the detail view to appear after the modifier click.
    pub detail_open: Duration,
    /// Wait for the detail document to be parsed.
    pub detail_load: Duration,
    /// Wait for a file transfer after clicking a download affordance.
    pub download: Duration,
    /// Wait for the content container in text mode.
    pub content: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            listing: Duration::from_secs(20),
            detail_open: Duration::from_secs(15),
            detail_load: Duration::from_secs(15),
            download: Duration::from_secs(10),
            content: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HarvestSettings {
    pub mode: RunMode,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    /// Pause after invoking "next" so the rewriting proxy can settle.
    pub page_settle: Duration,
    /// Pause after every item.
    pub item_pause: Duration,
    pub batch_size: u64,
    /// Attachments (attachment mode) or batch documents (text mode).
    pub output_dir: PathBuf,
    pub checkpoint_path: PathBuf,
    /// Prefix of text batch artifacts.
    pub artifact_prefix: String,
}

impl HarvestSettings {
    pub fn new(mode: RunMode, output_dir: PathBuf, checkpoint_path: PathBuf) -> Self {
        Self {
            mode,
            selectors: Selectors::default(),
            timeouts: Timeouts::default(),
            page_settle: Duration::from_secs(3),
            item_pause: Duration::from_millis(400),
            batch_size: DEFAULT_BATCH_SIZE,
            output_dir,
            checkpoint_path,
            artifact_prefix: "Forum".to_string(),
        }
    }
}
