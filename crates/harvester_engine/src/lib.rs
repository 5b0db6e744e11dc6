//! Harvester engine: browser capability, effect execution and persistence.
mod attachments;
mod batch;
mod browser;
mod checkpoint;
mod chromium;
mod driver;
mod filename;
mod frames;
mod persist;
mod settings;
mod text;
mod types;
mod views;

pub use attachments::{AttachmentHarvester, AttachmentReport};
pub use batch::{build_batch_document, Clock, TextBatch};
pub use browser::{
    Browser, BrowserError, BrowserErrorKind, ClickModifier, Download, ElementHandle, Frame,
    FrameHandle, ViewId,
};
pub use checkpoint::{CheckpointError, CheckpointStore};
pub use chromium::{error_kind, ChromiumBrowser, ChromiumSettings};
pub use driver::Harvester;
pub use filename::{
    attachment_filename, decode_suggested_name, sanitize_component, unique_path,
    FILENAME_MAX_CHARS, TITLE_MAX_CHARS,
};
pub use frames::{pick_best, AffordanceCounts, FrameResolver};
pub use persist::{ensure_output_dir, AtomicFileWriter, PersistError};
pub use settings::{HarvestSettings, Selectors, Timeouts};
pub use text::{harvest_text, HarvestedRecord};
pub use types::{
    AffordanceError, HarvestEvent, ItemError, NoopProgressSink, ProgressSink, RunError, RunSummary,
};
pub use views::ViewSnapshot;
