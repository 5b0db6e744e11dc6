use std::time::Duration;

use crate::browser::{Browser, FrameHandle, ViewId};
use crate::types::ItemError;

/// One harvested post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarvestedRecord {
    pub title: String,
    pub body_text: String,
}

/// Wait for the content container of a detail view and read its text verbatim.
pub async fn harvest_text(
    browser: &dyn Browser,
    detail: &ViewId,
    title: &str,
    content_selector: &str,
    timeout: Duration,
) -> Result<HarvestedRecord, ItemError> {
    let page = FrameHandle::root(detail.clone());
    let container = browser
        .wait_for_visible(&page, content_selector, timeout)
        .await
        .map_err(|source| ItemError::ContentMissing {
            selector: content_selector.to_string(),
            source,
        })?;
    let body_text = browser.text(&container).await?;
    Ok(HarvestedRecord {
        title: title.to_string(),
        body_text,
    })
}
