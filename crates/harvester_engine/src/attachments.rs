use std::path::PathBuf;
use std::time::Duration;

use engine_logging::{engine_debug, engine_info, engine_warn};

use crate::browser::{Browser, ElementHandle, FrameHandle, ViewId};
use crate::filename::{attachment_filename, unique_path};
use crate::frames::FrameResolver;
use crate::persist::{AtomicFileWriter, PersistError};
use crate::types::AffordanceError;
use crate::views::ViewSnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AttachmentReport {
    /// Download affordances found in the resolved frame.
    pub affordances: usize,
    pub saved: Vec<PathBuf>,
    /// `(affordance index, cause)` for every affordance that was not captured.
    pub skipped: Vec<(usize, String)>,
}

impl AttachmentReport {
    pub fn any_captured(&self) -> bool {
        !self.saved.is_empty()
    }
}

/// Saves the download affordances of one detail view.
pub struct AttachmentHarvester<'a> {
    browser: &'a dyn Browser,
    resolver: &'a FrameResolver,
    writer: AtomicFileWriter,
    download_timeout: Duration,
}

impl<'a> AttachmentHarvester<'a> {
    pub fn new(
        browser: &'a dyn Browser,
        resolver: &'a FrameResolver,
        output_dir: PathBuf,
        download_timeout: Duration,
    ) -> Self {
        Self {
            browser,
            resolver,
            writer: AtomicFileWriter::new(output_dir),
            download_timeout,
        }
    }

    /// Try every download affordance in link order. Per-affordance failures
    /// are logged and recorded, never returned.
    pub async fn harvest(&self, detail: &ViewId, title: &str) -> AttachmentReport {
        let mut report = AttachmentReport::default();
        let Some(frame) = self.resolver.resolve(self.browser, detail).await else {
            engine_debug!("No candidate frame in {}", detail);
            return report;
        };

        let selector = self.resolver.download_selector();
        report.affordances = match self.browser.find_all(&frame, selector).await {
            Ok(links) => links.len(),
            Err(err) => {
                engine_warn!("Could not list download links for {:?}: {}", title, err);
                return report;
            }
        };

        for index in 0..report.affordances {
            match self.capture_nth(detail, &frame, index, title).await {
                Ok(path) => {
                    engine_info!("    [ok] saved {}", path.display());
                    report.saved.push(path);
                }
                Err(AffordanceError::DownloadTimeout(timeout)) => {
                    engine_warn!(
                        "    [!] download #{} of {:?} timed out after {:?}; skipped",
                        index + 1,
                        title,
                        timeout
                    );
                    report
                        .skipped
                        .push((index, AffordanceError::DownloadTimeout(timeout).to_string()));
                }
                Err(err) => {
                    engine_warn!("    [!] download #{} of {:?} failed: {}", index + 1, title, err);
                    report.skipped.push((index, err.to_string()));
                }
            }
        }
        report
    }

    /// One affordance: snapshot views, act, then reap whatever the click opened.
    async fn capture_nth(
        &self,
        detail: &ViewId,
        frame: &FrameHandle,
        index: usize,
        title: &str,
    ) -> Result<PathBuf, AffordanceError> {
        // Re-query so a DOM rewritten by the previous click is picked up.
        let links = self
            .browser
            .find_all(frame, self.resolver.download_selector())
            .await?;
        let Some(link) = links.into_iter().nth(index) else {
            return Err(AffordanceError::Browser(crate::BrowserError::new(
                crate::BrowserErrorKind::NoSuchElement,
                format!("download link #{} disappeared", index + 1),
            )));
        };

        if let Err(err) = self.browser.remove_attribute(&link, "target").await {
            engine_debug!("Could not strip target from download link: {}", err);
        }

        let snapshot = ViewSnapshot::capture(self.browser).await?;
        let result = self.download_and_save(&link, title).await;
        let reaped = snapshot.reap(self.browser, &[detail]).await;
        if reaped > 0 {
            engine_debug!("Closed {} view(s) opened by download #{}", reaped, index + 1);
        }
        result
    }

    async fn download_and_save(
        &self,
        link: &ElementHandle,
        title: &str,
    ) -> Result<PathBuf, AffordanceError> {
        let download = self
            .browser
            .download(link, self.download_timeout)
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    AffordanceError::DownloadTimeout(self.download_timeout)
                } else {
                    AffordanceError::Browser(err)
                }
            })?;

        let file_name = attachment_filename(title, &download.suggested_name);
        self.save(&file_name, &download.bytes)
    }

    fn save(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, AffordanceError> {
        crate::persist::ensure_output_dir(self.writer.dir())?;
        loop {
            let target = unique_path(self.writer.dir(), file_name);
            let name = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| file_name.to_string());
            match self.writer.create_new(&name, bytes) {
                Ok(path) => return Ok(path),
                // Someone else took the name between the existence check and the rename.
                Err(PersistError::AlreadyExists(_)) => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }
}
