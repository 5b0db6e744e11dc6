use engine_logging::{engine_debug, engine_warn};

use crate::browser::{Browser, FrameHandle, ViewId};

/// Affordance counts of one candidate frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AffordanceCounts {
    pub download: usize,
    pub preview: usize,
}

impl AffordanceCounts {
    /// Download links weigh ten previews.
    pub fn score(&self) -> i64 {
        10 * self.download as i64 + self.preview as i64
    }
}

/// Highest-scoring candidate; the first one encountered wins ties.
pub fn pick_best<T>(candidates: impl IntoIterator<Item = (T, AffordanceCounts)>) -> Option<T> {
    let mut best: Option<(T, i64)> = None;
    for (candidate, counts) in candidates {
        let score = counts.score();
        let better = match &best {
            Some((_, best_score)) => score > *best_score,
            None => score >= 0,
        };
        if better {
            best = Some((candidate, score));
        }
    }
    best.map(|(candidate, _)| candidate)
}

/// Finds the sub-view of a detail page that holds its attachments.
#[derive(Debug, Clone)]
pub struct FrameResolver {
    download_selector: String,
    preview_selector: String,
}

impl FrameResolver {
    pub fn new(download_selector: impl Into<String>, preview_selector: impl Into<String>) -> Self {
        Self {
            download_selector: download_selector.into(),
            preview_selector: preview_selector.into(),
        }
    }

    pub fn download_selector(&self) -> &str {
        &self.download_selector
    }

    /// Best candidate among the view and all of its frames. A candidate whose
    /// link count fails scores zero.
    pub async fn resolve(&self, browser: &dyn Browser, view: &ViewId) -> Option<FrameHandle> {
        let candidates = match browser.frames(view).await {
            Ok(frames) => frames.into_iter().map(|frame| frame.handle).collect(),
            Err(err) => {
                engine_warn!("Frame enumeration failed for {}: {}; using page only", view, err);
                vec![FrameHandle::root(view.clone())]
            }
        };

        let mut scored = Vec::with_capacity(candidates.len());
        for frame in candidates {
            let counts = self.count_links(browser, &frame).await;
            engine_debug!(
                "Frame {:?}: dn={} sf={} score={}",
                frame.path,
                counts.download,
                counts.preview,
                counts.score()
            );
            scored.push((frame, counts));
        }
        pick_best(scored)
    }

    async fn count_links(&self, browser: &dyn Browser, frame: &FrameHandle) -> AffordanceCounts {
        let download = browser.find_all(frame, &self.download_selector).await;
        let preview = browser.find_all(frame, &self.preview_selector).await;
        match (download, preview) {
            (Ok(download), Ok(preview)) => AffordanceCounts {
                download: download.len(),
                preview: preview.len(),
            },
            (Err(err), _) | (_, Err(err)) => {
                engine_debug!("Link count failed in frame {:?}: {}", frame.path, err);
                AffordanceCounts::default()
            }
        }
    }
}
