use std::collections::HashSet;

use engine_logging::{engine_debug, engine_warn};

use crate::browser::{Browser, BrowserError, ViewId};

/// The set of open views at one moment. Views opened afterwards can be reaped.
#[derive(Debug, Clone)]
pub struct ViewSnapshot {
    views: HashSet<ViewId>,
}

impl ViewSnapshot {
    pub async fn capture(browser: &dyn Browser) -> Result<Self, BrowserError> {
        let views = browser.views().await?;
        Ok(Self {
            views: views.into_iter().collect(),
        })
    }

    pub fn contains(&self, view: &ViewId) -> bool {
        self.views.contains(view)
    }

    /// Close every view opened since the snapshot except those in `keep`.
    /// Returns how many were closed; failures are logged.
    pub async fn reap(&self, browser: &dyn Browser, keep: &[&ViewId]) -> usize {
        let current = match browser.views().await {
            Ok(views) => views,
            Err(err) => {
                engine_warn!("Could not list views for cleanup: {}", err);
                return 0;
            }
        };

        let mut closed = 0;
        for view in current {
            if self.views.contains(&view) || keep.contains(&&view) {
                continue;
            }
            match browser.close_view(&view).await {
                Ok(()) => {
                    engine_debug!("Closed extra view {}", view);
                    closed += 1;
                }
                Err(err) => engine_warn!("Could not close view {}: {}", view, err),
            }
        }
        closed
    }
}

/// Views present now that are not in `before`, in enumeration order.
pub(crate) fn new_views(before: &ViewSnapshot, now: Vec<ViewId>) -> Vec<ViewId> {
    now.into_iter().filter(|view| !before.contains(view)).collect()
}
