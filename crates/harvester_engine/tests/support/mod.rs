#![allow(dead_code)]

pub mod scripted_forum;

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use harvester_core::RunMode;
use harvester_engine::{HarvestEvent, HarvestSettings, ProgressSink};

/// Settings with every pause removed and short waits.
pub fn fast_settings(mode: RunMode, root: &Path) -> HarvestSettings {
    engine_logging::initialize_for_tests();
    let mut settings = HarvestSettings::new(
        mode,
        root.join("out"),
        root.join("state").join("progress.json"),
    );
    settings.page_settle = Duration::ZERO;
    settings.item_pause = Duration::ZERO;
    settings.timeouts.listing = Duration::from_millis(200);
    settings.timeouts.detail_open = Duration::from_millis(50);
    settings.timeouts.detail_load = Duration::from_millis(50);
    settings.timeouts.download = Duration::from_millis(50);
    settings.timeouts.content = Duration::from_millis(50);
    settings
}

#[derive(Default, Clone)]
pub struct RecordingSink {
    events: Arc<Mutex<Vec<HarvestEvent>>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<HarvestEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: HarvestEvent) {
        self.events.lock().unwrap().push(event);
    }
}
