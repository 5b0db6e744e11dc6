//! Harvester core: pure pagination/dedup state machine and checkpoint data.
mod checkpoint;
mod effect;
mod msg;
mod state;
mod update;
mod view_model;

pub use checkpoint::{Checkpoint, RunCounters, SeenSet};
pub use effect::{Effect, RunEnd};
pub use msg::{ItemOutcome, Msg};
pub use state::{HarvestState, ListingEntry, Phase, RunMode, RunStats, DEFAULT_BATCH_SIZE};
pub use update::update;
pub use view_model::HarvestView;
