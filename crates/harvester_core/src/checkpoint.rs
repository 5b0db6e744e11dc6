use std::collections::BTreeSet;

/// Identities of listing entries whose harvesting attempt has completed.
///
/// Grows monotonically. Iteration is sorted so persisted checkpoints are
/// deterministic; the order carries no meaning.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SeenSet {
    ids: BTreeSet<String>,
}

impl SeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, identity: &str) -> bool {
        self.ids.contains(identity)
    }

    /// Returns `true` when the identity was not present before.
    pub fn insert(&mut self, identity: impl Into<String>) -> bool {
        self.ids.insert(identity.into())
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }
}

impl FromIterator<String> for SeenSet {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Text-mode progress counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunCounters {
    /// Successfully harvested records, across all runs.
    pub total_count: u64,
    /// Index of the next batch artifact to be written.
    pub file_idx: u64,
}

impl Default for RunCounters {
    fn default() -> Self {
        Self {
            total_count: 0,
            file_idx: 1,
        }
    }
}

/// Everything needed to resume a run. Counters are only carried in text mode.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Checkpoint {
    pub seen: SeenSet,
    pub counters: Option<RunCounters>,
}
