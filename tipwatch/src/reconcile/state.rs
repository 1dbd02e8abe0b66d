//! Reconciliation states and per-cycle reports.

use std::fmt;

use crate::analytics::ProcessedBlock;
use crate::types::BlockHash;

/// Relationship between the local window and the remote chain, as
/// classified by the most recent cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// No blocks held yet; the next cycle initialises the window.
    Empty,
    /// Local head is the remote tip.
    Synced,
    /// Remote tip is higher on the same branch; the window is extended.
    Stale,
    /// Local head differs from the remote block at its height, or the
    /// remote tip fell below it; the window is repaired.
    Diverged,
    /// No common ancestor was found within the window; it was discarded
    /// and rebuilt from the remote tip.
    Resetting,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Empty => "empty",
            SyncState::Synced => "synced",
            SyncState::Stale => "stale",
            SyncState::Diverged => "diverged",
            SyncState::Resetting => "resetting",
        }
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a diverged window was repaired.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RepairSummary {
    pub ancestor_id: BlockHash,
    pub ancestor_height: u64,
    /// Blocks newer than the ancestor that were dropped from the window.
    pub discarded: usize,
    /// Blocks examined by the ancestor search.
    pub search_steps: usize,
}

/// Outcome of one successful reconciliation cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct CycleReport {
    pub state: SyncState,
    /// `true` if new blocks were prepended to the window.
    pub grew: bool,
    /// Number of blocks prepended this cycle.
    pub ingested: usize,
    /// Blocks dropped from the tail to respect the window size.
    pub trimmed: usize,
    /// Metrics and anomaly reports for newly processed blocks, oldest first.
    pub processed: Vec<ProcessedBlock>,
    pub repair: Option<RepairSummary>,
    /// The window was discarded and rebuilt.
    pub full_reset: bool,
}

impl CycleReport {
    pub fn new(state: SyncState) -> Self {
        Self {
            state,
            grew: false,
            ingested: 0,
            trimmed: 0,
            processed: Vec::new(),
            repair: None,
            full_reset: false,
        }
    }
}
