//! Chain-tip reconciliation.
//!
//! This module keeps the local block window consistent with the remote
//! chain:
//!
//! - [`Reconciler`]: drives one reconciliation cycle at a time,
//! - [`find_common_ancestor`]: locates the fork point of a diverged window,
//! - [`SyncState`] / [`CycleReport`]: what a cycle saw and did,
//! - [`ReconcileError`]: why a cycle ended early.

pub mod ancestor;
pub mod config;
pub mod engine;
pub mod error;
pub mod state;

pub use ancestor::{AncestorSearch, find_common_ancestor};
pub use config::ReconcilerConfig;
pub use engine::Reconciler;
pub use error::ReconcileError;
pub use state::{CycleReport, RepairSummary, SyncState};
