use crate::source::SourceError;
use crate::storage::WindowError;

/// Errors that end a reconciliation cycle early.
///
/// In every case the window is left in its last consistent state; the
/// cycle can simply be retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    /// A remote fetch could not be completed.
    #[error(transparent)]
    Unavailable(#[from] SourceError),
    /// Accepting the fetched blocks would break window contiguity. Points
    /// at a logic bug or an inconsistent data source; never absorbed.
    #[error("window invariant violated: {0}")]
    InvariantViolation(#[from] WindowError),
    /// The ancestor search used its step budget without finding or
    /// ruling out a common ancestor. No reset is performed.
    #[error("common ancestor search inconclusive after {steps} steps")]
    AncestorSearchExceeded { steps: usize },
}
