//! Common-ancestor search between the window and the remote branch.

use std::collections::HashSet;

use crate::source::ChainSource;
use crate::storage::WindowStore;
use crate::types::{Block, BlockHash};

use super::error::ReconcileError;

/// Result of a conclusive search.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AncestorSearch {
    /// Highest remote block also held in the window.
    Found { block: Block, steps: usize },
    /// No block of the window lies on the remote branch.
    NotFound { steps: usize },
}

/// Walks the remote branch backwards from `start` via parent links until a
/// block held in `window` is met.
///
/// The walk concludes "not found" once it has examined a block at or
/// below the window's lowest height, or reaches genesis. With
/// `max_steps = Some(k)` at most `k` blocks are examined; running out of
/// budget first yields [`ReconcileError::AncestorSearchExceeded`]. An
/// unavailable fetch aborts the search. The window is never mutated.
pub async fn find_common_ancestor<S>(
    source: &S,
    window: &WindowStore,
    start: Block,
    max_steps: Option<usize>,
) -> Result<AncestorSearch, ReconcileError>
where
    S: ChainSource,
{
    let Some(floor) = window.tail().map(|b| b.height) else {
        return Ok(AncestorSearch::NotFound { steps: 0 });
    };
    let ids: HashSet<BlockHash> = window.iter().map(|b| b.id).collect();

    let mut current = start;
    let mut steps = 0usize;

    loop {
        steps += 1;
        if ids.contains(&current.id) {
            return Ok(AncestorSearch::Found {
                block: current,
                steps,
            });
        }
        if current.height <= floor {
            return Ok(AncestorSearch::NotFound { steps });
        }
        let Some(parent_id) = current.parent_id else {
            return Ok(AncestorSearch::NotFound { steps });
        };
        if max_steps.is_some_and(|max| steps >= max) {
            return Err(ReconcileError::AncestorSearchExceeded { steps });
        }

        tracing::debug!(height = current.height, step = steps, "ancestor search stepping back");
        current = source.get_block(&parent_id).await?;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemoryChainSource;

    /// Window holding canonical heights `lo..=hi`.
    fn window_of(source: &InMemoryChainSource, lo: u64, hi: u64) -> WindowStore {
        let mut window = WindowStore::new();
        for h in lo..=hi {
            window
                .prepend(source.canonical_block(h).unwrap().clone())
                .unwrap();
        }
        window
    }

    #[tokio::test]
    async fn finds_fork_point_inside_window() {
        let mut source = InMemoryChainSource::linear(10, "main");
        let window = window_of(&source, 5, 9);
        let fork_parent = source.canonical_block(6).unwrap().clone();

        let branch = source.reorg(7, 4, "alt");
        let start = branch[2].clone(); // height 9

        let found = find_common_ancestor(&source, &window, start, None)
            .await
            .unwrap();
        assert_eq!(
            found,
            AncestorSearch::Found {
                block: fork_parent,
                steps: 4
            }
        );
    }

    #[tokio::test]
    async fn stops_at_window_floor_when_fork_is_deeper() {
        let mut source = InMemoryChainSource::linear(10, "main");
        let window = window_of(&source, 7, 9);
        let branch = source.reorg(3, 7, "alt");
        let start = branch[6].clone(); // height 9

        let calls = source.calls();
        let result = find_common_ancestor(&source, &window, start, None)
            .await
            .unwrap();

        assert_eq!(result, AncestorSearch::NotFound { steps: 3 });
        assert_eq!(source.calls() - calls, 2);
    }

    #[tokio::test]
    async fn bounded_search_reports_exceeded() {
        let mut source = InMemoryChainSource::linear(10, "main");
        let window = window_of(&source, 2, 9);
        let branch = source.reorg(4, 6, "alt");
        let start = branch[5].clone();

        let err = find_common_ancestor(&source, &window, start, Some(3))
            .await
            .unwrap_err();
        assert_eq!(err, ReconcileError::AncestorSearchExceeded { steps: 3 });
    }

    #[tokio::test]
    async fn unavailable_source_aborts_search() {
        let mut source = InMemoryChainSource::linear(10, "main");
        let window = window_of(&source, 5, 9);
        let branch = source.reorg(6, 4, "alt");
        source.fail_after(0);

        let err = find_common_ancestor(&source, &window, branch[3].clone(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ReconcileError::Unavailable(_)));
    }
}
