//! Bounded, head-first window of recently observed blocks.
//!
//! The window keeps blocks ordered from the current head (index 0) down
//! to the oldest retained block. Every adjacent pair is linked:
//! `blocks[i].parent_id == blocks[i + 1].id` and
//! `blocks[i].height == blocks[i + 1].height + 1`. All mutating operations
//! either preserve that invariant or fail before touching the contents.

use std::collections::VecDeque;

use crate::types::{Block, BlockHash};

/// Errors raised by [`WindowStore`] mutations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WindowError {
    /// A block does not extend the current head.
    #[error(
        "block {block} at height {height} does not extend head {head} at height {head_height}"
    )]
    InvariantViolation {
        block: BlockHash,
        height: u64,
        head: BlockHash,
        head_height: u64,
    },
    /// A truncation index beyond the current length.
    #[error("index {index} out of range for window of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Ordered sequence of locally known blocks, head first.
///
/// Owned exclusively by the reconciler; no interior mutability.
#[derive(Clone, Debug, Default)]
pub struct WindowStore {
    blocks: VecDeque<Block>,
}

impl WindowStore {
    /// Creates an empty window.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Returns the current head (highest block), if any.
    pub fn head(&self) -> Option<&Block> {
        self.blocks.front()
    }

    /// Returns the oldest retained block, if any.
    pub fn tail(&self) -> Option<&Block> {
        self.blocks.back()
    }

    /// Membership test by id over every block currently held.
    pub fn contains(&self, id: &BlockHash) -> bool {
        self.position(id).is_some()
    }

    /// Returns the index of the block with `id`, if held.
    pub fn position(&self, id: &BlockHash) -> Option<usize> {
        self.blocks.iter().position(|b| &b.id == id)
    }

    /// Iterates head first.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.iter()
    }

    /// Ids head first.
    pub fn ids(&self) -> Vec<BlockHash> {
        self.blocks.iter().map(|b| b.id).collect()
    }

    /// Checks that `block` would extend the current head.
    ///
    /// An empty window accepts any block.
    pub fn check_extends(&self, block: &Block) -> Result<(), WindowError> {
        match self.head() {
            None => Ok(()),
            Some(head) if block.extends(head) => Ok(()),
            Some(head) => Err(WindowError::InvariantViolation {
                block: block.id,
                height: block.height,
                head: head.id,
                head_height: head.height,
            }),
        }
    }

    /// Checks an oldest-first batch as if each block were prepended in turn,
    /// without mutating the window.
    pub fn check_batch(&self, batch: &[Block]) -> Result<(), WindowError> {
        let Some(first) = batch.first() else {
            return Ok(());
        };
        self.check_extends(first)?;

        for pair in batch.windows(2) {
            if !pair[1].extends(&pair[0]) {
                return Err(WindowError::InvariantViolation {
                    block: pair[1].id,
                    height: pair[1].height,
                    head: pair[0].id,
                    head_height: pair[0].height,
                });
            }
        }
        Ok(())
    }

    /// Inserts `block` as the new head.
    ///
    /// Fails with [`WindowError::InvariantViolation`] unless the block
    /// extends the current head (or the window is empty).
    pub fn prepend(&mut self, block: Block) -> Result<(), WindowError> {
        self.check_extends(&block)?;
        self.blocks.push_front(block);
        Ok(())
    }

    /// Keeps the suffix starting at `index`, discarding every block newer
    /// than the one at that position.
    pub fn truncate_from_index(&mut self, index: usize) -> Result<(), WindowError> {
        if index >= self.blocks.len() {
            return Err(WindowError::IndexOutOfRange {
                index,
                len: self.blocks.len(),
            });
        }
        self.blocks.drain(..index);
        Ok(())
    }

    /// Drops the oldest blocks so that at most `window_size` remain.
    ///
    /// Returns how many blocks were dropped.
    pub fn trim_to_capacity(&mut self, window_size: usize) -> usize {
        let excess = self.blocks.len().saturating_sub(window_size);
        self.blocks.truncate(window_size);
        excess
    }

    /// Empties the window.
    pub fn reset(&mut self) {
        self.blocks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain(len: u64, tag: &str) -> Vec<Block> {
        let mut out: Vec<Block> = Vec::new();
        for height in 0..len {
            let parent = out.last().map(|b| b.id);
            out.push(Block {
                id: BlockHash::digest(format!("{tag}:{height}").as_bytes()),
                height,
                parent_id: parent,
                timestamp: 1_700_000_000 + height * 600,
                tx_count: 1 + height,
                size_bytes: 1_000,
                weight: 4_000,
            });
        }
        out
    }

    fn filled(blocks: &[Block]) -> WindowStore {
        let mut window = WindowStore::new();
        for b in blocks {
            window.prepend(b.clone()).expect("linked chain");
        }
        window
    }

    #[test]
    fn prepend_builds_head_first_sequence() {
        let blocks = chain(4, "a");
        let window = filled(&blocks);

        assert_eq!(window.len(), 4);
        assert_eq!(window.head().unwrap().height, 3);
        assert_eq!(window.tail().unwrap().height, 0);
        assert_eq!(window.position(&blocks[1].id), Some(2));
    }

    #[test]
    fn prepend_rejects_unlinked_block_without_mutation() {
        let blocks = chain(3, "a");
        let mut window = filled(&blocks);
        let stranger = chain(5, "b").pop().unwrap();

        let err = window.prepend(stranger.clone()).unwrap_err();
        assert!(matches!(err, WindowError::InvariantViolation { height: 4, .. }));
        assert_eq!(window.len(), 3);
        assert!(!window.contains(&stranger.id));
    }

    #[test]
    fn prepend_rejects_height_gap() {
        let blocks = chain(3, "a");
        let mut window = filled(&blocks);
        let mut gapped = chain(4, "a").pop().unwrap();
        gapped.height = 7;

        assert!(window.prepend(gapped).is_err());
    }

    #[test]
    fn check_batch_validates_links_between_members() {
        let blocks = chain(6, "a");
        let window = filled(&blocks[..3]);

        assert!(window.check_batch(&blocks[3..]).is_ok());
        assert!(window.check_batch(&[]).is_ok());
        // Skipping a block breaks the first link.
        assert!(window.check_batch(&blocks[4..]).is_err());
        // Broken link inside the batch.
        let broken = vec![blocks[3].clone(), blocks[5].clone()];
        assert!(window.check_batch(&broken).is_err());
    }

    #[test]
    fn truncate_keeps_suffix_from_index() {
        let blocks = chain(5, "a");
        let mut window = filled(&blocks);

        window.truncate_from_index(2).unwrap();
        assert_eq!(window.len(), 3);
        assert_eq!(window.head().unwrap().id, blocks[2].id);

        assert_eq!(
            window.truncate_from_index(3),
            Err(WindowError::IndexOutOfRange { index: 3, len: 3 })
        );
    }

    #[test]
    fn trim_drops_oldest_blocks() {
        let blocks = chain(5, "a");
        let mut window = filled(&blocks);

        assert_eq!(window.trim_to_capacity(3), 2);
        assert_eq!(window.len(), 3);
        assert_eq!(window.tail().unwrap().height, 2);
        assert_eq!(window.trim_to_capacity(10), 0);
    }

    #[test]
    fn reset_empties_and_accepts_any_head() {
        let blocks = chain(3, "a");
        let mut window = filled(&blocks);
        window.reset();
        assert!(window.is_empty());

        let other = chain(9, "b").pop().unwrap();
        window.prepend(other).expect("empty window accepts any block");
    }
}
