// tipwatch/src/types/block.rs

//! Block records as observed from the remote chain.
//!
//! The monitor never builds or validates blocks itself; it only mirrors
//! what the remote source already selected. A [`Block`] therefore carries
//! just the linkage fields needed for reconciliation plus the basic
//! statistics consumed by the analytics pipeline.

use serde::{Deserialize, Serialize};

use super::BlockHash;

/// A block fetched from the remote chain. Immutable once fetched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Identity of this block.
    pub id: BlockHash,

    /// Height of this block, genesis at 0.
    pub height: u64,

    /// Identity of the preceding block; `None` only for genesis.
    pub parent_id: Option<BlockHash>,

    /// Header timestamp, in seconds since Unix epoch.
    pub timestamp: u64,

    /// Number of transactions, coinbase included.
    pub tx_count: u64,

    /// Serialized size in bytes.
    pub size_bytes: u64,

    /// Block weight in weight units.
    pub weight: u64,
}

impl Block {
    /// Returns `true` if `self` directly extends `parent`: its parent link
    /// names `parent` and it sits exactly one height above it.
    pub fn extends(&self, parent: &Block) -> bool {
        self.parent_id == Some(parent.id) && self.height == parent.height + 1
    }

    /// Returns `true` if this block has no parent.
    pub fn is_genesis(&self) -> bool {
        self.parent_id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(height: u64, tag: &[u8], parent: Option<BlockHash>) -> Block {
        Block {
            id: BlockHash::digest(tag),
            height,
            parent_id: parent,
            timestamp: 1_700_000_000 + height,
            tx_count: 1,
            size_bytes: 250,
            weight: 1000,
        }
    }

    #[test]
    fn extends_checks_link_and_height() {
        let parent = block(10, b"p", None);
        let child = block(11, b"c", Some(parent.id));
        assert!(child.extends(&parent));

        let wrong_height = block(12, b"c2", Some(parent.id));
        assert!(!wrong_height.extends(&parent));

        let wrong_link = block(11, b"c3", Some(BlockHash::digest(b"other")));
        assert!(!wrong_link.extends(&parent));
    }

    #[test]
    fn genesis_has_no_parent() {
        assert!(block(0, b"g", None).is_genesis());
        assert!(!block(1, b"x", Some(BlockHash::digest(b"g"))).is_genesis());
    }
}
