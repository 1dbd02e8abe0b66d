//! In-memory chain source.
//!
//! This implementation is useful for unit tests, simulations, and small
//! offline experiments. It keeps every block ever minted in a `HashMap`
//! keyed by [`BlockHash`] and tracks the canonical branch separately as a
//! height-indexed list, so old branches stay fetchable by id after a
//! reorganisation (just like a real node serving stale blocks).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::source::{ChainSource, SourceError};
use crate::types::{Block, BlockHash, Sats};

const UNLIMITED: usize = usize::MAX;

/// Simulated remote chain implementing [`ChainSource`].
#[derive(Debug)]
pub struct InMemoryChainSource {
    blocks: HashMap<BlockHash, Block>,
    payouts: HashMap<BlockHash, Sats>,
    /// Canonical branch, index = height.
    canonical: Vec<BlockHash>,
    /// Successful calls left before every call reports unavailable.
    budget: AtomicUsize,
    calls: AtomicUsize,
}

impl Default for InMemoryChainSource {
    fn default() -> Self {
        Self {
            blocks: HashMap::new(),
            payouts: HashMap::new(),
            canonical: Vec::new(),
            budget: AtomicUsize::new(UNLIMITED),
            calls: AtomicUsize::new(0),
        }
    }
}

impl InMemoryChainSource {
    /// Creates an empty chain with no genesis.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a linear chain of `len` blocks, heights `0..len`.
    pub fn linear(len: u64, tag: &str) -> Self {
        let mut source = Self::new();
        for _ in 0..len {
            source.mine(tag);
        }
        source
    }

    /// Height of the canonical tip, if any block exists.
    pub fn tip_height(&self) -> Option<u64> {
        (self.canonical.len() as u64).checked_sub(1)
    }

    /// Returns the canonical block at `height`.
    pub fn canonical_block(&self, height: u64) -> Option<&Block> {
        let id = self.canonical.get(usize::try_from(height).ok()?)?;
        self.blocks.get(id)
    }

    /// Mines a child of the canonical tip (or genesis on an empty chain)
    /// and makes it the new tip.
    pub fn mine(&mut self, tag: &str) -> Block {
        let parent = self.canonical.last().and_then(|id| self.blocks.get(id));
        let block = make_block(parent, tag);
        self.insert_canonical(block.clone());
        block
    }

    /// Replaces the canonical suffix starting at `fork_height` with `len`
    /// freshly minted blocks built on the block at `fork_height - 1`.
    ///
    /// Returns the new branch, oldest first. The replaced blocks remain
    /// fetchable by id.
    pub fn reorg(&mut self, fork_height: u64, len: usize, tag: &str) -> Vec<Block> {
        let keep = usize::try_from(fork_height)
            .unwrap_or(usize::MAX)
            .min(self.canonical.len());
        self.canonical.truncate(keep);

        (0..len).map(|_| self.mine(tag)).collect()
    }

    /// Sets the coinbase payout reported for `id`.
    pub fn set_payout(&mut self, id: BlockHash, payout: Sats) {
        self.payouts.insert(id, payout);
    }

    /// Lets `calls` more calls succeed, after which every call reports
    /// unavailable until [`restore`](Self::restore) is called.
    pub fn fail_after(&self, calls: usize) {
        self.budget.store(calls, Ordering::SeqCst);
    }

    /// Lifts any failure injected with [`fail_after`](Self::fail_after).
    pub fn restore(&self) {
        self.budget.store(UNLIMITED, Ordering::SeqCst);
    }

    /// Total number of calls served or refused so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn insert_canonical(&mut self, block: Block) {
        self.canonical.push(block.id);
        self.blocks.insert(block.id, block);
    }

    fn admit(&self, what: impl FnOnce() -> String) -> Result<(), SourceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| match left {
                UNLIMITED => Some(UNLIMITED),
                0 => None,
                n => Some(n - 1),
            })
            .map(|_| ())
            .map_err(|_| SourceError::unavailable(what()))
    }
}

impl ChainSource for InMemoryChainSource {
    async fn get_tip_id(&self) -> Result<BlockHash, SourceError> {
        self.admit(|| "tip id".to_string())?;
        self.canonical
            .last()
            .copied()
            .ok_or_else(|| SourceError::unavailable("tip id: empty chain"))
    }

    async fn get_block(&self, id: &BlockHash) -> Result<Block, SourceError> {
        self.admit(|| format!("block {id}"))?;
        self.blocks
            .get(id)
            .cloned()
            .ok_or_else(|| SourceError::unavailable(format!("block {id}: unknown")))
    }

    async fn get_block_at_height(&self, height: u64) -> Result<Block, SourceError> {
        self.admit(|| format!("block at height {height}"))?;
        self.canonical_block(height)
            .cloned()
            .ok_or_else(|| SourceError::unavailable(format!("block at height {height}: none")))
    }

    async fn get_coinbase_payout(&self, id: &BlockHash) -> Result<Sats, SourceError> {
        self.admit(|| format!("coinbase of {id}"))?;
        self.payouts
            .get(id)
            .copied()
            .ok_or_else(|| SourceError::unavailable(format!("coinbase of {id}: unknown")))
    }
}

/// Mints a deterministic block on top of `parent`.
///
/// Ids are derived from the branch tag, height and parent id, so two
/// branches with different tags never collide.
fn make_block(parent: Option<&Block>, tag: &str) -> Block {
    let height = parent.map_or(0, |p| p.height + 1);
    let parent_id = parent.map(|p| p.id);

    let mut seed = format!("{tag}:{height}:").into_bytes();
    if let Some(pid) = parent_id {
        seed.extend_from_slice(pid.as_bytes());
    }

    Block {
        id: BlockHash::digest(&seed),
        height,
        parent_id,
        timestamp: 1_231_006_505 + height * 600,
        tx_count: 1 + height % 7,
        size_bytes: 285 + height * 10,
        weight: 1_140 + height * 40,
    }
}
