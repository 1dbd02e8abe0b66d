//! Read access to the remote chain.
//!
//! The reconciler only ever observes the chain through [`ChainSource`].
//! Implementations own their transport, retry and pacing policy; once
//! they give up, every failure collapses into a single
//! [`SourceError`] which callers must inspect.
//!
//! Two implementations ship with the crate:
//!
//! - [`esplora::EsploraSource`]: HTTP client for an Esplora REST API,
//! - [`mem::InMemoryChainSource`]: a simulated chain for tests and
//!   offline experiments.

use std::future::Future;

use crate::types::{Block, BlockHash, Sats};

pub mod esplora;
pub mod mem;

pub use esplora::EsploraSource;
pub use mem::InMemoryChainSource;

/// A remote fetch could not be completed.
///
/// The monitor never distinguishes *why* a fetch failed; `what` only
/// names the request for log output.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("chain source unavailable: {what}")]
pub struct SourceError {
    pub what: String,
}

impl SourceError {
    pub fn unavailable(what: impl Into<String>) -> Self {
        Self { what: what.into() }
    }
}

/// Idempotent reads against the remote chain.
///
/// All methods are side-effect free from the caller's point of view and
/// may suspend while the implementation waits on the network or on its
/// own pacing policy.
pub trait ChainSource {
    /// Returns the id of the current remote tip.
    fn get_tip_id(&self) -> impl Future<Output = Result<BlockHash, SourceError>> + Send;

    /// Returns the block with the given id.
    fn get_block(&self, id: &BlockHash)
    -> impl Future<Output = Result<Block, SourceError>> + Send;

    /// Returns the block currently at height `height` on the remote branch.
    fn get_block_at_height(
        &self,
        height: u64,
    ) -> impl Future<Output = Result<Block, SourceError>> + Send;

    /// Returns the total value paid out by the block's coinbase transaction.
    fn get_coinbase_payout(
        &self,
        id: &BlockHash,
    ) -> impl Future<Output = Result<Sats, SourceError>> + Send;

    /// Returns the current remote tip block.
    fn get_tip(&self) -> impl Future<Output = Result<Block, SourceError>> + Send
    where
        Self: Sync,
    {
        async move {
            let id = self.get_tip_id().await?;
            self.get_block(&id).await
        }
    }
}
