//! HTTP-based chain source for Esplora REST APIs.
//!
//! This implementation of [`ChainSource`] talks to an Esplora instance
//! (e.g. `https://blockstream.info/api/`) using the following endpoints:
//!
//! ```text
//! GET blocks/tip/hash        -> "<hex hash>"
//! GET block/<hash>           -> { "id", "height", "previousblockhash",
//!                                 "timestamp", "tx_count", "size", "weight", ... }
//! GET block-height/<height>  -> "<hex hash>"
//! GET block/<hash>/txs/0     -> [ { "vout": [ { "value": <sats> }, ... ] }, ... ]
//! ```
//!
//! Every request waits on a shared pacer so consecutive requests start at
//! least `min_request_interval` apart, and transient failures are retried
//! a bounded number of times before the call reports unavailable.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::config::SourceConfig;
use crate::source::{ChainSource, SourceError};
use crate::types::{Block, BlockHash, Sats};

/// Serialises request start times so they are at least `interval` apart.
#[derive(Debug)]
struct Pacer {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl Pacer {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut last = self.last.lock().await;
        if let Some(prev) = *last {
            tokio::time::sleep_until(prev + self.interval).await;
        }
        *last = Some(Instant::now());
    }
}

/// Esplora-backed [`ChainSource`].
///
/// The client is `Send + Sync`; a single instance is meant to be
/// constructed by the caller and handed to the reconciler.
#[derive(Debug)]
pub struct EsploraSource {
    base_url: String,
    client: Client,
    max_attempts: u32,
    retry_delay: Duration,
    pacer: Pacer,
}

impl EsploraSource {
    /// Constructs a new client from `config`.
    pub fn new(config: &SourceConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| SourceError::unavailable(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: config.base_url.clone(),
            client,
            max_attempts: config.max_attempts.max(1),
            retry_delay: config.retry_delay,
            pacer: Pacer::new(config.min_request_interval),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        // Avoid accidental double slashes.
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Issues a paced GET with bounded retries.
    async fn send(&self, path: &str) -> Result<reqwest::Response, SourceError> {
        let url = self.endpoint(path);

        for attempt in 1..=self.max_attempts {
            self.pacer.wait().await;

            match self.client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return Ok(resp),
                Ok(resp) => {
                    let status = resp.status();
                    if !is_retryable(status) {
                        tracing::warn!(%url, %status, "giving up on non-retryable HTTP status");
                        return Err(SourceError::unavailable(format!("GET {path}: HTTP {status}")));
                    }
                    tracing::debug!(%url, %status, attempt, "retryable HTTP status");
                }
                Err(e) => {
                    tracing::debug!(%url, attempt, error = %e, "request failed");
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.retry_delay).await;
            }
        }

        tracing::warn!(%url, attempts = self.max_attempts, "request attempts exhausted");
        Err(SourceError::unavailable(format!(
            "GET {path}: gave up after {} attempts",
            self.max_attempts
        )))
    }

    async fn get_text(&self, path: &str) -> Result<String, SourceError> {
        let resp = self.send(path).await?;
        let text = resp
            .text()
            .await
            .map_err(|e| SourceError::unavailable(format!("GET {path}: body error: {e}")))?;
        Ok(text.trim().to_string())
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, SourceError> {
        let resp = self.send(path).await?;
        resp.json::<T>()
            .await
            .map_err(|e| SourceError::unavailable(format!("GET {path}: malformed JSON: {e}")))
    }

    async fn get_hash(&self, path: &str) -> Result<BlockHash, SourceError> {
        let text = self.get_text(path).await?;
        text.parse()
            .map_err(|e| SourceError::unavailable(format!("GET {path}: bad block hash: {e}")))
    }
}

/// Statuses worth retrying: the block may simply not be indexed yet, or a
/// gateway in front of the service is overloaded.
fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::NOT_FOUND | StatusCode::TOO_MANY_REQUESTS | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Wire form of `GET block/<hash>`.
#[derive(Debug, Deserialize)]
struct EsploraBlock {
    id: BlockHash,
    height: u64,
    previousblockhash: Option<BlockHash>,
    timestamp: u64,
    tx_count: u64,
    size: u64,
    weight: u64,
}

impl From<EsploraBlock> for Block {
    fn from(b: EsploraBlock) -> Self {
        Block {
            id: b.id,
            height: b.height,
            parent_id: b.previousblockhash,
            timestamp: b.timestamp,
            tx_count: b.tx_count,
            size_bytes: b.size,
            weight: b.weight,
        }
    }
}

/// Wire form of one transaction in `GET block/<hash>/txs/<start>`.
#[derive(Debug, Deserialize)]
struct EsploraTx {
    vout: Vec<EsploraOutput>,
}

#[derive(Debug, Deserialize)]
struct EsploraOutput {
    value: Sats,
}

impl EsploraTx {
    fn total_output(&self) -> Sats {
        self.vout.iter().map(|o| o.value).sum()
    }
}

impl ChainSource for EsploraSource {
    async fn get_tip_id(&self) -> Result<BlockHash, SourceError> {
        self.get_hash("blocks/tip/hash").await
    }

    async fn get_block(&self, id: &BlockHash) -> Result<Block, SourceError> {
        let block: EsploraBlock = self.get_json(&format!("block/{id}")).await?;
        Ok(block.into())
    }

    async fn get_block_at_height(&self, height: u64) -> Result<Block, SourceError> {
        let id = self.get_hash(&format!("block-height/{height}")).await?;
        self.get_block(&id).await
    }

    async fn get_coinbase_payout(&self, id: &BlockHash) -> Result<Sats, SourceError> {
        let txs: Vec<EsploraTx> = self.get_json(&format!("block/{id}/txs/0")).await?;
        txs.first()
            .map(EsploraTx::total_output)
            .ok_or_else(|| SourceError::unavailable(format!("block {id}: empty transaction page")))
    }
}
