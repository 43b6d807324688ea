//! An alloy-backed implementation of the [ChainProvider] trait.

use crate::backoff::{retry_with_backoff, BackoffConfig};
use alloy_primitives::{Address, Bytes, B256, U128, U64};
use alloy_provider::{Provider, ReqwestProvider};
use async_trait::async_trait;
use facet_derive::{
    traits::ChainProvider,
    types::{L1Block, L1Header, L1Log, L1Receipt, L1Transaction},
};
use lru::LruCache;
use std::num::NonZeroUsize;
use thiserror::Error;

const CACHE_SIZE: usize = 32;

/// An error for the [AlloyChainProvider].
#[derive(Debug, Error)]
pub enum AlloyChainProviderError {
    /// The transport or RPC layer failed.
    #[error("RPC error: {0}")]
    Rpc(String),
    /// The response did not have the expected shape.
    #[error("Malformed RPC response: {0}")]
    Malformed(String),
}

/// A concrete [ChainProvider] over Ethereum JSON-RPC using an alloy provider
/// as the backend.
///
/// Fetched blocks are cached by number; the pipeline invalidates the cache
/// from the divergence point when it detects a reorg.
#[derive(Debug, Clone)]
pub struct AlloyChainProvider {
    /// The inner Ethereum JSON-RPC provider.
    inner: ReqwestProvider,
    /// The retry policy for RPC calls.
    backoff: BackoffConfig,
    /// Block-by-number cache.
    block_cache: LruCache<u64, L1Block>,
}

impl AlloyChainProvider {
    /// Creates a new [AlloyChainProvider] with the given alloy provider.
    pub fn new(inner: ReqwestProvider) -> Self {
        Self {
            inner,
            backoff: BackoffConfig::default(),
            block_cache: LruCache::new(NonZeroUsize::new(CACHE_SIZE).unwrap()),
        }
    }

    /// Creates a new [AlloyChainProvider] from the provided [reqwest::Url].
    pub fn new_http(url: reqwest::Url) -> Self {
        Self::new(ReqwestProvider::new_http(url))
    }

    /// Returns the chain id of the connected network.
    pub async fn chain_id(&mut self) -> Result<u64, AlloyChainProviderError> {
        let inner = self.inner.clone();
        retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            async move { inner.get_chain_id().await.map_err(|e| AlloyChainProviderError::Rpc(e.to_string())) }
        })
        .await
    }

    async fn fetch_block(&self, number: u64) -> Result<Option<RpcBlock>, AlloyChainProviderError> {
        let inner = self.inner.clone();
        retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            async move {
                inner
                    .raw_request::<_, Option<RpcBlock>>(
                        "eth_getBlockByNumber".into(),
                        (U64::from(number), true),
                    )
                    .await
                    .map_err(|e| AlloyChainProviderError::Rpc(e.to_string()))
            }
        })
        .await
    }

    async fn fetch_receipts(
        &self,
        number: u64,
    ) -> Result<Option<Vec<RpcReceipt>>, AlloyChainProviderError> {
        let inner = self.inner.clone();
        retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            async move {
                inner
                    .raw_request::<_, Option<Vec<RpcReceipt>>>(
                        "eth_getBlockReceipts".into(),
                        (U64::from(number),),
                    )
                    .await
                    .map_err(|e| AlloyChainProviderError::Rpc(e.to_string()))
            }
        })
        .await
    }
}

#[async_trait]
impl ChainProvider for AlloyChainProvider {
    type Error = AlloyChainProviderError;

    async fn latest_block_number(&mut self) -> Result<u64, Self::Error> {
        let inner = self.inner.clone();
        retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            async move {
                inner.get_block_number().await.map_err(|e| AlloyChainProviderError::Rpc(e.to_string()))
            }
        })
        .await
    }

    async fn block_with_receipts(&mut self, number: u64) -> Result<Option<L1Block>, Self::Error> {
        if let Some(block) = self.block_cache.get(&number) {
            return Ok(Some(block.clone()));
        }

        let Some(raw_block) = self.fetch_block(number).await? else {
            return Ok(None);
        };
        let raw_receipts = match self.fetch_receipts(number).await? {
            Some(receipts) => receipts,
            None if raw_block.transactions.is_empty() => Vec::new(),
            None => {
                return Err(AlloyChainProviderError::Malformed(format!(
                    "receipts unavailable for block {number}"
                )))
            }
        };
        if raw_receipts.len() != raw_block.transactions.len() {
            return Err(AlloyChainProviderError::Malformed(format!(
                "{} receipts for {} transactions in block {number}",
                raw_receipts.len(),
                raw_block.transactions.len()
            )));
        }

        let block = convert_block(raw_block, raw_receipts);
        self.block_cache.put(number, block.clone());
        Ok(Some(block))
    }

    async fn transaction_count(&mut self, address: Address) -> Result<u64, Self::Error> {
        let inner = self.inner.clone();
        let count: U64 = retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            async move {
                inner
                    .raw_request("eth_getTransactionCount".into(), (address, "latest"))
                    .await
                    .map_err(|e| AlloyChainProviderError::Rpc(e.to_string()))
            }
        })
        .await?;
        Ok(count.to::<u64>())
    }

    async fn call(&mut self, to: Address, input: Bytes) -> Result<Bytes, Self::Error> {
        let inner = self.inner.clone();
        retry_with_backoff(self.backoff, || {
            let inner = inner.clone();
            let request = CallRequest { to, input: input.clone() };
            async move {
                inner
                    .raw_request("eth_call".into(), (request, "latest"))
                    .await
                    .map_err(|e| AlloyChainProviderError::Rpc(e.to_string()))
            }
        })
        .await
    }

    fn invalidate_from(&mut self, number: u64) {
        let stale = self
            .block_cache
            .iter()
            .map(|(key, _)| *key)
            .filter(|key| *key >= number)
            .collect::<Vec<_>>();
        for key in stale {
            self.block_cache.pop(&key);
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
struct CallRequest {
    to: Address,
    input: Bytes,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcBlock {
    number: U64,
    hash: B256,
    parent_hash: B256,
    timestamp: U64,
    #[serde(default)]
    base_fee_per_gas: Option<U128>,
    #[serde(default)]
    mix_hash: Option<B256>,
    #[serde(default)]
    parent_beacon_block_root: Option<B256>,
    transactions: Vec<RpcTransaction>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    hash: B256,
    #[serde(default)]
    transaction_index: Option<U64>,
    from: Address,
    #[serde(default)]
    to: Option<Address>,
    input: Bytes,
    #[serde(default)]
    blob_versioned_hashes: Option<Vec<B256>>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    #[serde(default)]
    status: Option<U64>,
    #[serde(default)]
    logs: Vec<RpcLog>,
}

#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcLog {
    address: Address,
    #[serde(default)]
    topics: Vec<B256>,
    data: Bytes,
}

fn convert_block(block: RpcBlock, receipts: Vec<RpcReceipt>) -> L1Block {
    let header = L1Header {
        number: block.number.to::<u64>(),
        hash: block.hash,
        parent_hash: block.parent_hash,
        timestamp: block.timestamp.to::<u64>(),
        base_fee_per_gas: block
            .base_fee_per_gas
            .map(|fee| fee.to::<u128>())
            .unwrap_or_default(),
        mix_hash: block.mix_hash.unwrap_or_default(),
        parent_beacon_block_root: block.parent_beacon_block_root,
    };

    let transactions = block
        .transactions
        .into_iter()
        .enumerate()
        .map(|(position, tx)| L1Transaction {
            hash: tx.hash,
            index: tx
                .transaction_index
                .map(|index| index.to::<u64>())
                .unwrap_or(position as u64),
            from: tx.from,
            to: tx.to,
            input: tx.input,
            blob_hashes: tx.blob_versioned_hashes.unwrap_or_default(),
        })
        .collect();

    let receipts = receipts
        .into_iter()
        .map(|receipt| L1Receipt {
            status: receipt.status.map(|status| status == U64::from(1)).unwrap_or(false),
            logs: receipt
                .logs
                .into_iter()
                .map(|log| L1Log { address: log.address, topics: log.topics, data: log.data })
                .collect(),
        })
        .collect();

    L1Block { header, transactions, receipts }
}
