//! Mock providers for testing the derivation core without I/O.

use crate::{
    traits::{BlobProvider, ChainProvider},
    types::{Blob, BlockInfo, IndexedBlobHash, L1Block},
};
use alloy_primitives::{Address, Bytes, B256};
use async_trait::async_trait;
use std::collections::HashMap;

/// A [BlobProvider] serving blobs from an in-memory map.
#[derive(Debug, Default, Clone)]
pub struct TestBlobProvider {
    /// The blobs, keyed by versioned hash.
    pub blobs: HashMap<B256, Blob>,
    /// When set, every call fails with this message.
    pub error: Option<String>,
}

impl TestBlobProvider {
    /// Inserts a blob under its versioned hash.
    pub fn insert(&mut self, hash: B256, blob: Blob) {
        self.blobs.insert(hash, blob);
    }
}

#[async_trait]
impl BlobProvider for TestBlobProvider {
    type Error = String;

    async fn get_blobs(
        &mut self,
        _block: &BlockInfo,
        hashes: &[IndexedBlobHash],
    ) -> Result<Vec<Option<Box<Blob>>>, Self::Error> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(hashes
            .iter()
            .map(|indexed| self.blobs.get(&indexed.hash).map(|blob| Box::new(*blob)))
            .collect())
    }
}

/// A [ChainProvider] serving canned blocks from memory.
#[derive(Debug, Default, Clone)]
pub struct TestChainProvider {
    /// Blocks keyed by number.
    pub blocks: HashMap<u64, L1Block>,
    /// The tip number reported by [ChainProvider::latest_block_number].
    pub tip: u64,
    /// Account nonces for [ChainProvider::transaction_count].
    pub nonces: HashMap<Address, u64>,
    /// Canned `eth_call` results keyed by target address.
    pub call_results: HashMap<Address, Bytes>,
    /// When set, every call fails with this message.
    pub error: Option<String>,
}

impl TestChainProvider {
    /// Inserts a block and advances the tip to cover it.
    pub fn insert_block(&mut self, block: L1Block) {
        self.tip = self.tip.max(block.header.number);
        self.blocks.insert(block.header.number, block);
    }
}

#[async_trait]
impl ChainProvider for TestChainProvider {
    type Error = String;

    async fn latest_block_number(&mut self) -> Result<u64, Self::Error> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self.tip)
    }

    async fn block_with_receipts(&mut self, number: u64) -> Result<Option<L1Block>, Self::Error> {
        if let Some(error) = &self.error {
            return Err(error.clone());
        }
        Ok(self.blocks.get(&number).cloned())
    }

    async fn transaction_count(&mut self, address: Address) -> Result<u64, Self::Error> {
        Ok(self.nonces.get(&address).copied().unwrap_or_default())
    }

    async fn call(&mut self, to: Address, _input: Bytes) -> Result<Bytes, Self::Error> {
        self.call_results
            .get(&to)
            .cloned()
            .ok_or_else(|| "execution reverted".to_string())
    }
}
