//! Provider traits abstracting all I/O away from the derivation core.

use crate::types::{Blob, BlockInfo, IndexedBlobHash, L1Block};
use alloy_primitives::{Address, Bytes};
use async_trait::async_trait;
use core::fmt::Display;

/// Describes the functionality of the L1 chain provider.
#[async_trait]
pub trait ChainProvider {
    /// The error type for [ChainProvider] implementations.
    type Error: Display + Send + Sync;

    /// Returns the latest L1 block number.
    async fn latest_block_number(&mut self) -> Result<u64, Self::Error>;

    /// Fetches a block with its transactions and receipts by number.
    /// Returns `None` when the block does not exist yet.
    async fn block_with_receipts(&mut self, number: u64) -> Result<Option<L1Block>, Self::Error>;

    /// Returns the transaction count (nonce) of an account.
    async fn transaction_count(&mut self, address: Address) -> Result<u64, Self::Error>;

    /// Executes a read-only call against the latest state.
    async fn call(&mut self, to: Address, input: Bytes) -> Result<Bytes, Self::Error>;

    /// Drops any cached state at or above the given block number. Called
    /// when a reorg invalidates previously fetched blocks.
    fn invalidate_from(&mut self, _number: u64) {}
}

/// Describes the functionality of the blob provider backing blob-carried
/// batches.
#[async_trait]
pub trait BlobProvider {
    /// The error type for [BlobProvider] implementations.
    type Error: Display + Send + Sync;

    /// Fetches the blobs referenced by the given versioned hashes, confirmed
    /// in the given L1 block. The result is aligned with `hashes`; a missing
    /// blob yields `None` rather than an error.
    async fn get_blobs(
        &mut self,
        block: &BlockInfo,
        hashes: &[IndexedBlobHash],
    ) -> Result<Vec<Option<Box<Blob>>>, Self::Error>;
}
