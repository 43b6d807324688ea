//! L1 block, transaction, and receipt types consumed by the derivation.

use alloy_primitives::{Address, Bytes, B256};

/// Minimal block identity information, shared between L1 and L2 blocks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct BlockInfo {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block timestamp.
    pub timestamp: u64,
}

impl BlockInfo {
    /// Creates a new [BlockInfo].
    pub const fn new(number: u64, hash: B256, parent_hash: B256, timestamp: u64) -> Self {
        Self { number, hash, parent_hash, timestamp }
    }
}

/// The L1 header fields the derivation needs.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct L1Header {
    /// The block number.
    pub number: u64,
    /// The block hash.
    pub hash: B256,
    /// The parent block hash.
    pub parent_hash: B256,
    /// The block timestamp.
    pub timestamp: u64,
    /// The base fee per gas. Zero on pre-London history.
    pub base_fee_per_gas: u128,
    /// The mix hash, used as `prevRandao` on L2.
    pub mix_hash: B256,
    /// The parent beacon block root, present post-Dencun.
    pub parent_beacon_block_root: Option<B256>,
}

impl L1Header {
    /// Returns the [BlockInfo] for this header.
    pub const fn block_info(&self) -> BlockInfo {
        BlockInfo {
            number: self.number,
            hash: self.hash,
            parent_hash: self.parent_hash,
            timestamp: self.timestamp,
        }
    }
}

/// An L1 transaction in carrier position.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Transaction {
    /// The transaction hash.
    pub hash: B256,
    /// The index of the transaction within its block.
    pub index: u64,
    /// The sender.
    pub from: Address,
    /// The recipient, absent for contract creations.
    pub to: Option<Address>,
    /// The calldata.
    pub input: Bytes,
    /// Versioned hashes of the blobs this transaction carries. Non-empty only
    /// for type-3 transactions.
    pub blob_hashes: Vec<B256>,
}

/// A log emitted by an L1 transaction.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Log {
    /// The emitting contract.
    pub address: Address,
    /// The log topics.
    pub topics: Vec<B256>,
    /// The log data.
    pub data: Bytes,
}

/// The receipt fields the derivation needs.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Receipt {
    /// Whether the transaction succeeded.
    pub status: bool,
    /// The logs emitted by the transaction.
    pub logs: Vec<L1Log>,
}

/// A fully fetched L1 block: header, transactions, and receipts.
///
/// `receipts` is positionally aligned with `transactions`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Block {
    /// The block header.
    pub header: L1Header,
    /// The transactions, in block order.
    pub transactions: Vec<L1Transaction>,
    /// The receipts, one per transaction.
    pub receipts: Vec<L1Receipt>,
}
