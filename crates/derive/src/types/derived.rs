//! A derived L2 transaction awaiting mint assignment and encoding.

use crate::types::FacetDeposit;
use alloy_primitives::{keccak256, Bytes, B256, U256};

/// One transaction in a derived L2 block, tagged by origin.
///
/// Batch-sourced transactions are already fully signed EIP-2718 envelopes;
/// single-sourced transactions are deposit envelopes whose `mint` field is
/// assigned by the issuance controller before encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DerivedTx {
    /// A signed transaction unwrapped from a batch.
    Batched {
        /// The raw EIP-2718 bytes.
        raw: Bytes,
        /// The declared gas limit, parsed from the envelope.
        gas_limit: u64,
        /// The L1 data gas the raw bytes consumed.
        data_gas: u64,
        /// The mint credited for this transaction's burn.
        mint: U256,
    },
    /// A deposit synthesized from a Facet single.
    Single {
        /// The deposit envelope; `mint` is written by the controller.
        deposit: FacetDeposit,
        /// The L1 data gas the single's payload consumed.
        data_gas: u64,
    },
}

impl DerivedTx {
    /// The L1 data gas attributed to this transaction.
    pub const fn data_gas(&self) -> u64 {
        match self {
            Self::Batched { data_gas, .. } | Self::Single { data_gas, .. } => *data_gas,
        }
    }

    /// Credits minted value to this transaction.
    pub fn add_mint(&mut self, amount: U256) {
        match self {
            Self::Batched { mint, .. } => *mint += amount,
            Self::Single { deposit, .. } => deposit.mint += amount,
        }
    }

    /// The mint credited so far.
    pub const fn mint(&self) -> U256 {
        match self {
            Self::Batched { mint, .. } => *mint,
            Self::Single { deposit, .. } => deposit.mint,
        }
    }

    /// Encodes the transaction into its EIP-2718 byte form.
    pub fn encode(&self) -> Bytes {
        match self {
            Self::Batched { raw, .. } => raw.clone(),
            Self::Single { deposit, .. } => deposit.encode(),
        }
    }

    /// The transaction hash of the encoded form.
    pub fn tx_hash(&self) -> B256 {
        keccak256(self.encode())
    }
}

/// Computes the L1 data gas of a byte string: 4 per zero byte, 16 per
/// nonzero byte.
pub fn l1_data_gas(bytes: &[u8]) -> u64 {
    bytes.iter().map(|b| if *b == 0 { 4u64 } else { 16u64 }).sum()
}
