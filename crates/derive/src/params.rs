//! This module contains the parameters and identifying constants for the
//! Facet derivation pipeline.

use alloy_primitives::{address, b256, Address, B256};

/// The magic prefix that marks the start of a wire batch. Shared between the
/// batch submitter and this reader; recognizable at any byte offset.
pub const BATCH_MAGIC: [u8; MAGIC_SIZE] = [
    0x19, 0xfa, 0xce, 0x70, 0x0b, 0xa7, 0xc4, 0x3d, 0x5e, 0x11, 0x6e, 0x2a, 0x90, 0x8c, 0xd4,
    0xf6,
];

/// The length of [BATCH_MAGIC].
pub const MAGIC_SIZE: usize = 16;

/// The size of the wire batch header:
/// `magic ++ chain_id (u64 BE) ++ version (u8) ++ role (u8) ++ length (u32 BE)`.
pub const BATCH_HEADER_SIZE: usize = MAGIC_SIZE + 8 + 1 + 1 + 4;

/// The only supported wire batch version.
pub const BATCH_VERSION: u8 = 1;

/// The wire role byte for a permissionless batch.
pub const ROLE_PERMISSIONLESS: u8 = 0x00;

/// The wire role byte for a priority batch.
pub const ROLE_PRIORITY: u8 = 0x01;

/// The length of a priority batch signature (`r ++ s ++ v`).
pub const SIGNATURE_SIZE: usize = 65;

/// Default cap on the byte length of a single batch payload.
pub const MAX_BATCH_BYTES: u32 = 131_072;

/// Default cap on the number of transactions within one batch.
pub const MAX_TXS_PER_BATCH: usize = 1000;

/// Default cap on the number of batches extracted from one carrier payload.
pub const MAX_BATCHES_PER_PAYLOAD: usize = 10;

/// The EIP-2718 type tag for Facet deposit-style transactions (user singles
/// and the L1-attributes system transaction).
pub const DEPOSIT_TX_TYPE: u8 = 0x7E;

/// The EIP-2718 type tag for migration and predeploy-upgrade system
/// transactions.
pub const UPGRADE_TX_TYPE: u8 = 0x7D;

/// The L2 block interval in seconds.
pub const L2_BLOCK_INTERVAL: u64 = 12;

/// Cap on the number of empty filler blocks inserted for one L1 gap.
pub const MAX_FILLER_BLOCKS: u64 = 100;

/// The number of bytes in an EIP-4844 blob.
pub const BYTES_PER_BLOB: usize = 131_072;

/// The number of 32-byte field elements in a blob.
pub const FIELD_ELEMENTS_PER_BLOB: usize = 4096;

/// The maximum payload a single blob can carry: 31 data bytes per field
/// element, minus one byte for the terminator.
pub const MAX_BLOB_PAYLOAD: usize = FIELD_ELEMENTS_PER_BLOB * 31 - 1;

/// The KZG versioned hash version byte.
pub const VERSIONED_HASH_VERSION_KZG: u8 = 0x01;

/// The address users send Facet single transactions to.
pub const FACET_INBOX_ADDRESS: Address =
    address!("00000000000000000000000000000000000face7");

/// The sole topic of an inbox log that carries a Facet single payload.
pub const FACET_LOG_TOPIC: B256 =
    b256!("00000000000000000000000000000000000000000000000000000000000face7");

/// The sender of all system transactions on L2.
pub const SYSTEM_ADDRESS: Address =
    address!("deaddeaddeaddeaddeaddeaddeaddeaddead0001");

/// The L1-attributes predeploy the system transaction targets.
pub const L1_BLOCK_PREDEPLOY: Address =
    address!("4200000000000000000000000000000000000015");

/// Gas limit granted to each system transaction.
pub const SYSTEM_TX_GAS_LIMIT: u64 = 1_000_000;

/// Domain separator byte for user-deposit source hashes.
pub const SOURCE_DOMAIN_USER: u8 = 0x00;

/// Domain separator byte for L1-attributes source hashes.
pub const SOURCE_DOMAIN_ATTRIBUTES: u8 = 0x01;

/// Domain separator byte for upgrade-transaction source hashes.
pub const SOURCE_DOMAIN_UPGRADE: u8 = 0x02;
