//! EIP-4844 blob types.

use crate::params::BYTES_PER_BLOB;
use alloy_primitives::{FixedBytes, B256};

/// A raw EIP-4844 blob: 4096 32-byte field elements.
pub type Blob = FixedBytes<BYTES_PER_BLOB>;

/// A blob's versioned hash together with its index in the carrier
/// transaction's hash list.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IndexedBlobHash {
    /// The index of the blob.
    pub index: u64,
    /// The versioned hash of the blob.
    pub hash: B256,
}
