//! Top-level driver errors.

use crate::store::StoreError;
use facet_derive::errors::CollectError;
use facet_providers_alloy::PrefetchError;
use thiserror::Error;

/// A fatal or retry-exhausted failure of the derivation loop.
///
/// Recoverable conditions (parse rejects, missing blobs, engine-dropped user
/// transactions) never surface here; they are logged and counted instead.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The L1 prefetcher failed.
    #[error(transparent)]
    Prefetch(#[from] PrefetchError),
    /// An L1 or L2 RPC provider failed outside the prefetcher.
    #[error("Provider error: {0}")]
    Provider(String),
    /// The persistence layer failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Payload collection failed.
    #[error(transparent)]
    Collect(#[from] CollectError),
    /// The engine rejected the derived block more times than allowed.
    #[error("Engine rejected block on top of L2 block {parent} after {attempts} attempts")]
    EngineRejectedBlock {
        /// The L2 parent the block was proposed on.
        parent: u64,
        /// The number of attempts made.
        attempts: u32,
    },
    /// A required system transaction did not execute successfully.
    #[error("System transaction failed in L2 block {l2_block}")]
    SystemTxFailed {
        /// The L2 block whose system transactions failed.
        l2_block: u64,
    },
    /// The stored chain and the fetched chain cannot be reconciled.
    #[error("Cannot locate reorg divergence point below L1 block {below}")]
    ReorgUnresolved {
        /// The lowest block examined.
        below: u64,
    },
}
