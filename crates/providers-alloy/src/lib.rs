//! # facet-providers-alloy
//!
//! Online providers backing the Facet derivation pipeline: an alloy-based L1
//! JSON-RPC provider, a beacon-API client, a blob provider with versioned
//! hash checks, and a bounded look-ahead prefetcher.

mod backoff;
pub use backoff::{retry_with_backoff, BackoffConfig};

mod chain_provider;
pub use chain_provider::{AlloyChainProvider, AlloyChainProviderError};

mod beacon_client;
pub use beacon_client::{
    APIConfigResponse, APIGenesisResponse, BeaconClient, BlobSidecar, OnlineBeaconClient,
    ReducedConfigData, ReducedGenesisData,
};

mod blob_provider;
pub use blob_provider::{BlobProviderError, OnlineBlobProvider};

mod prefetch;
pub use prefetch::{FetchOutcome, PrefetchError, Prefetcher, PrefetcherConfig};
