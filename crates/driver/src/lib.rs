//! # facet-driver
//!
//! The online half of the Facet derivation node: the execution-engine
//! client, the block proposer, the persistence layer, and the top-level
//! derivation loop that ties them to the pure core in `facet-derive`.

mod errors;
pub use errors::DriverError;

pub mod engine;
pub use engine::{
    Engine, EngineApiClient, EngineError, ExecutionPayload, ForkchoiceState, ForkchoiceUpdated,
    PayloadAttributes, PayloadStatus, PayloadStatusKind,
};

pub mod proposer;
pub use proposer::{Proposer, ProposerConfig};

pub mod store;
pub use store::{BlockStore, L2BlockRecord, MemoryBlockStore, RocksBlockStore, StoreError};

mod cursor;
pub use cursor::SyncCursor;

pub mod pipeline;
pub use pipeline::{DerivationPipeline, PipelineConfig};
