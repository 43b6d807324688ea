//! Core types shared across the derivation pipeline.

mod block;
pub use block::{BlockInfo, L1Block, L1Header, L1Log, L1Receipt, L1Transaction};

mod blob;
pub use blob::{Blob, IndexedBlobHash};

mod single;
pub use single::{FacetSingle, SinglePayload, SingleSource};

mod deposit;
pub use deposit::FacetDeposit;

mod derived;
pub use derived::{l1_data_gas, DerivedTx};
