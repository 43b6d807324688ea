//! The derivation cursor: where the L2 chain stands and what it carries.

use facet_derive::{mint::MintState, types::BlockInfo};

/// Tracks the L2 head, its source L1 block, and the carried issuance state.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SyncCursor {
    /// The current L2 head.
    pub l2_head: BlockInfo,
    /// The L1 block the head was derived from.
    pub l1_number: u64,
    /// The head's position among blocks sharing its source L1 block.
    pub sequence: u64,
    /// The issuance state after the head block.
    pub mint: MintState,
}

impl SyncCursor {
    /// Creates a cursor positioned at the given head.
    pub const fn new(l2_head: BlockInfo, l1_number: u64, sequence: u64, mint: MintState) -> Self {
        Self { l2_head, l1_number, sequence, mint }
    }

    /// Advances the cursor to a newly proposed block.
    pub fn advance(&mut self, l2_head: BlockInfo, l1_number: u64, sequence: u64, mint: MintState) {
        self.l2_head = l2_head;
        self.l1_number = l1_number;
        self.sequence = sequence;
        self.mint = mint;
    }
}
