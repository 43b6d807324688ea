//! The authorized-signer registry for priority batches.
//!
//! The registry answers one question: which address may sign the priority
//! batch derived from a given L1 block. The answer is a pure function of the
//! block number so every node agrees.

use alloy_primitives::Address;

/// The authorized-signer registry, in one of its configured modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignerRegistry {
    /// Priority signature checks are disabled.
    Disabled,
    /// A single fixed signer (the `env` and `static` modes).
    Static(Address),
    /// Round-robin over a fixed set, keyed by L1 block number.
    Rotation(Vec<Address>),
    /// Explicit activation ranges: each entry authorizes its address from
    /// its block number until the next entry's.
    Mapping(Vec<(u64, Address)>),
}

impl SignerRegistry {
    /// Builds a mapping registry, sorting entries by activation block.
    pub fn mapping(mut entries: Vec<(u64, Address)>) -> Self {
        entries.sort_by_key(|(block, _)| *block);
        Self::Mapping(entries)
    }

    /// Returns the signer authorized for the given L1 block, if any.
    pub fn authorized_signer(&self, l1_block: u64) -> Option<Address> {
        match self {
            Self::Disabled => None,
            Self::Static(address) => Some(*address),
            Self::Rotation(set) => {
                if set.is_empty() {
                    None
                } else {
                    Some(set[(l1_block % set.len() as u64) as usize])
                }
            }
            Self::Mapping(entries) => entries
                .iter()
                .rev()
                .find(|(from, _)| *from <= l1_block)
                .map(|(_, address)| *address),
        }
    }
}
