//! Chain configuration for the Facet derivation pipeline.

use crate::{
    params::{MAX_BATCHES_PER_PAYLOAD, MAX_BATCH_BYTES, MAX_TXS_PER_BATCH},
    registry::SignerRegistry,
};
use alloy_primitives::{address, Address, U256};

/// The L1 network the derivation anchors to.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    /// Ethereum mainnet.
    #[default]
    Mainnet,
    /// The Sepolia testnet.
    Sepolia,
    /// The Hoodi testnet.
    Hoodi,
}

impl core::str::FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "mainnet" => Ok(Self::Mainnet),
            "sepolia" => Ok(Self::Sepolia),
            "hoodi" => Ok(Self::Hoodi),
            other => Err(format!("unknown L1 network: {other}")),
        }
    }
}

/// Static configuration for one Facet deployment.
///
/// Carried by value through the derivation call sites; there is no global
/// config singleton.
#[derive(Debug, Clone)]
pub struct ChainConfig {
    /// The Facet chain id, embedded in every wire batch header.
    pub chain_id: u64,
    /// The L1 block at which V2 derivation (this pipeline) activates.
    pub fork_block: u64,
    /// The L1 block of the bluebird hardfork. The predeploy upgrade
    /// transactions are injected into the block immediately before it.
    pub bluebird_block: u64,
    /// The migration manager contract queried for `transactionsRequired()`
    /// at the first V2 block.
    pub migration_manager: Address,
    /// The L2 block gas limit handed to the execution engine.
    pub l2_gas_limit: u64,
    /// The share of the L2 gas limit a priority batch may claim, in basis
    /// points.
    pub priority_share_bps: u64,
    /// Cap on the byte length of a single batch payload.
    pub max_batch_bytes: u32,
    /// Cap on the number of transactions within one batch.
    pub max_txs_per_batch: usize,
    /// Cap on the number of batches extracted from one carrier payload.
    pub max_batches_per_payload: usize,
    /// Whether priority batch signatures are recovered and checked against
    /// the registry.
    pub verify_signatures: bool,
    /// The authorized-signer registry for priority batches.
    pub registry: SignerRegistry,
    /// Supply minted before the fork, summed over the stored pre-fork
    /// periods; seeds the issuance bootstrap on a fresh database.
    pub prefork_minted: U256,
    /// The pre-fork mint rate, in asset units per gas unit.
    pub prefork_rate_per_gas: u128,
}

impl ChainConfig {
    /// Returns the standard configuration for the given network.
    pub fn for_network(network: Network) -> Self {
        match network {
            Network::Mainnet => Self {
                chain_id: 0xface7,
                fork_block: 21_300_000,
                bluebird_block: 22_600_000,
                migration_manager: address!("a1b2000000000000000000000000000000000001"),
                prefork_minted: U256::from(180_000_000u64)
                    .saturating_mul(U256::from(10u64).pow(U256::from(18u64))),
                prefork_rate_per_gas: 800_000,
                ..Self::base()
            },
            Network::Sepolia => Self {
                chain_id: 0xface7a,
                fork_block: 7_000_000,
                bluebird_block: 7_800_000,
                migration_manager: address!("a1b2000000000000000000000000000000000002"),
                ..Self::base()
            },
            Network::Hoodi => Self {
                chain_id: 0xface7b,
                fork_block: 100_000,
                bluebird_block: 900_000,
                migration_manager: address!("a1b2000000000000000000000000000000000003"),
                ..Self::base()
            },
        }
    }

    /// Network-independent defaults.
    fn base() -> Self {
        Self {
            chain_id: 0,
            fork_block: 0,
            bluebird_block: 0,
            migration_manager: Address::ZERO,
            l2_gas_limit: 120_000_000,
            priority_share_bps: 5000,
            max_batch_bytes: MAX_BATCH_BYTES,
            max_txs_per_batch: MAX_TXS_PER_BATCH,
            max_batches_per_payload: MAX_BATCHES_PER_PAYLOAD,
            verify_signatures: true,
            registry: SignerRegistry::Disabled,
            prefork_minted: U256::ZERO,
            prefork_rate_per_gas: 800_000,
        }
    }

    /// The maximum gas a priority batch may declare in this configuration.
    pub const fn priority_gas_allowance(&self) -> u64 {
        self.l2_gas_limit * self.priority_share_bps / 10_000
    }
}
