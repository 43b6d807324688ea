//! Drives the execution engine through the block-building handshake.
//!
//! For each derived block the proposer sends a fork-choice update carrying
//! payload attributes, retrieves the built payload, checks it against the
//! submitted transactions, submits it back, and finalizes the fork choice.
//! The engine is authoritative over execution validity: a dropped user
//! transaction is a warning, a dropped system transaction is not.

use crate::{
    engine::{
        Engine, EngineError, ExecutionPayload, ForkchoiceState, PayloadAttributes,
        PayloadStatusKind,
    },
    errors::DriverError,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256, U64};
use facet_derive::{
    params::{
        SOURCE_DOMAIN_UPGRADE, SYSTEM_ADDRESS, SYSTEM_TX_GAS_LIMIT, UPGRADE_TX_TYPE,
        L1_BLOCK_PREDEPLOY, L2_BLOCK_INTERVAL, MAX_FILLER_BLOCKS,
    },
    types::{BlockInfo, FacetDeposit},
};
use std::collections::HashSet;
use tracing::{info, warn};

/// The selector of the migration manager's `transactionsRequired()` view.
pub const TRANSACTIONS_REQUIRED_SELECTOR: [u8; 4] = [0x8d, 0x2f, 0x68, 0xc2];

/// The selector of the migration manager's `processBatch()` call.
pub const PROCESS_BATCH_SELECTOR: [u8; 4] = [0x74, 0x1d, 0x9a, 0x4e];

/// The selector of the proxy's `upgradeTo(address)`.
pub const UPGRADE_TO_SELECTOR: [u8; 4] = [0x36, 0x59, 0xcf, 0xe6];

/// The deployment bytecode of the L1-block predeploy implementation, pinned
/// at the bluebird fork.
pub const L1_BLOCK_IMPL_BYTECODE: &[u8] = &[
    0x60, 0x80, 0x60, 0x40, 0x52, 0x34, 0x80, 0x15, 0x61, 0x00, 0x10, 0x57, 0x60, 0x00, 0x80,
    0xfd, 0x5b, 0x50, 0x61, 0x01, 0x20, 0x80, 0x61, 0x00, 0x30, 0x60, 0x00, 0x39, 0x60, 0x00,
    0xf3, 0xfe,
];

/// Gas granted to each migration transaction.
pub const MIGRATION_TX_GAS_LIMIT: u64 = 10_000_000;

/// Configuration for the [Proposer].
#[derive(Debug, Clone, Copy)]
pub struct ProposerConfig {
    /// Attempts against the engine before the block is declared rejected.
    pub engine_retries: u32,
    /// The fee recipient for built payloads.
    pub fee_recipient: Address,
}

impl Default for ProposerConfig {
    fn default() -> Self {
        Self { engine_retries: 3, fee_recipient: Address::ZERO }
    }
}

/// A successfully canonicalized block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposedBlock {
    /// The new head.
    pub info: BlockInfo,
    /// The full payload the engine built.
    pub payload: ExecutionPayload,
    /// How many submitted user transactions the engine dropped.
    pub dropped_user_txs: usize,
}

/// Drives an [Engine] through the block-building protocol.
#[derive(Debug)]
pub struct Proposer<E: Engine> {
    engine: E,
    cfg: ProposerConfig,
}

impl<E: Engine + Send> Proposer<E> {
    /// Creates a proposer over the given engine.
    pub const fn new(engine: E, cfg: ProposerConfig) -> Self {
        Self { engine, cfg }
    }

    /// Proposes one block on top of `head` and returns the new head.
    #[allow(clippy::too_many_arguments)]
    pub async fn propose(
        &mut self,
        head: &BlockInfo,
        timestamp: u64,
        prev_randao: B256,
        parent_beacon_block_root: Option<B256>,
        gas_limit: u64,
        system_txs: &[Bytes],
        user_txs: &[Bytes],
    ) -> Result<ProposedBlock, DriverError> {
        let v3 = parent_beacon_block_root.is_some();
        let mut transactions = Vec::with_capacity(system_txs.len() + user_txs.len());
        transactions.extend_from_slice(system_txs);
        transactions.extend_from_slice(user_txs);

        let attributes = PayloadAttributes {
            timestamp: U64::from(timestamp),
            prev_randao,
            suggested_fee_recipient: self.cfg.fee_recipient,
            withdrawals: Some(vec![]),
            parent_beacon_block_root,
            transactions,
            no_tx_pool: true,
            gas_limit: U64::from(gas_limit),
        };

        let mut attempts = 0;
        loop {
            attempts += 1;
            match self
                .try_propose(head, attributes.clone(), parent_beacon_block_root, v3, system_txs)
                .await
            {
                Ok(block) => return Ok(block),
                Err(err) if attempts < self.cfg.engine_retries => {
                    warn!(target: "proposer", attempt = attempts, %err, "engine attempt failed; retrying");
                }
                Err(err) => {
                    warn!(target: "proposer", attempt = attempts, %err, "engine attempts exhausted");
                    return Err(DriverError::EngineRejectedBlock { parent: head.number, attempts });
                }
            }
        }
    }

    async fn try_propose(
        &mut self,
        head: &BlockInfo,
        attributes: PayloadAttributes,
        parent_beacon_block_root: Option<B256>,
        v3: bool,
        system_txs: &[Bytes],
    ) -> Result<ProposedBlock, EngineError> {
        let submitted = attributes.transactions.clone();
        let fork_choice = ForkchoiceState::canonical(head.hash);

        let updated =
            self.engine.forkchoice_updated(fork_choice, Some(attributes), v3).await?;
        if updated.payload_status.status != PayloadStatusKind::Valid {
            return Err(EngineError::InvalidPayload(format!(
                "fork-choice status {:?}",
                updated.payload_status.status
            )));
        }
        let payload_id = updated.payload_id.ok_or(EngineError::MissingPayloadId)?;

        let payload = self.engine.get_payload(&payload_id, v3).await?;

        // The engine must keep every system transaction, verbatim and first.
        if payload.transactions.len() < system_txs.len()
            || payload.transactions[..system_txs.len()] != *system_txs
        {
            return Err(EngineError::InvalidPayload(
                "engine dropped or reordered a system transaction".to_string(),
            ));
        }

        // Dropped user transactions are the engine's prerogative.
        let returned = payload.transactions[system_txs.len()..]
            .iter()
            .map(|tx| keccak256(tx))
            .collect::<HashSet<_>>();
        let dropped_user_txs = submitted[system_txs.len()..]
            .iter()
            .filter(|tx| !returned.contains(&keccak256(tx)))
            .inspect(|tx| {
                warn!(target: "proposer", hash = %keccak256(tx), "engine dropped user transaction");
            })
            .count();

        let status =
            self.engine.new_payload(payload.clone(), parent_beacon_block_root, v3).await?;
        if status.status != PayloadStatusKind::Valid
            || status.latest_valid_hash != Some(payload.block_hash)
        {
            return Err(EngineError::InvalidPayload(format!(
                "newPayload status {:?}, latest valid {:?}",
                status.status, status.latest_valid_hash
            )));
        }

        let finalized = self
            .engine
            .forkchoice_updated(ForkchoiceState::canonical(payload.block_hash), None, v3)
            .await?;
        if finalized.payload_status.status != PayloadStatusKind::Valid
            || finalized.payload_status.latest_valid_hash != Some(payload.block_hash)
        {
            return Err(EngineError::InvalidPayload(format!(
                "final fork-choice status {:?}",
                finalized.payload_status.status
            )));
        }

        let info = BlockInfo {
            number: payload.block_number.to::<u64>(),
            hash: payload.block_hash,
            parent_hash: payload.parent_hash,
            timestamp: payload.timestamp.to::<u64>(),
        };
        info!(target: "proposer", number = info.number, hash = %info.hash, "block canonicalized");
        Ok(ProposedBlock { info, payload, dropped_user_txs })
    }
}

/// How many empty filler blocks a time gap requires, capped to bound
/// pathological L1 gaps.
pub fn filler_block_count(head_timestamp: u64, l1_timestamp: u64) -> u64 {
    let delta = l1_timestamp.saturating_sub(head_timestamp);
    if delta <= L2_BLOCK_INTERVAL {
        return 0;
    }
    let exact = delta % L2_BLOCK_INTERVAL == 0;
    (delta / L2_BLOCK_INTERVAL - u64::from(exact)).min(MAX_FILLER_BLOCKS)
}

/// The next block timestamp on top of `parent_timestamp`.
pub fn next_timestamp(parent_timestamp: u64, l1_timestamp: u64) -> u64 {
    l1_timestamp.max(parent_timestamp + L2_BLOCK_INTERVAL)
}

/// The calldata for the migration manager's `transactionsRequired()` view.
pub fn transactions_required_call() -> Bytes {
    Bytes::from(TRANSACTIONS_REQUIRED_SELECTOR.to_vec())
}

/// Builds the `n` migration system transactions injected at the first
/// post-fork block.
pub fn migration_transactions(manager: Address, l1_hash: B256, count: u64) -> Vec<FacetDeposit> {
    (0..count)
        .map(|index| FacetDeposit {
            tx_type: UPGRADE_TX_TYPE,
            source_hash: upgrade_source_hash(l1_hash, index),
            from: SYSTEM_ADDRESS,
            to: Some(manager),
            mint: U256::ZERO,
            value: U256::ZERO,
            gas_limit: MIGRATION_TX_GAS_LIMIT,
            is_system_tx: true,
            input: Bytes::from(PROCESS_BATCH_SELECTOR.to_vec()),
        })
        .collect()
}

/// Builds the predeploy upgrade pair injected immediately before the
/// bluebird fork: deploy the new implementation, then point the proxy at
/// the address its deployment nonce determines.
pub fn bluebird_upgrade_transactions(system_nonce: u64, l1_hash: B256) -> Vec<FacetDeposit> {
    let implementation = create_address(SYSTEM_ADDRESS, system_nonce);

    let deploy = FacetDeposit {
        tx_type: UPGRADE_TX_TYPE,
        source_hash: upgrade_source_hash(l1_hash, u64::MAX),
        from: SYSTEM_ADDRESS,
        to: None,
        mint: U256::ZERO,
        value: U256::ZERO,
        gas_limit: MIGRATION_TX_GAS_LIMIT,
        is_system_tx: true,
        input: Bytes::from(L1_BLOCK_IMPL_BYTECODE.to_vec()),
    };

    let mut upgrade_input = UPGRADE_TO_SELECTOR.to_vec();
    upgrade_input.extend_from_slice(&[0u8; 12]);
    upgrade_input.extend_from_slice(implementation.as_slice());
    let upgrade = FacetDeposit {
        tx_type: UPGRADE_TX_TYPE,
        source_hash: upgrade_source_hash(l1_hash, u64::MAX - 1),
        from: SYSTEM_ADDRESS,
        to: Some(L1_BLOCK_PREDEPLOY),
        mint: U256::ZERO,
        value: U256::ZERO,
        gas_limit: SYSTEM_TX_GAS_LIMIT,
        is_system_tx: true,
        input: Bytes::from(upgrade_input),
    };

    vec![deploy, upgrade]
}

/// The CREATE address for a sender and nonce:
/// `keccak256(rlp([sender, nonce]))[12..]`.
pub fn create_address(sender: Address, nonce: u64) -> Address {
    use alloy_rlp::Encodable;
    let mut fields = Vec::new();
    sender.encode(&mut fields);
    nonce.encode(&mut fields);
    let mut out = Vec::with_capacity(fields.len() + 2);
    alloy_rlp::Header { list: true, payload_length: fields.len() }.encode(&mut out);
    out.extend_from_slice(&fields);
    Address::from_slice(&keccak256(&out)[12..])
}

fn upgrade_source_hash(l1_hash: B256, index: u64) -> B256 {
    let mut preimage = [0u8; 1 + 32 + 8];
    preimage[0] = SOURCE_DOMAIN_UPGRADE;
    preimage[1..33].copy_from_slice(l1_hash.as_slice());
    preimage[33..].copy_from_slice(&index.to_be_bytes());
    keccak256(preimage)
}
