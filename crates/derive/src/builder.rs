//! Ordering and synthesis of the L2 transaction list for one derived block.
//!
//! At most one priority batch leads the block, subject to its gas share.
//! Everything else — permissionless batches and V1 singles — follows in
//! carrier order.

use crate::{
    batch::{BatchRole, ParsedBatch},
    config::ChainConfig,
    errors::DepositDecodingError,
    params::{DEPOSIT_TX_TYPE, SOURCE_DOMAIN_USER},
    tx::declared_gas_limit,
    types::{l1_data_gas, DerivedTx, FacetDeposit, FacetSingle, SinglePayload},
};
use alloy_primitives::{keccak256, B256, U256};
use tracing::{debug, warn};

/// Counters describing one build pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BuildStats {
    /// Whether a priority batch was selected.
    pub priority_selected: bool,
    /// Whether the selected priority batch was discarded for exceeding its
    /// gas share.
    pub priority_discarded_for_gas: bool,
    /// Batch-sourced transactions dropped for a zero or unparseable gas
    /// limit.
    pub zero_gas_dropped: usize,
    /// Singles dropped for undecodable or wrong-chain payloads.
    pub invalid_singles: usize,
}

/// The ordered transaction list for one L2 block, before mint assignment.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BuiltPayload {
    /// The transactions in final order.
    pub transactions: Vec<DerivedTx>,
    /// Build counters.
    pub stats: BuildStats,
}

enum Entry<'a> {
    Batch(&'a ParsedBatch),
    Single(&'a FacetSingle),
}

/// Builds the ordered transaction list for the L2 block derived from one L1
/// block.
pub fn build_block(
    cfg: &ChainConfig,
    l1_block_number: u64,
    batches: &[ParsedBatch],
    singles: &[FacetSingle],
) -> BuiltPayload {
    let mut payload = BuiltPayload::default();

    // Priority selection: the authorized batch with the smallest carrier
    // index, if its declared gas fits the priority share.
    let authorized = cfg.registry.authorized_signer(l1_block_number);
    let selected = batches
        .iter()
        .filter(|batch| batch.role == BatchRole::Priority)
        .filter(|batch| {
            !cfg.verify_signatures || (authorized.is_some() && batch.signer == authorized)
        })
        .min_by_key(|batch| batch.l1_tx_index);

    if let Some(batch) = selected {
        let declared = batch
            .transactions
            .iter()
            .fold(0u64, |total, tx| total.saturating_add(declared_gas_limit(tx)));
        let allowance = cfg.priority_gas_allowance();
        if declared > allowance {
            warn!(
                target: "builder",
                declared,
                allowance,
                content_hash = %batch.content_hash,
                "discarding priority batch over gas share"
            );
            payload.stats.priority_discarded_for_gas = true;
        } else {
            payload.stats.priority_selected = true;
            push_batch_txs(&mut payload, batch);
        }
    }

    // Permissionless sources: non-priority batches and singles, merged by
    // carrier index. Rejected priority batches are not readmitted.
    let mut entries: Vec<(u64, u8, Entry<'_>)> = Vec::new();
    for batch in batches.iter().filter(|batch| batch.role == BatchRole::Permissionless) {
        entries.push((batch.l1_tx_index, 0, Entry::Batch(batch)));
    }
    for single in singles {
        entries.push((single.l1_tx_index, 1, Entry::Single(single)));
    }
    entries.sort_by_key(|(index, rank, _)| (*index, *rank));

    for (_, _, entry) in entries {
        match entry {
            Entry::Batch(batch) => push_batch_txs(&mut payload, batch),
            Entry::Single(single) => match synthesize_single(cfg, single) {
                Some(tx) => payload.transactions.push(tx),
                None => payload.stats.invalid_singles += 1,
            },
        }
    }

    payload
}

/// Unwraps a batch's transactions, dropping any with a zero declared gas
/// limit.
fn push_batch_txs(payload: &mut BuiltPayload, batch: &ParsedBatch) {
    for raw in &batch.transactions {
        let gas_limit = declared_gas_limit(raw);
        if gas_limit == 0 {
            debug!(target: "builder", content_hash = %batch.content_hash, "dropping zero-gas batch tx");
            payload.stats.zero_gas_dropped += 1;
            continue;
        }
        payload.transactions.push(DerivedTx::Batched {
            raw: raw.clone(),
            gas_limit,
            data_gas: l1_data_gas(raw),
            mint: U256::ZERO,
        });
    }
}

/// Synthesizes the deposit for a V1 single; `None` if the payload is
/// malformed or targets another chain.
fn synthesize_single(cfg: &ChainConfig, single: &FacetSingle) -> Option<DerivedTx> {
    let decoded = match SinglePayload::decode(&single.payload) {
        Ok(decoded) => decoded,
        Err(err) => {
            debug!(target: "builder", tx = %single.l1_tx_hash, %err, "dropping malformed single");
            return None;
        }
    };
    if decoded.chain_id != cfg.chain_id {
        let err = DepositDecodingError::WrongChainId(decoded.chain_id);
        debug!(target: "builder", tx = %single.l1_tx_hash, %err, "dropping foreign single");
        return None;
    }

    let deposit = FacetDeposit {
        tx_type: DEPOSIT_TX_TYPE,
        source_hash: single_source_hash(single.l1_tx_hash, single.l1_tx_index),
        from: single.from,
        to: decoded.to,
        mint: U256::ZERO,
        value: decoded.value,
        gas_limit: decoded.gas_limit,
        is_system_tx: false,
        input: decoded.data,
    };
    Some(DerivedTx::Single { deposit, data_gas: l1_data_gas(&single.payload) })
}

/// The source hash of a user deposit: a domain byte over the carrier
/// transaction and its index.
fn single_source_hash(l1_tx_hash: B256, l1_tx_index: u64) -> B256 {
    let mut preimage = [0u8; 1 + 32 + 8];
    preimage[0] = SOURCE_DOMAIN_USER;
    preimage[1..33].copy_from_slice(l1_tx_hash.as_slice());
    preimage[33..].copy_from_slice(&l1_tx_index.to_be_bytes());
    keccak256(preimage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        batch::BatchSource,
        config::Network,
        registry::SignerRegistry,
        types::SingleSource,
    };
    use alloy_primitives::{address, Address, Bytes, B256};

    fn cfg() -> ChainConfig {
        let mut cfg = ChainConfig::for_network(Network::Mainnet);
        cfg.verify_signatures = false;
        cfg
    }

    fn batch(role: BatchRole, index: u64, txs: Vec<Bytes>) -> ParsedBatch {
        ParsedBatch {
            role,
            signer: None,
            l1_tx_index: index,
            l1_tx_hash: B256::with_last_byte(index as u8 + 1),
            source: BatchSource::Calldata,
            transactions: txs,
            content_hash: B256::with_last_byte(index as u8 + 0x80),
            chain_id: 0xface7,
        }
    }

    fn signed_tx(gas_limit: u64) -> Bytes {
        // A structurally valid EIP-1559 tx with a recoverable signature.
        use alloy_rlp::{Encodable, Header};
        use k256::ecdsa::SigningKey;

        let key = SigningKey::from_slice(&[0x51; 32]).unwrap();
        let mut fields = Vec::new();
        1u64.encode(&mut fields);
        0u64.encode(&mut fields);
        1u128.encode(&mut fields);
        2u128.encode(&mut fields);
        gas_limit.encode(&mut fields);
        Address::repeat_byte(0x11).encode(&mut fields);
        U256::ZERO.encode(&mut fields);
        Bytes::new().encode(&mut fields);
        Header { list: true, payload_length: 0 }.encode(&mut fields);

        let mut preimage = vec![0x02];
        Header { list: true, payload_length: fields.len() }.encode(&mut preimage);
        preimage.extend_from_slice(&fields);
        let hash = keccak256(&preimage);
        let (sig, recid) = key.sign_prehash_recoverable(hash.as_slice()).unwrap();
        let bytes = sig.to_bytes();

        (recid.to_byte() as u64).encode(&mut fields);
        U256::from_be_slice(&bytes[..32]).encode(&mut fields);
        U256::from_be_slice(&bytes[32..]).encode(&mut fields);
        let mut tx = vec![0x02];
        Header { list: true, payload_length: fields.len() }.encode(&mut tx);
        tx.extend_from_slice(&fields);
        tx.into()
    }

    fn single(index: u64, from: Address) -> FacetSingle {
        let payload = SinglePayload {
            chain_id: 0xface7,
            to: Some(address!("4444444444444444444444444444444444444444")),
            value: U256::ZERO,
            max_fee_per_gas: 100,
            gas_limit: 100_000,
            data: Bytes::new(),
        };
        FacetSingle {
            source: SingleSource::Calldata,
            l1_tx_index: index,
            l1_tx_hash: B256::with_last_byte(index as u8 + 1),
            from,
            payload: payload.encode(),
        }
    }

    #[test]
    fn priority_batch_goes_first() {
        let cfg = cfg();
        let tx = signed_tx(21_000);
        let batches = vec![
            batch(BatchRole::Permissionless, 0, vec![tx.clone()]),
            batch(BatchRole::Priority, 5, vec![tx.clone(), tx.clone()]),
            batch(BatchRole::Priority, 2, vec![tx.clone()]),
        ];

        let built = build_block(&cfg, 100, &batches, &[]);
        assert!(built.stats.priority_selected);
        // priority@2 contributes one tx first, then permissionless@0.
        assert_eq!(built.transactions.len(), 2);
    }

    #[test]
    fn priority_over_gas_share_discarded_entirely() {
        let mut cfg = cfg();
        cfg.l2_gas_limit = 10_000_000;
        cfg.priority_share_bps = 5000;
        // Declared gas 20M against a 5M share.
        let batches = vec![
            batch(BatchRole::Priority, 2, vec![signed_tx(20_000_000)]),
            batch(BatchRole::Permissionless, 4, vec![signed_tx(21_000)]),
        ];

        let built = build_block(&cfg, 100, &batches, &[]);
        assert!(built.stats.priority_discarded_for_gas);
        assert!(!built.stats.priority_selected);
        // Only the permissionless tx survives; the priority batch is not
        // readmitted as permissionless.
        assert_eq!(built.transactions.len(), 1);
    }

    #[test]
    fn unauthorized_priority_signer_not_selected() {
        let mut cfg = cfg();
        cfg.verify_signatures = true;
        cfg.registry =
            SignerRegistry::Static(address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"));
        let mut unauthorized = batch(BatchRole::Priority, 1, vec![signed_tx(21_000)]);
        unauthorized.signer = Some(address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"));

        let built = build_block(&cfg, 100, &[unauthorized], &[]);
        assert!(!built.stats.priority_selected);
        assert!(built.transactions.is_empty());
    }

    #[test]
    fn zero_gas_batch_txs_filtered() {
        let cfg = cfg();
        let batches = vec![batch(
            BatchRole::Permissionless,
            0,
            vec![signed_tx(21_000), Bytes::from(vec![0xde, 0xad])],
        )];

        let built = build_block(&cfg, 100, &batches, &[]);
        assert_eq!(built.transactions.len(), 1);
        assert_eq!(built.stats.zero_gas_dropped, 1);
    }

    #[test]
    fn singles_merge_after_batches_by_carrier_index() {
        let cfg = cfg();
        let sender = address!("1212121212121212121212121212121212121212");
        let batches = vec![batch(BatchRole::Permissionless, 3, vec![signed_tx(21_000)])];
        let singles = vec![single(1, sender), single(5, sender)];

        let built = build_block(&cfg, 100, &batches, &singles);
        assert_eq!(built.transactions.len(), 3);
        assert!(matches!(built.transactions[0], DerivedTx::Single { .. }));
        assert!(matches!(built.transactions[1], DerivedTx::Batched { .. }));
        assert!(matches!(built.transactions[2], DerivedTx::Single { .. }));
    }

    #[test]
    fn foreign_chain_single_dropped() {
        let cfg = cfg();
        let mut foreign = single(0, address!("1212121212121212121212121212121212121212"));
        let mut payload = SinglePayload::decode(&foreign.payload).unwrap();
        payload.chain_id = 0xdead;
        foreign.payload = payload.encode();

        let built = build_block(&cfg, 100, &[], &[foreign]);
        assert!(built.transactions.is_empty());
        assert_eq!(built.stats.invalid_singles, 1);
    }

    #[test]
    fn single_synthesis_carries_l1_sender() {
        let cfg = cfg();
        let sender = address!("7777777777777777777777777777777777777777");
        let built = build_block(&cfg, 100, &[], &[single(0, sender)]);
        let DerivedTx::Single { deposit, .. } = &built.transactions[0] else {
            panic!("expected a single");
        };
        assert_eq!(deposit.from, sender);
        assert_eq!(deposit.tx_type, DEPOSIT_TX_TYPE);
        assert!(!deposit.is_system_tx);
    }
}
