//! Per-L1-block collection of Facet payloads.
//!
//! For one L1 block, the collector walks every successful transaction for
//! inbox singles and calldata batches, decodes the blobs of type-3 carriers
//! for blob batches, and deduplicates batches by content hash. The output is
//! fully ordered and deterministic.

use crate::{
    batch::{contains_magic, scan_payload, BatchSource, ParsedBatch},
    blob::decode_blob,
    config::ChainConfig,
    errors::CollectError,
    params::{BATCH_MAGIC, FACET_INBOX_ADDRESS, FACET_LOG_TOPIC},
    traits::BlobProvider,
    types::{FacetSingle, IndexedBlobHash, L1Block, SingleSource},
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Counters describing one collection pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CollectStats {
    /// Singles found in calldata.
    pub calldata_singles: usize,
    /// Singles found in event data.
    pub event_singles: usize,
    /// Batches accepted before deduplication.
    pub batches_found: usize,
    /// Duplicate batches dropped by content hash.
    pub duplicates_dropped: usize,
    /// Blobs referenced by carriers but absent from the blob store.
    pub missing_blobs: usize,
    /// Priority batches discarded for unrecoverable signatures.
    pub invalid_priority: usize,
}

/// Everything collected from one L1 block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CollectedPayloads {
    /// The singles, in L1 transaction order.
    pub singles: Vec<FacetSingle>,
    /// The deduplicated batches, sorted by carrier transaction index.
    pub batches: Vec<ParsedBatch>,
    /// Collection counters.
    pub stats: CollectStats,
}

/// Collects Facet payloads from L1 blocks.
#[derive(Debug)]
pub struct BatchCollector<'a, B: BlobProvider> {
    cfg: &'a ChainConfig,
    blob_provider: &'a mut B,
}

impl<'a, B: BlobProvider> BatchCollector<'a, B> {
    /// Creates a new collector over the given blob provider.
    pub fn new(cfg: &'a ChainConfig, blob_provider: &'a mut B) -> Self {
        Self { cfg, blob_provider }
    }

    /// Collects singles and batches from one L1 block.
    pub async fn collect(&mut self, block: &L1Block) -> Result<CollectedPayloads, CollectError> {
        let mut out = CollectedPayloads::default();
        let mut batches: Vec<ParsedBatch> = Vec::new();

        for tx in &block.transactions {
            let Some(receipt) = block.receipts.get(tx.index as usize) else {
                continue;
            };
            if !receipt.status {
                continue;
            }

            // An inbox transaction whose input is not batch-formatted is a
            // V1 calldata single.
            if tx.to == Some(FACET_INBOX_ADDRESS) && !contains_magic(&tx.input) {
                out.singles.push(FacetSingle {
                    source: SingleSource::Calldata,
                    l1_tx_index: tx.index,
                    l1_tx_hash: tx.hash,
                    from: tx.from,
                    payload: tx.input.clone(),
                });
                out.stats.calldata_singles += 1;
            }

            let scanned = scan_payload(&tx.input, self.cfg);
            out.stats.invalid_priority += scanned.invalid_priority;
            for batch in scanned.batches {
                batches.push(ParsedBatch {
                    role: batch.raw.role,
                    signer: batch.signer,
                    l1_tx_index: tx.index,
                    l1_tx_hash: tx.hash,
                    source: BatchSource::Calldata,
                    transactions: batch.transactions,
                    content_hash: batch.content_hash,
                    chain_id: batch.raw.chain_id,
                });
            }

            // V1 protocol rule: only the first qualifying log of a
            // transaction carries a single, and batches are never accepted
            // from event data.
            if let Some(log) = receipt.logs.iter().find(|log| {
                log.topics.len() == 1
                    && log.topics[0] == FACET_LOG_TOPIC
                    && !log.data.starts_with(&BATCH_MAGIC)
            }) {
                out.singles.push(FacetSingle {
                    source: SingleSource::Event,
                    l1_tx_index: tx.index,
                    l1_tx_hash: tx.hash,
                    from: log.address,
                    payload: log.data.clone(),
                });
                out.stats.event_singles += 1;
            }
        }

        // Blob carriers: decode every referenced blob and scan the payload.
        // Blob data is available regardless of the carrier's execution
        // outcome, so no receipt-status filter applies here.
        for tx in &block.transactions {
            if tx.blob_hashes.is_empty() {
                continue;
            }

            let hashes = tx
                .blob_hashes
                .iter()
                .enumerate()
                .map(|(index, hash)| IndexedBlobHash { index: index as u64, hash: *hash })
                .collect::<Vec<_>>();
            let blobs = self
                .blob_provider
                .get_blobs(&block.header.block_info(), &hashes)
                .await
                .map_err(|e| CollectError::BlobProvider(e.to_string()))?;

            for (indexed, blob) in hashes.iter().zip(blobs) {
                let Some(blob) = blob else {
                    warn!(target: "collect", tx = %tx.hash, hash = %indexed.hash, "missing blob");
                    out.stats.missing_blobs += 1;
                    continue;
                };
                let payload = match decode_blob(&blob) {
                    Ok(payload) => payload,
                    Err(err) => {
                        debug!(target: "collect", tx = %tx.hash, %err, "undecodable blob");
                        continue;
                    }
                };

                let scanned = scan_payload(&payload, self.cfg);
                out.stats.invalid_priority += scanned.invalid_priority;
                for batch in scanned.batches {
                    batches.push(ParsedBatch {
                        role: batch.raw.role,
                        signer: batch.signer,
                        l1_tx_index: tx.index,
                        l1_tx_hash: tx.hash,
                        source: BatchSource::Blob { versioned_hash: indexed.hash },
                        transactions: batch.transactions,
                        content_hash: batch.content_hash,
                        chain_id: batch.raw.chain_id,
                    });
                }
            }
        }

        out.stats.batches_found = batches.len();
        out.batches = dedup_batches(batches, &mut out.stats);
        Ok(out)
    }
}

/// Deduplicates batches by content hash, keeping the occurrence with the
/// smallest carrier index, and sorts survivors by carrier index.
///
/// Collection order (calldata pass, then blob pass, each in transaction
/// order) is deterministic, and the sort is stable, so batches tied on
/// carrier index keep that order.
fn dedup_batches(batches: Vec<ParsedBatch>, stats: &mut CollectStats) -> Vec<ParsedBatch> {
    let mut survivors: Vec<ParsedBatch> = Vec::new();
    let mut by_hash: HashMap<alloy_primitives::B256, usize> = HashMap::new();
    for batch in batches {
        match by_hash.get(&batch.content_hash) {
            Some(&position) => {
                stats.duplicates_dropped += 1;
                if batch.l1_tx_index < survivors[position].l1_tx_index {
                    survivors[position] = batch;
                }
            }
            None => {
                by_hash.insert(batch.content_hash, survivors.len());
                survivors.push(batch);
            }
        }
    }

    survivors.sort_by_key(|batch| batch.l1_tx_index);
    survivors
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::Network,
        test_utils::TestBlobProvider,
        types::{L1Header, L1Log, L1Receipt, L1Transaction},
    };
    use alloy_primitives::{address, b256, Bytes, B256};

    fn cfg() -> ChainConfig {
        ChainConfig::for_network(Network::Mainnet)
    }

    fn block_with(txs: Vec<L1Transaction>, receipts: Vec<L1Receipt>) -> L1Block {
        L1Block { header: L1Header { number: 100, ..Default::default() }, transactions: txs, receipts }
    }

    fn ok_receipt() -> L1Receipt {
        L1Receipt { status: true, logs: vec![] }
    }

    fn inbox_tx(index: u64, input: Bytes) -> L1Transaction {
        L1Transaction {
            hash: B256::with_last_byte(index as u8 + 1),
            index,
            from: address!("5555555555555555555555555555555555555555"),
            to: Some(FACET_INBOX_ADDRESS),
            input,
            blob_hashes: vec![],
        }
    }

    #[tokio::test]
    async fn collects_calldata_single() {
        let payload = Bytes::from(vec![0x7e, 0x01, 0x02]);
        let block =
            block_with(vec![inbox_tx(0, payload.clone())], vec![ok_receipt()]);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.singles.len(), 1);
        assert_eq!(collected.singles[0].source, SingleSource::Calldata);
        assert_eq!(collected.singles[0].payload, payload);
        assert!(collected.batches.is_empty());
    }

    #[tokio::test]
    async fn failed_receipts_are_ignored() {
        let block = block_with(
            vec![inbox_tx(0, Bytes::from(vec![0x7e]))],
            vec![L1Receipt { status: false, logs: vec![] }],
        );
        let mut blobs = TestBlobProvider::default();
        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert!(collected.singles.is_empty());
        assert!(collected.batches.is_empty());
    }

    #[tokio::test]
    async fn collects_calldata_batch() {
        let batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02aa", b"\x02bb"]);
        let mut tx = inbox_tx(0, batch.encode());
        tx.to = Some(address!("9999999999999999999999999999999999999999"));
        let block = block_with(vec![tx], vec![ok_receipt()]);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert!(collected.singles.is_empty());
        assert_eq!(collected.batches.len(), 1);
        assert_eq!(collected.batches[0].transactions.len(), 2);
        assert_eq!(collected.batches[0].source, BatchSource::Calldata);
    }

    #[tokio::test]
    async fn inbox_tx_with_batch_is_not_a_single() {
        let batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02aa"]);
        let block = block_with(vec![inbox_tx(0, batch.encode())], vec![ok_receipt()]);
        let mut blobs = TestBlobProvider::default();
        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert!(collected.singles.is_empty());
        assert_eq!(collected.batches.len(), 1);
    }

    #[tokio::test]
    async fn first_matching_log_wins_and_batches_in_events_rejected() {
        let emitter_a = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
        let emitter_b = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");
        let batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02aa"]);

        let mut tx = inbox_tx(0, Bytes::new());
        tx.to = None;
        let receipt = L1Receipt {
            status: true,
            logs: vec![
                // Two topics: not an inbox log.
                L1Log {
                    address: emitter_a,
                    topics: vec![FACET_LOG_TOPIC, B256::ZERO],
                    data: Bytes::from(vec![0x7e, 0x01]),
                },
                // Batch magic in event data: rejected outright.
                L1Log { address: emitter_a, topics: vec![FACET_LOG_TOPIC], data: batch.encode() },
                L1Log {
                    address: emitter_b,
                    topics: vec![FACET_LOG_TOPIC],
                    data: Bytes::from(vec![0x7e, 0x02]),
                },
            ],
        };
        let block = block_with(vec![tx], vec![receipt]);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        // The magic-bearing log neither qualifies as a single nor yields a
        // batch; the next qualifying log carries the single.
        assert_eq!(collected.singles.len(), 1);
        assert_eq!(collected.singles[0].from, emitter_b);
        assert!(collected.batches.is_empty());
    }

    #[tokio::test]
    async fn event_single_from_first_qualifying_log() {
        let emitter = address!("cccccccccccccccccccccccccccccccccccccccc");
        let mut tx = inbox_tx(0, Bytes::new());
        tx.to = None;
        let receipt = L1Receipt {
            status: true,
            logs: vec![
                L1Log { address: emitter, topics: vec![FACET_LOG_TOPIC], data: Bytes::from(vec![0x7e, 0x0a]) },
                L1Log { address: emitter, topics: vec![FACET_LOG_TOPIC], data: Bytes::from(vec![0x7e, 0x0b]) },
            ],
        };
        let block = block_with(vec![tx], vec![receipt]);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.singles.len(), 1);
        assert_eq!(collected.singles[0].from, emitter);
        assert_eq!(collected.singles[0].payload, Bytes::from(vec![0x7e, 0x0a]));
    }

    #[tokio::test]
    async fn duplicate_batches_keep_smallest_index() {
        let batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02aa"]);
        let mut txs = Vec::new();
        let mut receipts = Vec::new();
        for index in 0..8u64 {
            let mut tx = inbox_tx(index, Bytes::new());
            tx.to = None;
            if index == 3 || index == 7 {
                tx.input = batch.encode();
            }
            txs.push(tx);
            receipts.push(ok_receipt());
        }
        let block = block_with(txs, receipts);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.batches.len(), 1);
        assert_eq!(collected.batches[0].l1_tx_index, 3);
        assert_eq!(collected.stats.duplicates_dropped, 1);
    }

    #[tokio::test]
    async fn blob_batch_extracted_with_filler() {
        let batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02aa"]);
        let mut payload = vec![0x11u8; 100];
        payload.extend_from_slice(&batch.encode());
        payload.extend_from_slice(&[0x22u8; 200]);
        let blob = crate::blob::encode_blob(&payload).unwrap();

        let versioned = b256!("0101010101010101010101010101010101010101010101010101010101010101");
        let mut blobs = TestBlobProvider::default();
        blobs.insert(versioned, blob);

        let mut tx = inbox_tx(0, Bytes::new());
        tx.to = None;
        tx.blob_hashes = vec![versioned];
        let block = block_with(vec![tx], vec![ok_receipt()]);

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.batches.len(), 1);
        assert_eq!(
            collected.batches[0].source,
            BatchSource::Blob { versioned_hash: versioned }
        );
    }

    #[tokio::test]
    async fn calldata_batch_orders_before_blob_batch_from_same_carrier() {
        let calldata_batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02ca"]);
        let blob_batch = crate::batch::tests::permissionless_batch(0xface7, &[b"\x02b0"]);
        let blob = crate::blob::encode_blob(&blob_batch.encode()).unwrap();

        let versioned = b256!("0102030405060708010203040506070801020304050607080102030405060708");
        let mut blobs = TestBlobProvider::default();
        blobs.insert(versioned, blob);

        let mut tx = inbox_tx(0, calldata_batch.encode());
        tx.to = None;
        tx.blob_hashes = vec![versioned];
        let block = block_with(vec![tx], vec![ok_receipt()]);

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.batches.len(), 2);
        assert_eq!(collected.batches[0].source, BatchSource::Calldata);
        assert_eq!(
            collected.batches[1].source,
            BatchSource::Blob { versioned_hash: versioned }
        );
    }

    #[tokio::test]
    async fn missing_blob_counted_not_fatal() {
        let mut tx = inbox_tx(0, Bytes::new());
        tx.to = None;
        tx.blob_hashes =
            vec![b256!("0102030405060708010203040506070801020304050607080102030405060708")];
        let block = block_with(vec![tx], vec![ok_receipt()]);
        let mut blobs = TestBlobProvider::default();

        let cfg = cfg();
        let collected =
            BatchCollector::new(&cfg, &mut blobs).collect(&block).await.unwrap();
        assert_eq!(collected.stats.missing_blobs, 1);
        assert!(collected.batches.is_empty());
    }
}
