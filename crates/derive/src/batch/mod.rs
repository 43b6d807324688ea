//! The Facet wire batch format and the payload scanner.
//!
//! A batch begins at the magic prefix and carries a fixed header, an RLP
//! list of raw EIP-2718 transactions, and a 65-byte signature when the role
//! is priority:
//!
//! ```text
//! batch = magic ++ chain_id (u64 BE) ++ version (u8) ++ role (u8)
//!         ++ length (u32 BE) ++ rlp_tx_list ++ signature?
//! ```
//!
//! The scanner is pure: it looks up no state, never raises, and every
//! rejection advances the scan so total work stays linear in the input.

use crate::{
    config::ChainConfig,
    errors::BatchParseError,
    params::{
        BATCH_HEADER_SIZE, BATCH_MAGIC, BATCH_VERSION, MAGIC_SIZE, ROLE_PERMISSIONLESS,
        ROLE_PRIORITY, SIGNATURE_SIZE,
    },
    signer::recover_signer,
};
use alloy_primitives::{keccak256, Address, Bytes, B256};
use alloy_rlp::{Decodable, Header};

/// The role of a batch, taken from the wire byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchRole {
    /// Role `0x00`: any L1 sender may post; no signature.
    Permissionless,
    /// Role `0x01`: must be signed by the block-scoped authorized signer.
    Priority,
}

impl BatchRole {
    /// The wire byte for this role.
    pub const fn as_byte(&self) -> u8 {
        match self {
            Self::Permissionless => ROLE_PERMISSIONLESS,
            Self::Priority => ROLE_PRIORITY,
        }
    }

    /// Parses a wire role byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            ROLE_PERMISSIONLESS => Some(Self::Permissionless),
            ROLE_PRIORITY => Some(Self::Priority),
            _ => None,
        }
    }
}

/// Where a batch was found within its L1 block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchSource {
    /// Calldata of an L1 transaction.
    Calldata,
    /// A decoded blob referenced by a type-3 L1 transaction.
    Blob {
        /// The versioned hash of the carrying blob.
        versioned_hash: B256,
    },
}

/// A wire batch in structural form. Re-encoding yields the exact original
/// bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBatch {
    /// The Facet chain id from the header.
    pub chain_id: u64,
    /// The wire version byte.
    pub version: u8,
    /// The batch role.
    pub role: BatchRole,
    /// The raw RLP transaction list, exactly as it appeared on the wire.
    pub tx_list: Bytes,
    /// The signature, present iff the role is priority.
    pub signature: Option<[u8; SIGNATURE_SIZE]>,
}

impl RawBatch {
    /// Encodes the batch back into wire form.
    pub fn encode(&self) -> Bytes {
        let mut out = Vec::with_capacity(BATCH_HEADER_SIZE + self.tx_list.len() + SIGNATURE_SIZE);
        out.extend_from_slice(&BATCH_MAGIC);
        out.extend_from_slice(&self.chain_id.to_be_bytes());
        out.push(self.version);
        out.push(self.role.as_byte());
        out.extend_from_slice(&(self.tx_list.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.tx_list);
        if let Some(sig) = &self.signature {
            out.extend_from_slice(sig);
        }
        out.into()
    }

    /// The content hash identifying this batch for deduplication. The
    /// signature is included, so two batches with identical transaction
    /// lists but different signatures stay distinct.
    pub fn content_hash(&self) -> B256 {
        let mut preimage = self.hash_preimage();
        if let Some(sig) = &self.signature {
            preimage.extend_from_slice(sig);
        }
        keccak256(&preimage)
    }

    /// The message hash a priority signature commits to.
    pub fn signing_hash(&self) -> B256 {
        keccak256(&self.hash_preimage())
    }

    fn hash_preimage(&self) -> Vec<u8> {
        let mut preimage = Vec::with_capacity(10 + self.tx_list.len() + SIGNATURE_SIZE);
        preimage.extend_from_slice(&self.chain_id.to_be_bytes());
        preimage.push(self.version);
        preimage.push(self.role.as_byte());
        preimage.extend_from_slice(&self.tx_list);
        preimage
    }

    /// Decodes the RLP transaction list into raw transaction byte strings.
    pub fn decode_transactions(&self, max_txs: usize) -> Result<Vec<Bytes>, BatchParseError> {
        let buf = &mut self.tx_list.as_ref();
        let header = Header::decode(buf).map_err(BatchParseError::InvalidRlp)?;
        if !header.list || header.payload_length != buf.len() {
            return Err(BatchParseError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
        }

        let mut txs = Vec::new();
        while !buf.is_empty() {
            let tx = Bytes::decode(buf).map_err(BatchParseError::InvalidRlp)?;
            txs.push(tx);
            if txs.len() > max_txs {
                return Err(BatchParseError::TooManyTxs(txs.len()));
            }
        }
        Ok(txs)
    }
}

/// A batch accepted by the scanner, with its derived artifacts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedBatch {
    /// The structural batch.
    pub raw: RawBatch,
    /// The recovered priority signer, present iff recovery succeeded.
    pub signer: Option<Address>,
    /// The decoded transaction byte strings.
    pub transactions: Vec<Bytes>,
    /// The deduplication content hash.
    pub content_hash: B256,
    /// The byte offset of the batch within the scanned payload.
    pub offset: usize,
}

/// The result of scanning one carrier payload.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    /// Accepted batches, in order of appearance.
    pub batches: Vec<ScannedBatch>,
    /// Priority batches discarded for an unrecoverable signature.
    pub invalid_priority: usize,
}

/// A batch attributed to its carrier, ready for block building.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedBatch {
    /// The batch role.
    pub role: BatchRole,
    /// The recovered priority signer, when verification ran and succeeded.
    pub signer: Option<Address>,
    /// The index of the carrier L1 transaction.
    pub l1_tx_index: u64,
    /// The hash of the carrier L1 transaction.
    pub l1_tx_hash: B256,
    /// Where the batch was found.
    pub source: BatchSource,
    /// The raw transactions, in batch order.
    pub transactions: Vec<Bytes>,
    /// The deduplication content hash.
    pub content_hash: B256,
    /// The Facet chain id from the header.
    pub chain_id: u64,
}

/// Returns whether the payload contains the batch magic at any offset.
pub fn contains_magic(payload: &[u8]) -> bool {
    find_magic(payload, 0).is_some()
}

fn find_magic(payload: &[u8], from: usize) -> Option<usize> {
    if from >= payload.len() {
        return None;
    }
    payload[from..]
        .windows(MAGIC_SIZE)
        .position(|window| window == BATCH_MAGIC.as_slice())
        .map(|pos| from + pos)
}

/// Scans a carrier payload for wire batches.
///
/// Rejections never abort the scan. A rejected batch with a credible length
/// field is skipped whole to keep the scan linear; a length over the
/// configured cap is not credible, so the scan advances a single byte past
/// the magic instead.
pub fn scan_payload(payload: &[u8], cfg: &ChainConfig) -> ScanOutcome {
    let mut outcome = ScanOutcome::default();
    let mut offset = 0usize;

    while outcome.batches.len() < cfg.max_batches_per_payload {
        let Some(start) = find_magic(payload, offset) else {
            break;
        };
        if payload.len() - start < BATCH_HEADER_SIZE {
            let err = BatchParseError::TruncatedHeader;
            tracing::trace!(target: "batch", %err, "stopping scan");
            break;
        }

        let mut cursor = start + MAGIC_SIZE;
        let chain_id = u64::from_be_bytes(payload[cursor..cursor + 8].try_into().unwrap());
        cursor += 8;
        let version = payload[cursor];
        let role_byte = payload[cursor + 1];
        let length =
            u32::from_be_bytes(payload[cursor + 2..cursor + 6].try_into().unwrap()) as usize;

        let body_start = start + BATCH_HEADER_SIZE;
        let signature_len =
            if role_byte == ROLE_PRIORITY { SIGNATURE_SIZE } else { 0 };
        let claimed_end = body_start.saturating_add(length).saturating_add(signature_len);
        let credible_length = length <= cfg.max_batch_bytes as usize;
        let skip_whole = if credible_length { claimed_end.min(payload.len()) } else { start + 1 };

        if chain_id != cfg.chain_id {
            let err = BatchParseError::WrongChainId { expected: cfg.chain_id, got: chain_id };
            tracing::trace!(target: "batch", %err, "skipping batch");
            offset = skip_whole;
            continue;
        }
        if version != BATCH_VERSION {
            let err = BatchParseError::WrongVersion(version);
            tracing::debug!(target: "batch", %err, "skipping batch");
            offset = skip_whole;
            continue;
        }
        if !credible_length {
            let err = BatchParseError::BadLength(length as u32);
            tracing::debug!(target: "batch", %err, "skipping batch");
            offset = start + 1;
            continue;
        }
        let Some(role) = BatchRole::from_byte(role_byte) else {
            let err = BatchParseError::BadRole(role_byte);
            tracing::debug!(target: "batch", %err, "skipping batch");
            offset = skip_whole;
            continue;
        };
        if claimed_end > payload.len() {
            let err = BatchParseError::TruncatedPayload;
            tracing::debug!(target: "batch", %err, "skipping batch");
            offset = skip_whole;
            continue;
        }

        let tx_list = Bytes::copy_from_slice(&payload[body_start..body_start + length]);
        let signature = (role == BatchRole::Priority).then(|| {
            let mut sig = [0u8; SIGNATURE_SIZE];
            sig.copy_from_slice(&payload[body_start + length..claimed_end]);
            sig
        });
        let raw = RawBatch { chain_id, version, role, tx_list, signature };

        let transactions = match raw.decode_transactions(cfg.max_txs_per_batch) {
            Ok(txs) => txs,
            Err(err) => {
                tracing::debug!(target: "batch", %err, "skipping undecodable batch");
                offset = skip_whole;
                continue;
            }
        };

        let signer = if role == BatchRole::Priority && cfg.verify_signatures {
            let sig = raw.signature.as_ref().expect("priority batch carries a signature");
            match recover_signer(raw.signing_hash(), sig) {
                Ok(address) => Some(address),
                Err(cause) => {
                    let err = BatchParseError::BadSignature;
                    tracing::debug!(target: "batch", %err, %cause, "discarding priority batch");
                    outcome.invalid_priority += 1;
                    offset = skip_whole;
                    continue;
                }
            }
        } else {
            None
        };

        let content_hash = raw.content_hash();
        outcome.batches.push(ScannedBatch { raw, signer, transactions, content_hash, offset: start });
        offset = claimed_end;
    }

    outcome
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::Network;
    use alloy_rlp::Encodable;
    use k256::ecdsa::SigningKey;

    fn cfg() -> ChainConfig {
        ChainConfig::for_network(Network::Mainnet)
    }

    pub(crate) fn encode_tx_list(txs: &[&[u8]]) -> Bytes {
        let mut payload = Vec::new();
        for tx in txs {
            Bytes::copy_from_slice(tx).encode(&mut payload);
        }
        let mut out = Vec::new();
        Header { list: true, payload_length: payload.len() }.encode(&mut out);
        out.extend_from_slice(&payload);
        out.into()
    }

    pub(crate) fn permissionless_batch(chain_id: u64, txs: &[&[u8]]) -> RawBatch {
        RawBatch {
            chain_id,
            version: BATCH_VERSION,
            role: BatchRole::Permissionless,
            tx_list: encode_tx_list(txs),
            signature: None,
        }
    }

    pub(crate) fn priority_batch(chain_id: u64, txs: &[&[u8]], key: &SigningKey) -> RawBatch {
        let mut batch = RawBatch {
            chain_id,
            version: BATCH_VERSION,
            role: BatchRole::Priority,
            tx_list: encode_tx_list(txs),
            signature: None,
        };
        let (sig, recid) = key.sign_prehash_recoverable(batch.signing_hash().as_slice()).unwrap();
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recid.to_byte();
        batch.signature = Some(bytes);
        batch
    }

    #[test]
    fn encode_decode_roundtrip() {
        let batch = permissionless_batch(0xface7, &[b"\x01tx-a", b"\x02tx-b"]);
        let encoded = batch.encode();

        let outcome = scan_payload(&encoded, &cfg());
        assert_eq!(outcome.batches.len(), 1);
        let scanned = &outcome.batches[0];
        assert_eq!(scanned.raw, batch);
        assert_eq!(scanned.raw.encode(), encoded);
        assert_eq!(scanned.transactions.len(), 2);
    }

    #[test]
    fn batch_found_at_any_offset() {
        let batch = permissionless_batch(0xface7, &[b"\x02tx"]);
        let mut payload = vec![0xaa; 37];
        payload.extend_from_slice(&batch.encode());
        payload.extend_from_slice(&[0xbb; 53]);

        let outcome = scan_payload(&payload, &cfg());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].offset, 37);
    }

    #[test]
    fn wrong_chain_id_skipped_whole() {
        let foreign = permissionless_batch(0xdead, &[b"\x02ignored"]);
        let ours = permissionless_batch(0xface7, &[b"\x02kept"]);
        let mut payload = foreign.encode().to_vec();
        payload.extend_from_slice(&ours.encode());

        let outcome = scan_payload(&payload, &cfg());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(outcome.batches[0].raw, ours);
    }

    #[test]
    fn incredible_length_advances_one_byte() {
        // A magic followed by a huge claimed length must not censor a real
        // batch later in the payload.
        let mut payload = BATCH_MAGIC.to_vec();
        payload.extend_from_slice(&0xface7u64.to_be_bytes());
        payload.push(BATCH_VERSION);
        payload.push(ROLE_PERMISSIONLESS);
        payload.extend_from_slice(&u32::MAX.to_be_bytes());
        payload.extend_from_slice(&permissionless_batch(0xface7, &[b"\x02real"]).encode());

        let outcome = scan_payload(&payload, &cfg());
        assert_eq!(outcome.batches.len(), 1);
    }

    #[test]
    fn truncated_payload_rejected_without_panic() {
        let batch = permissionless_batch(0xface7, &[b"\x02tx"]);
        let encoded = batch.encode();
        let truncated = &encoded[..encoded.len() - 3];
        assert!(scan_payload(truncated, &cfg()).batches.is_empty());
    }

    #[test]
    fn too_many_transactions_rejected() {
        let tx: &[u8] = b"\x02t";
        let txs = vec![tx; 1001];
        let batch = permissionless_batch(0xface7, &txs);
        assert!(scan_payload(&batch.encode(), &cfg()).batches.is_empty());
    }

    #[test]
    fn non_list_tx_payload_rejected() {
        let batch = RawBatch {
            chain_id: 0xface7,
            version: BATCH_VERSION,
            role: BatchRole::Permissionless,
            tx_list: Bytes::from(vec![0x83, 0x01, 0x02, 0x03]),
            signature: None,
        };
        assert!(scan_payload(&batch.encode(), &cfg()).batches.is_empty());
    }

    #[test]
    fn priority_batch_recovers_signer() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let batch = priority_batch(0xface7, &[b"\x02tx"], &key);

        let outcome = scan_payload(&batch.encode(), &cfg());
        assert_eq!(outcome.batches.len(), 1);
        assert_eq!(
            outcome.batches[0].signer,
            Some(crate::signer::address_from_key(key.verifying_key()))
        );
    }

    #[test]
    fn priority_batch_with_garbage_signature_discarded() {
        let key = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let mut batch = priority_batch(0xface7, &[b"\x02tx"], &key);
        batch.signature = Some([0xff; SIGNATURE_SIZE]);

        let outcome = scan_payload(&batch.encode(), &cfg());
        assert!(outcome.batches.is_empty());
        assert_eq!(outcome.invalid_priority, 1);
    }

    #[test]
    fn signature_distinguishes_content_hashes() {
        let key_a = SigningKey::from_slice(&[0x42; 32]).unwrap();
        let key_b = SigningKey::from_slice(&[0x43; 32]).unwrap();
        let a = priority_batch(0xface7, &[b"\x02tx"], &key_a);
        let b = priority_batch(0xface7, &[b"\x02tx"], &key_b);
        assert_ne!(a.content_hash(), b.content_hash());
        assert_eq!(a.signing_hash(), b.signing_hash());
    }

    #[test]
    fn batch_cap_bounds_scan() {
        let batch = permissionless_batch(0xface7, &[b"\x02tx"]).encode();
        let mut payload = Vec::new();
        for _ in 0..15 {
            payload.extend_from_slice(&batch);
        }
        let outcome = scan_payload(&payload, &cfg());
        assert_eq!(outcome.batches.len(), cfg().max_batches_per_payload);
    }

    #[test]
    fn magic_spam_terminates() {
        let payload = BATCH_MAGIC.repeat(64);
        assert!(scan_payload(&payload, &cfg()).batches.is_empty());
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn scan_is_total_on_arbitrary_input(
                payload in proptest::collection::vec(any::<u8>(), 0..2048)
            ) {
                let outcome = scan_payload(&payload, &cfg());
                prop_assert!(outcome.batches.len() <= cfg().max_batches_per_payload);
            }

            #[test]
            fn embedded_batch_survives_magic_free_filler(
                prefix in proptest::collection::vec(0u8..0x19, 0..256),
                tx_body in proptest::collection::vec(any::<u8>(), 1..64)
            ) {
                // Filler bytes below the first magic byte cannot contain the
                // prefix, so the scanner must find the real batch.
                let mut tx = vec![0x02u8];
                tx.extend_from_slice(&tx_body);
                let batch = permissionless_batch(0xface7, &[tx.as_slice()]);
                let mut payload = prefix;
                payload.extend_from_slice(&batch.encode());

                let outcome = scan_payload(&payload, &cfg());
                prop_assert_eq!(outcome.batches.len(), 1);
                prop_assert_eq!(&outcome.batches[0].raw, &batch);
            }
        }
    }
}
