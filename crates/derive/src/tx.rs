//! Lazy parsing of raw EIP-2718 transactions.
//!
//! The derivation never executes batched transactions; it only needs their
//! declared gas limit, nonce, and sender. Types `0x02` (EIP-1559), `0x01`
//! (EIP-2930), and legacy (including EIP-155) are supported. Anything else
//! fails to parse, which downstream treats as a zero gas limit so the
//! transaction is filtered out.

use crate::{errors::TxParseError, signer::recover_signer};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header};

/// Metadata extracted from a raw transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxMeta {
    /// The declared gas limit.
    pub gas_limit: u64,
    /// The sender nonce.
    pub nonce: u64,
    /// The hash the signature commits to.
    pub signing_hash: B256,
    /// The recovered sender.
    pub signer: Address,
}

/// Parses a raw EIP-2718 transaction into its [TxMeta].
pub fn parse_tx_meta(raw: &[u8]) -> Result<TxMeta, TxParseError> {
    match raw.first().copied() {
        None => Err(TxParseError::Empty),
        Some(0x02) => parse_typed(&raw[1..], 0x02, 2),
        Some(0x01) => parse_typed(&raw[1..], 0x01, 1),
        _ => parse_legacy(raw),
    }
}

/// The declared gas limit of a raw transaction, or zero when it cannot be
/// parsed.
pub fn declared_gas_limit(raw: &[u8]) -> u64 {
    parse_tx_meta(raw).map(|meta| meta.gas_limit).unwrap_or_default()
}

/// Parses a typed transaction body. For `0x02` the gas limit sits at field
/// index 4 behind two fee fields; for `0x01` at index 3 behind one.
fn parse_typed(body: &[u8], tx_type: u8, fee_fields: usize) -> Result<TxMeta, TxParseError> {
    let buf = &mut &body[..];
    let header = Header::decode(buf).map_err(TxParseError::InvalidRlp)?;
    if !header.list || header.payload_length != buf.len() {
        return Err(TxParseError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
    }
    let fields = *buf;

    let _chain_id = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let nonce = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    for _ in 0..fee_fields {
        let _fee = u128::decode(buf).map_err(TxParseError::InvalidRlp)?;
    }
    let gas_limit = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    decode_to_field(buf)?;
    let _value = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let _data = Bytes::decode(buf).map_err(TxParseError::InvalidRlp)?;
    skip_item(buf)?; // access list

    // Everything up to here is the signed payload.
    let signed_len = fields.len() - buf.len();
    let signed_fields = &fields[..signed_len];

    let v = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let r = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let s = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    if !buf.is_empty() {
        return Err(TxParseError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
    }
    if v > 1 {
        return Err(TxParseError::InvalidV);
    }

    let mut preimage = Vec::with_capacity(signed_len + 4);
    preimage.push(tx_type);
    Header { list: true, payload_length: signed_len }.encode(&mut preimage);
    preimage.extend_from_slice(signed_fields);
    let signing_hash = keccak256(&preimage);

    let signer = recover_signer(signing_hash, &assemble_signature(r, s, v as u8))?;
    Ok(TxMeta { gas_limit, nonce, signing_hash, signer })
}

/// Parses a legacy transaction, reconstructing the EIP-155 signing payload
/// when `v >= 35`.
fn parse_legacy(raw: &[u8]) -> Result<TxMeta, TxParseError> {
    let buf = &mut &raw[..];
    let header = Header::decode(buf).map_err(TxParseError::InvalidRlp)?;
    if !header.list || header.payload_length != buf.len() {
        return Err(TxParseError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
    }
    let fields = *buf;

    let nonce = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let _gas_price = u128::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let gas_limit = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    decode_to_field(buf)?;
    let _value = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let _data = Bytes::decode(buf).map_err(TxParseError::InvalidRlp)?;

    let signed_len = fields.len() - buf.len();
    let signed_fields = &fields[..signed_len];

    let v = u64::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let r = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    let s = U256::decode(buf).map_err(TxParseError::InvalidRlp)?;
    if !buf.is_empty() {
        return Err(TxParseError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
    }

    let (recovery_id, chain_id) = match v {
        27 | 28 => (v - 27, None),
        v if v >= 35 => ((v - 35) % 2, Some((v - 35) / 2)),
        _ => return Err(TxParseError::InvalidV),
    };

    let mut payload = signed_fields.to_vec();
    if let Some(chain_id) = chain_id {
        chain_id.encode(&mut payload);
        payload.push(alloy_rlp::EMPTY_STRING_CODE);
        payload.push(alloy_rlp::EMPTY_STRING_CODE);
    }
    let mut preimage = Vec::with_capacity(payload.len() + 4);
    Header { list: true, payload_length: payload.len() }.encode(&mut preimage);
    preimage.extend_from_slice(&payload);
    let signing_hash = keccak256(&preimage);

    let signer = recover_signer(signing_hash, &assemble_signature(r, s, recovery_id as u8))?;
    Ok(TxMeta { gas_limit, nonce, signing_hash, signer })
}

/// Decodes a `to` field: empty (create) or a 20-byte address.
fn decode_to_field(buf: &mut &[u8]) -> Result<Option<Address>, TxParseError> {
    let raw = Bytes::decode(buf).map_err(TxParseError::InvalidRlp)?;
    match raw.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(&raw))),
        _ => Err(TxParseError::InvalidTo),
    }
}

/// Advances the buffer past one RLP item of any kind.
fn skip_item(buf: &mut &[u8]) -> Result<(), TxParseError> {
    let header = Header::decode(buf).map_err(TxParseError::InvalidRlp)?;
    if buf.len() < header.payload_length {
        return Err(TxParseError::InvalidRlp(alloy_rlp::Error::InputTooShort));
    }
    *buf = &buf[header.payload_length..];
    Ok(())
}

fn assemble_signature(r: U256, s: U256, v: u8) -> [u8; 65] {
    let mut sig = [0u8; 65];
    sig[..32].copy_from_slice(&r.to_be_bytes::<32>());
    sig[32..64].copy_from_slice(&s.to_be_bytes::<32>());
    sig[64] = v;
    sig
}
