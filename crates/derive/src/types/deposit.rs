//! The Facet deposit-style transaction envelope.
//!
//! Deposit transactions are initiated on L1 (or synthesized by the
//! derivation) and executed on L2. They are unsigned; the envelope is
//! `type ++ rlp([source_hash, from, to, mint, value, gas_limit,
//! is_system_tx, input])`.

use crate::{
    errors::DepositDecodingError,
    params::{DEPOSIT_TX_TYPE, UPGRADE_TX_TYPE},
    types::single::decode_to,
};
use alloy_primitives::{keccak256, Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Encodable, Header, EMPTY_STRING_CODE};

/// A Facet deposit transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FacetDeposit {
    /// The EIP-2718 type tag, [DEPOSIT_TX_TYPE] or [UPGRADE_TX_TYPE].
    pub tx_type: u8,
    /// Hash that uniquely identifies the source of the deposit.
    pub source_hash: B256,
    /// The sender on L2.
    pub from: Address,
    /// The recipient; `None` is a contract creation.
    pub to: Option<Address>,
    /// The native value minted to `from` on L2.
    pub mint: U256,
    /// The value transferred to `to`.
    pub value: U256,
    /// The L2 gas limit.
    pub gas_limit: u64,
    /// Whether this transaction is exempt from the L2 gas accounting.
    pub is_system_tx: bool,
    /// Calldata, or init code for creations.
    pub input: Bytes,
}

impl FacetDeposit {
    /// Encodes the transaction's RLP fields, without the type byte or list
    /// header.
    fn encode_fields(&self, out: &mut Vec<u8>) {
        self.source_hash.encode(out);
        self.from.encode(out);
        match self.to {
            Some(addr) => addr.encode(out),
            None => out.push(EMPTY_STRING_CODE),
        }
        self.mint.encode(out);
        self.value.encode(out);
        self.gas_limit.encode(out);
        self.is_system_tx.encode(out);
        self.input.encode(out);
    }

    /// Encodes the full typed envelope.
    pub fn encode(&self) -> Bytes {
        let mut fields = Vec::new();
        self.encode_fields(&mut fields);

        let mut out = Vec::with_capacity(fields.len() + 4);
        out.push(self.tx_type);
        Header { list: true, payload_length: fields.len() }.encode(&mut out);
        out.extend_from_slice(&fields);
        out.into()
    }

    /// The transaction hash: keccak256 of the typed envelope.
    pub fn tx_hash(&self) -> B256 {
        keccak256(self.encode())
    }

    /// Decodes a typed envelope.
    pub fn decode(payload: &[u8]) -> Result<Self, DepositDecodingError> {
        let Some((&tx_type, mut body)) = payload.split_first() else {
            return Err(DepositDecodingError::WrongType);
        };
        if tx_type != DEPOSIT_TX_TYPE && tx_type != UPGRADE_TX_TYPE {
            return Err(DepositDecodingError::WrongType);
        }

        let buf = &mut body;
        let header = Header::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        if !header.list || header.payload_length != buf.len() {
            return Err(DepositDecodingError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
        }

        let decoded = Self {
            tx_type,
            source_hash: B256::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            from: Address::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            to: decode_to(buf)?,
            mint: U256::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            value: U256::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            gas_limit: u64::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            is_system_tx: bool::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
            input: Bytes::decode(buf).map_err(DepositDecodingError::InvalidRlp)?,
        };
        if !buf.is_empty() {
            return Err(DepositDecodingError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
        }
        Ok(decoded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{address, b256};

    fn sample() -> FacetDeposit {
        FacetDeposit {
            tx_type: DEPOSIT_TX_TYPE,
            source_hash: b256!("1111111111111111111111111111111111111111111111111111111111111111"),
            from: address!("2222222222222222222222222222222222222222"),
            to: Some(address!("3333333333333333333333333333333333333333")),
            mint: U256::from(1_000_000u64),
            value: U256::from(7u64),
            gas_limit: 500_000,
            is_system_tx: false,
            input: Bytes::from(vec![0xab, 0xcd]),
        }
    }

    #[test]
    fn deposit_roundtrip() {
        let tx = sample();
        let encoded = tx.encode();
        assert_eq!(encoded[0], DEPOSIT_TX_TYPE);
        assert_eq!(FacetDeposit::decode(&encoded).unwrap(), tx);
    }

    #[test]
    fn upgrade_type_roundtrip() {
        let tx = FacetDeposit { tx_type: UPGRADE_TX_TYPE, to: None, ..sample() };
        assert_eq!(FacetDeposit::decode(&tx.encode()).unwrap(), tx);
    }

    #[test]
    fn tx_hash_is_stable() {
        let tx = sample();
        assert_eq!(tx.tx_hash(), tx.tx_hash());
        let other = FacetDeposit { mint: U256::from(2u64), ..sample() };
        assert_ne!(tx.tx_hash(), other.tx_hash());
    }

    #[test]
    fn decode_rejects_unknown_type() {
        let mut encoded = sample().encode().to_vec();
        encoded[0] = 0x02;
        assert!(matches!(
            FacetDeposit::decode(&encoded),
            Err(DepositDecodingError::WrongType)
        ));
    }
}
