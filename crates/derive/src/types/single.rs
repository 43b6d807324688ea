//! The legacy single-transaction carrier (Facet V1 surface).

use crate::{
    errors::DepositDecodingError,
    params::DEPOSIT_TX_TYPE,
};
use alloy_primitives::{Address, Bytes, B256, U256};
use alloy_rlp::{Decodable, Header};

/// Where a Facet single was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SingleSource {
    /// Calldata of a transaction sent to the Facet inbox.
    Calldata,
    /// Data of a single-topic inbox log.
    Event,
}

/// A single Facet transaction carried outside the batch format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacetSingle {
    /// Where the payload was found.
    pub source: SingleSource,
    /// The index of the carrier L1 transaction.
    pub l1_tx_index: u64,
    /// The hash of the carrier L1 transaction.
    pub l1_tx_hash: B256,
    /// The L1 sender (calldata) or the emitting contract (event).
    pub from: Address,
    /// The typed payload; first byte is the Facet type tag.
    pub payload: Bytes,
}

/// The decoded body of a Facet single payload:
/// `0x7E ++ rlp([chain_id, to, value, max_fee_per_gas, gas_limit, data])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinglePayload {
    /// The Facet chain id the sender targeted.
    pub chain_id: u64,
    /// The recipient; `None` is a contract creation.
    pub to: Option<Address>,
    /// The value to transfer.
    pub value: U256,
    /// The maximum fee per gas the sender will pay.
    pub max_fee_per_gas: u128,
    /// The gas limit.
    pub gas_limit: u64,
    /// The calldata.
    pub data: Bytes,
}

impl SinglePayload {
    /// Decodes a single payload from its typed byte form.
    pub fn decode(payload: &[u8]) -> Result<Self, DepositDecodingError> {
        let Some((&tag, mut body)) = payload.split_first() else {
            return Err(DepositDecodingError::WrongType);
        };
        if tag != DEPOSIT_TX_TYPE {
            return Err(DepositDecodingError::WrongType);
        }

        let buf = &mut body;
        let header = Header::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        if !header.list || header.payload_length != buf.len() {
            return Err(DepositDecodingError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
        }

        let chain_id = u64::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        let to = decode_to(buf)?;
        let value = U256::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        let max_fee_per_gas = u128::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        let gas_limit = u64::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        let data = Bytes::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
        if !buf.is_empty() {
            return Err(DepositDecodingError::InvalidRlp(alloy_rlp::Error::UnexpectedLength));
        }

        Ok(Self { chain_id, to, value, max_fee_per_gas, gas_limit, data })
    }

    /// Encodes the payload back into its typed byte form.
    pub fn encode(&self) -> Bytes {
        let mut fields = Vec::new();
        alloy_rlp::Encodable::encode(&self.chain_id, &mut fields);
        match self.to {
            Some(addr) => alloy_rlp::Encodable::encode(&addr, &mut fields),
            None => fields.push(alloy_rlp::EMPTY_STRING_CODE),
        }
        alloy_rlp::Encodable::encode(&self.value, &mut fields);
        alloy_rlp::Encodable::encode(&self.max_fee_per_gas, &mut fields);
        alloy_rlp::Encodable::encode(&self.gas_limit, &mut fields);
        alloy_rlp::Encodable::encode(&self.data, &mut fields);

        let mut out = Vec::with_capacity(fields.len() + 4);
        out.push(DEPOSIT_TX_TYPE);
        Header { list: true, payload_length: fields.len() }.encode(&mut out);
        out.extend_from_slice(&fields);
        out.into()
    }
}

/// Decodes an RLP `to` field that is either empty (create) or a 20-byte
/// address.
pub(crate) fn decode_to(buf: &mut &[u8]) -> Result<Option<Address>, DepositDecodingError> {
    let raw = Bytes::decode(buf).map_err(DepositDecodingError::InvalidRlp)?;
    match raw.len() {
        0 => Ok(None),
        20 => Ok(Some(Address::from_slice(&raw))),
        _ => Err(DepositDecodingError::InvalidAttributes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    #[test]
    fn single_payload_roundtrip() {
        let payload = SinglePayload {
            chain_id: 0xface7,
            to: Some(address!("1111111111111111111111111111111111111111")),
            value: U256::from(42u64),
            max_fee_per_gas: 1_000_000_000,
            gas_limit: 500_000,
            data: Bytes::from(vec![0xde, 0xad]),
        };
        let encoded = payload.encode();
        assert_eq!(encoded[0], DEPOSIT_TX_TYPE);
        assert_eq!(SinglePayload::decode(&encoded).unwrap(), payload);
    }

    #[test]
    fn single_payload_create_roundtrip() {
        let payload = SinglePayload {
            chain_id: 0xface7a,
            to: None,
            value: U256::ZERO,
            max_fee_per_gas: 0,
            gas_limit: 1_000_000,
            data: Bytes::from(vec![0x60, 0x80]),
        };
        assert_eq!(SinglePayload::decode(&payload.encode()).unwrap(), payload);
    }

    #[test]
    fn single_payload_rejects_wrong_tag() {
        let mut encoded = SinglePayload {
            chain_id: 1,
            to: None,
            value: U256::ZERO,
            max_fee_per_gas: 0,
            gas_limit: 0,
            data: Bytes::new(),
        }
        .encode()
        .to_vec();
        encoded[0] = 0x02;
        assert!(matches!(
            SinglePayload::decode(&encoded),
            Err(DepositDecodingError::WrongType)
        ));
    }
}
