//! The L1-attributes system transaction.
//!
//! Every L2 block opens with an unsigned deposit from the system address to
//! the L1-block predeploy. Its calldata pins the L1 context and the carried
//! issuance state in a fixed-offset word layout, so the encoding is
//! bit-for-bit stable across implementations.

use crate::{
    errors::DepositDecodingError,
    mint::MintState,
    params::{
        DEPOSIT_TX_TYPE, L1_BLOCK_PREDEPLOY, SOURCE_DOMAIN_ATTRIBUTES, SYSTEM_ADDRESS,
        SYSTEM_TX_GAS_LIMIT,
    },
    types::FacetDeposit,
};
use alloy_primitives::{keccak256, Bytes, B256, U256};

/// The 4-byte selector of the predeploy's attributes setter.
pub const L1_ATTRIBUTES_SELECTOR: [u8; 4] = [0x01, 0x5d, 0x8e, 0xb9];

/// The number of 32-byte words following the selector.
const WORDS: usize = 10;

/// The L1 context and issuance state embedded into each L2 block.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct L1Attributes {
    /// The source L1 block number.
    pub number: u64,
    /// The source L1 block timestamp.
    pub timestamp: u64,
    /// The source L1 base fee per gas.
    pub base_fee: u128,
    /// The source L1 block hash.
    pub hash: B256,
    /// The position of this L2 block among those sharing the same source L1
    /// block (filler blocks increment it).
    pub sequence_number: u64,
    /// The issuance state after processing this block.
    pub mint: MintState,
}

impl L1Attributes {
    /// Encodes the attributes calldata: selector plus ten words.
    pub fn encode_calldata(&self) -> Bytes {
        let mut out = Vec::with_capacity(4 + WORDS * 32);
        out.extend_from_slice(&L1_ATTRIBUTES_SELECTOR);
        push_word(&mut out, U256::from(self.number));
        push_word(&mut out, U256::from(self.timestamp));
        push_word(&mut out, U256::from(self.base_fee));
        out.extend_from_slice(self.hash.as_slice());
        push_word(&mut out, U256::from(self.sequence_number));
        push_word(&mut out, U256::from(self.mint.mint_rate));
        push_word(&mut out, self.mint.total_minted);
        push_word(&mut out, U256::from(self.mint.period_start_block));
        push_word(&mut out, self.mint.period_minted);
        push_word(&mut out, self.mint.initial_target_per_period);
        out.into()
    }

    /// Decodes attributes calldata produced by [Self::encode_calldata].
    pub fn decode_calldata(data: &[u8]) -> Result<Self, DepositDecodingError> {
        if data.len() != 4 + WORDS * 32 || data[..4] != L1_ATTRIBUTES_SELECTOR {
            return Err(DepositDecodingError::InvalidAttributes);
        }
        let word = |i: usize| U256::from_be_slice(&data[4 + i * 32..4 + (i + 1) * 32]);
        let word_u64 = |i: usize| -> Result<u64, DepositDecodingError> {
            word(i).try_into().map_err(|_| DepositDecodingError::InvalidAttributes)
        };
        let word_u128 = |i: usize| -> Result<u128, DepositDecodingError> {
            word(i).try_into().map_err(|_| DepositDecodingError::InvalidAttributes)
        };

        Ok(Self {
            number: word_u64(0)?,
            timestamp: word_u64(1)?,
            base_fee: word_u128(2)?,
            hash: B256::from_slice(&data[4 + 3 * 32..4 + 4 * 32]),
            sequence_number: word_u64(4)?,
            mint: MintState {
                mint_rate: word_u128(5)?,
                total_minted: word(6),
                period_start_block: word_u64(7)?,
                period_minted: word(8),
                initial_target_per_period: word(9),
            },
        })
    }

    /// Builds the system deposit carrying these attributes.
    pub fn to_deposit(&self) -> FacetDeposit {
        FacetDeposit {
            tx_type: DEPOSIT_TX_TYPE,
            source_hash: self.source_hash(),
            from: SYSTEM_ADDRESS,
            to: Some(L1_BLOCK_PREDEPLOY),
            mint: U256::ZERO,
            value: U256::ZERO,
            gas_limit: SYSTEM_TX_GAS_LIMIT,
            is_system_tx: true,
            input: self.encode_calldata(),
        }
    }

    /// The deposit source hash: a domain byte over the L1 block hash and the
    /// sequence number.
    pub fn source_hash(&self) -> B256 {
        let mut preimage = [0u8; 1 + 32 + 8];
        preimage[0] = SOURCE_DOMAIN_ATTRIBUTES;
        preimage[1..33].copy_from_slice(self.hash.as_slice());
        preimage[33..].copy_from_slice(&self.sequence_number.to_be_bytes());
        keccak256(preimage)
    }
}

fn push_word(out: &mut Vec<u8>, value: U256) {
    out.extend_from_slice(&value.to_be_bytes::<32>());
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::b256;

    fn sample() -> L1Attributes {
        L1Attributes {
            number: 21_300_007,
            timestamp: 1_730_000_000,
            base_fee: 18_000_000_000,
            hash: b256!("9999999999999999999999999999999999999999999999999999999999999999"),
            sequence_number: 2,
            mint: MintState {
                total_minted: U256::from(123_456_789u64),
                period_start_block: 21_299_900,
                period_minted: U256::from(55u64),
                mint_rate: 777,
                initial_target_per_period: U256::from(1_000_000u64),
            },
        }
    }

    #[test]
    fn calldata_roundtrip() {
        let attrs = sample();
        let encoded = attrs.encode_calldata();
        assert_eq!(encoded.len(), 4 + WORDS * 32);
        assert_eq!(L1Attributes::decode_calldata(&encoded).unwrap(), attrs);
    }

    #[test]
    fn decode_rejects_short_or_misselected_calldata() {
        let attrs = sample();
        let encoded = attrs.encode_calldata();
        assert!(L1Attributes::decode_calldata(&encoded[..encoded.len() - 1]).is_err());

        let mut wrong = encoded.to_vec();
        wrong[0] ^= 0xff;
        assert!(L1Attributes::decode_calldata(&wrong).is_err());
    }

    #[test]
    fn deposit_is_system_shaped() {
        let deposit = sample().to_deposit();
        assert_eq!(deposit.from, SYSTEM_ADDRESS);
        assert_eq!(deposit.to, Some(L1_BLOCK_PREDEPLOY));
        assert!(deposit.is_system_tx);
        assert_eq!(deposit.mint, U256::ZERO);
    }

    #[test]
    fn sequence_number_distinguishes_source_hashes() {
        let attrs = sample();
        let mut filler = attrs.clone();
        filler.sequence_number += 1;
        assert_ne!(attrs.source_hash(), filler.source_hash());
    }
}
