//! secp256k1 signer recovery for priority batches.

use crate::errors::SignatureError;
use alloy_primitives::{keccak256, Address, B256};
use k256::ecdsa::{RecoveryId, Signature as EcdsaSignature, VerifyingKey};

/// Recovers the signing address from a 32-byte message hash and a 65-byte
/// `r ++ s ++ v` signature.
///
/// `v` may be `0`/`1` or the legacy `27`/`28`; any other value is rejected.
/// Never panics on malformed input.
pub fn recover_signer(message_hash: B256, signature: &[u8; 65]) -> Result<Address, SignatureError> {
    let v = signature[64];
    let recovery_id = match v {
        0 | 1 => v,
        27 | 28 => v - 27,
        other => return Err(SignatureError::InvalidV(other)),
    };
    let recovery_id = RecoveryId::from_byte(recovery_id).ok_or(SignatureError::Recovery)?;

    let signature =
        EcdsaSignature::from_slice(&signature[..64]).map_err(|_| SignatureError::Recovery)?;
    let key = VerifyingKey::recover_from_prehash(message_hash.as_slice(), &signature, recovery_id)
        .map_err(|_| SignatureError::Recovery)?;

    Ok(address_from_key(&key))
}

/// Derives the 20-byte address of an uncompressed public key.
pub(crate) fn address_from_key(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    // Skip the 0x04 uncompressed-point tag.
    let hash = keccak256(&encoded.as_bytes()[1..]);
    Address::from_slice(&hash[12..])
}
