//! EIP-4844 blob payload encoding and decoding.
//!
//! Each of the 4096 field elements carries 31 data bytes behind a mandatory
//! zero boundary byte (canonical form). The logical payload ends at a single
//! `0x80` terminator; everything after it is zero padding. Both directions
//! are pure and deterministic.

use crate::{
    errors::BlobDecodingError,
    params::{FIELD_ELEMENTS_PER_BLOB, MAX_BLOB_PAYLOAD},
    types::Blob,
};
use alloy_primitives::Bytes;

/// The payload terminator byte.
const TERMINATOR: u8 = 0x80;

/// Decodes a blob into its logical byte payload.
///
/// The payload boundary is the last `0x80` in the data stream; the encoder
/// writes exactly one after the payload, so any earlier `0x80` is payload.
pub fn decode_blob(blob: &Blob) -> Result<Bytes, BlobDecodingError> {
    let mut data = Vec::with_capacity(FIELD_ELEMENTS_PER_BLOB * 31);
    for element in blob.chunks_exact(32) {
        if element[0] != 0 {
            return Err(BlobDecodingError::MalformedFieldElement);
        }
        data.extend_from_slice(&element[1..]);
    }

    let terminator = data
        .iter()
        .rposition(|b| *b == TERMINATOR)
        .ok_or(BlobDecodingError::MissingTerminator)?;
    if data[terminator + 1..].iter().any(|b| *b != 0) {
        return Err(BlobDecodingError::NonZeroPadding);
    }

    data.truncate(terminator);
    Ok(data.into())
}

/// Encodes a byte payload into a blob: the payload, one terminator, zero
/// padding, and a zero boundary byte at every field-element boundary.
pub fn encode_blob(payload: &[u8]) -> Result<Blob, BlobDecodingError> {
    if payload.len() > MAX_BLOB_PAYLOAD {
        return Err(BlobDecodingError::PayloadTooLong(payload.len()));
    }

    let mut data = vec![0u8; FIELD_ELEMENTS_PER_BLOB * 31];
    data[..payload.len()].copy_from_slice(payload);
    data[payload.len()] = TERMINATOR;

    let mut blob = Blob::default();
    for (element, chunk) in blob.chunks_exact_mut(32).zip(data.chunks_exact(31)) {
        element[1..].copy_from_slice(chunk);
    }
    Ok(blob)
}
