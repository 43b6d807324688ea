//! Error types for the derivation core.
//!
//! Parse and signature failures are recoverable: the offending bytes are
//! skipped and scanning continues. Only provider failures surface out of the
//! collector.

use thiserror::Error;

/// An error decoding an EIP-4844 blob into its byte payload.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BlobDecodingError {
    /// A field element's boundary byte was nonzero.
    #[error("Malformed field element")]
    MalformedFieldElement,
    /// The blob ended without a terminator byte.
    #[error("Missing payload terminator")]
    MissingTerminator,
    /// Bytes after the terminator were not all zero.
    #[error("Non-zero padding after terminator")]
    NonZeroPadding,
    /// The payload handed to the encoder exceeds blob capacity.
    #[error("Payload too long for one blob: {0} bytes")]
    PayloadTooLong(usize),
}

/// An error parsing a wire batch. All variants are recoverable; the scanner
/// advances and keeps looking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchParseError {
    /// Fewer than header-size bytes remain after the magic.
    #[error("Truncated batch header")]
    TruncatedHeader,
    /// The header chain id does not match the configured chain.
    #[error("Wrong chain id: expected {expected}, got {got}")]
    WrongChainId {
        /// The configured chain id.
        expected: u64,
        /// The chain id found in the header.
        got: u64,
    },
    /// The header version byte is not the supported version.
    #[error("Unsupported batch version: {0}")]
    WrongVersion(u8),
    /// The role byte is neither permissionless nor priority.
    #[error("Unknown batch role: {0}")]
    BadRole(u8),
    /// The claimed payload length exceeds the configured cap.
    #[error("Batch length {0} over limit")]
    BadLength(u32),
    /// The payload (or signature) extends past the end of the input.
    #[error("Batch payload truncated")]
    TruncatedPayload,
    /// The transaction list is not a well-formed RLP list of byte strings.
    #[error("Invalid batch RLP: {0}")]
    InvalidRlp(alloy_rlp::Error),
    /// The transaction list has more elements than allowed.
    #[error("Too many transactions in batch: {0}")]
    TooManyTxs(usize),
    /// A priority batch signature failed to recover an address.
    #[error("Bad batch signature")]
    BadSignature,
}

/// An error recovering the signer of a 65-byte `r ++ s ++ v` signature.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The `v` byte is not one of `{0, 1, 27, 28}`.
    #[error("Invalid recovery byte: {0}")]
    InvalidV(u8),
    /// The signature scalars did not recover a public key.
    #[error("Signature recovery failed")]
    Recovery,
}

/// An error parsing an EIP-2718 transaction for its metadata.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TxParseError {
    /// The input is empty.
    #[error("Empty transaction bytes")]
    Empty,
    /// The RLP structure is invalid for the detected type.
    #[error("Invalid transaction RLP: {0}")]
    InvalidRlp(alloy_rlp::Error),
    /// The `to` field is neither empty nor a 20-byte address.
    #[error("Invalid to field")]
    InvalidTo,
    /// The `v` value is inconsistent with any known signing scheme.
    #[error("Invalid signature v value")]
    InvalidV,
    /// Sender recovery failed.
    #[error(transparent)]
    Signature(#[from] SignatureError),
}

/// An error collecting payloads for one L1 block.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollectError {
    /// The blob provider failed for a reason other than a missing blob.
    #[error("Blob provider error: {0}")]
    BlobProvider(String),
}

/// An error decoding a Facet single payload or deposit envelope.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DepositDecodingError {
    /// The type tag is not a Facet deposit type.
    #[error("Not a Facet deposit payload")]
    WrongType,
    /// The RLP body is malformed.
    #[error("Invalid deposit RLP: {0}")]
    InvalidRlp(alloy_rlp::Error),
    /// The embedded chain id does not match the configured chain.
    #[error("Wrong chain id in payload: {0}")]
    WrongChainId(u64),
    /// The attributes calldata is malformed.
    #[error("Invalid attributes calldata")]
    InvalidAttributes,
}
