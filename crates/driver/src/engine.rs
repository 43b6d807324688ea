//! A minimal execution-engine API client.
//!
//! The driver speaks the three-call block-building protocol:
//! `engine_forkchoiceUpdatedV{2,3}` with payload attributes, then
//! `engine_getPayloadV{2,3}`, then `engine_newPayloadV{2,3}`, then a final
//! fork-choice update. Version 3 is used iff a parent beacon block root is
//! available. Requests carry an HS256 JWT bearer whose `iat` claim is
//! refreshed on every call.

use alloy_primitives::{hex, Address, Bytes, B256, U256, U64};
use async_trait::async_trait;
use jsonwebtoken::{EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// An error for the engine client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The HTTP transport failed.
    #[error("Engine transport error: {0}")]
    Http(String),
    /// The engine returned a JSON-RPC error.
    #[error("Engine RPC error {code}: {message}")]
    Rpc {
        /// The JSON-RPC error code.
        code: i64,
        /// The JSON-RPC error message.
        message: String,
    },
    /// The JWT could not be produced.
    #[error("Engine auth error: {0}")]
    Auth(String),
    /// A fork-choice update did not return a payload id.
    #[error("Engine returned no payload id")]
    MissingPayloadId,
    /// The engine rejected a payload the derivation considers canonical.
    #[error("Engine rejected payload: {0}")]
    InvalidPayload(String),
}

/// The fork-choice state handed to the engine.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceState {
    /// The chain head.
    pub head_block_hash: B256,
    /// The safe head.
    pub safe_block_hash: B256,
    /// The finalized head.
    pub finalized_block_hash: B256,
}

impl ForkchoiceState {
    /// A state with all three heads at the same hash; the derivation treats
    /// every derived block as final.
    pub const fn canonical(hash: B256) -> Self {
        Self { head_block_hash: hash, safe_block_hash: hash, finalized_block_hash: hash }
    }
}

/// Payload attributes for block building. The transaction-forcing extensions
/// (`transactions`, `noTxPool`, `gasLimit`) follow the rollup convention the
/// execution engine implements.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadAttributes {
    /// The target timestamp.
    pub timestamp: U64,
    /// The randomness value, taken from the L1 mix hash.
    pub prev_randao: B256,
    /// The fee recipient; always the zero address.
    pub suggested_fee_recipient: Address,
    /// Post-Shanghai payloads carry an (empty) withdrawals list.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<serde_json::Value>>,
    /// The parent beacon block root; present iff building V3 payloads.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_beacon_block_root: Option<B256>,
    /// The forced transaction list, EIP-2718 encoded.
    pub transactions: Vec<Bytes>,
    /// The engine must not consult its mempool.
    pub no_tx_pool: bool,
    /// The block gas limit.
    pub gas_limit: U64,
}

/// An execution payload returned by `engine_getPayload` and echoed to
/// `engine_newPayload`.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPayload {
    /// The parent block hash.
    pub parent_hash: B256,
    /// The fee recipient.
    pub fee_recipient: Address,
    /// The state root.
    pub state_root: B256,
    /// The receipts root.
    pub receipts_root: B256,
    /// The logs bloom.
    pub logs_bloom: Bytes,
    /// The randomness value.
    pub prev_randao: B256,
    /// The block number.
    pub block_number: U64,
    /// The gas limit.
    pub gas_limit: U64,
    /// The gas used.
    pub gas_used: U64,
    /// The timestamp.
    pub timestamp: U64,
    /// The extra data.
    pub extra_data: Bytes,
    /// The base fee per gas.
    pub base_fee_per_gas: U256,
    /// The block hash.
    pub block_hash: B256,
    /// The transactions, EIP-2718 encoded.
    pub transactions: Vec<Bytes>,
    /// The withdrawals list; empty post-Shanghai.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub withdrawals: Option<Vec<serde_json::Value>>,
    /// Blob gas used; present post-Dencun.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blob_gas_used: Option<U64>,
    /// Excess blob gas; present post-Dencun.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excess_blob_gas: Option<U64>,
}

/// The status of a submitted payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PayloadStatusKind {
    /// The payload is valid.
    Valid,
    /// The payload is invalid.
    Invalid,
    /// The engine is syncing.
    Syncing,
    /// The payload was accepted but not validated.
    Accepted,
    /// The block hash is invalid.
    InvalidBlockHash,
}

/// The payload status envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadStatus {
    /// The status kind.
    pub status: PayloadStatusKind,
    /// The hash of the latest valid block.
    #[serde(default)]
    pub latest_valid_hash: Option<B256>,
    /// A human-readable validation error.
    #[serde(default)]
    pub validation_error: Option<String>,
}

/// The response to `engine_forkchoiceUpdated`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForkchoiceUpdated {
    /// The fork-choice status.
    pub payload_status: PayloadStatus,
    /// The id of the payload being built, when attributes were supplied.
    #[serde(default)]
    pub payload_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GetPayloadResponse {
    execution_payload: ExecutionPayload,
}

/// The minimal asynchronous interface the proposer needs from an execution
/// engine.
#[async_trait]
pub trait Engine {
    /// Sends a fork-choice update, optionally starting a build job.
    async fn forkchoice_updated(
        &mut self,
        state: ForkchoiceState,
        attributes: Option<PayloadAttributes>,
        v3: bool,
    ) -> Result<ForkchoiceUpdated, EngineError>;

    /// Retrieves a built payload by id.
    async fn get_payload(
        &mut self,
        payload_id: &str,
        v3: bool,
    ) -> Result<ExecutionPayload, EngineError>;

    /// Submits a payload for canonicalization.
    async fn new_payload(
        &mut self,
        payload: ExecutionPayload,
        parent_beacon_block_root: Option<B256>,
        v3: bool,
    ) -> Result<PayloadStatus, EngineError>;
}

#[derive(Debug, Serialize)]
struct Claims {
    iat: u64,
}

#[derive(Debug, Deserialize)]
#[serde(bound = "T: serde::de::DeserializeOwned")]
struct JsonRpcResponse<T> {
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// An authenticated HTTP client for the engine API.
#[derive(Debug)]
pub struct EngineApiClient {
    url: String,
    secret: Vec<u8>,
    client: reqwest::Client,
    next_id: u64,
}

impl EngineApiClient {
    /// Creates a client from the engine URL and the hex-encoded JWT secret.
    pub fn new(url: String, jwt_secret_hex: &str) -> Result<Self, EngineError> {
        let secret = hex::decode(jwt_secret_hex.trim_start_matches("0x"))
            .map_err(|e| EngineError::Auth(e.to_string()))?;
        Ok(Self { url, secret, client: reqwest::Client::new(), next_id: 0 })
    }

    fn bearer(&self) -> Result<String, EngineError> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| EngineError::Auth(e.to_string()))?
            .as_secs();
        jsonwebtoken::encode(
            &Header::default(),
            &Claims { iat },
            &EncodingKey::from_secret(&self.secret),
        )
        .map_err(|e| EngineError::Auth(e.to_string()))
    }

    async fn request<P: Serialize, R: serde::de::DeserializeOwned>(
        &mut self,
        method: &str,
        params: P,
    ) -> Result<R, EngineError> {
        self.next_id += 1;
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "id": self.next_id,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(&self.url)
            .bearer_auth(self.bearer()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?
            .json::<JsonRpcResponse<R>>()
            .await
            .map_err(|e| EngineError::Http(e.to_string()))?;

        if let Some(error) = response.error {
            return Err(EngineError::Rpc { code: error.code, message: error.message });
        }
        response.result.ok_or_else(|| EngineError::Http("empty RPC result".to_string()))
    }
}

#[async_trait]
impl Engine for EngineApiClient {
    async fn forkchoice_updated(
        &mut self,
        state: ForkchoiceState,
        attributes: Option<PayloadAttributes>,
        v3: bool,
    ) -> Result<ForkchoiceUpdated, EngineError> {
        let method = if v3 { "engine_forkchoiceUpdatedV3" } else { "engine_forkchoiceUpdatedV2" };
        self.request(method, (state, attributes)).await
    }

    async fn get_payload(
        &mut self,
        payload_id: &str,
        v3: bool,
    ) -> Result<ExecutionPayload, EngineError> {
        let method = if v3 { "engine_getPayloadV3" } else { "engine_getPayloadV2" };
        let response: GetPayloadResponse = self.request(method, (payload_id,)).await?;
        Ok(response.execution_payload)
    }

    async fn new_payload(
        &mut self,
        payload: ExecutionPayload,
        parent_beacon_block_root: Option<B256>,
        v3: bool,
    ) -> Result<PayloadStatus, EngineError> {
        if v3 {
            // V3 carries the expected blob hashes (always empty on L2) and
            // the parent beacon block root.
            let hashes: Vec<B256> = Vec::new();
            self.request(
                "engine_newPayloadV3",
                (payload, hashes, parent_beacon_block_root.unwrap_or_default()),
            )
            .await
        } else {
            self.request("engine_newPayloadV2", (payload,)).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_serialize_with_rollup_extensions() {
        let attrs = PayloadAttributes {
            timestamp: U64::from(1700000000u64),
            prev_randao: B256::ZERO,
            suggested_fee_recipient: Address::ZERO,
            withdrawals: Some(vec![]),
            parent_beacon_block_root: None,
            transactions: vec![Bytes::from(vec![0x7e, 0x01])],
            no_tx_pool: true,
            gas_limit: U64::from(120_000_000u64),
        };
        let value = serde_json::to_value(&attrs).unwrap();
        assert_eq!(value["noTxPool"], serde_json::json!(true));
        assert_eq!(value["gasLimit"], serde_json::json!("0x7270e00"));
        assert_eq!(value["transactions"][0], serde_json::json!("0x7e01"));
        assert!(value.get("parentBeaconBlockRoot").is_none());
    }

    #[test]
    fn payload_status_parses_engine_shapes() {
        let status: PayloadStatus = serde_json::from_value(serde_json::json!({
            "status": "VALID",
            "latestValidHash": "0x1111111111111111111111111111111111111111111111111111111111111111"
        }))
        .unwrap();
        assert_eq!(status.status, PayloadStatusKind::Valid);
        assert!(status.latest_valid_hash.is_some());

        let updated: ForkchoiceUpdated = serde_json::from_value(serde_json::json!({
            "payloadStatus": { "status": "SYNCING", "latestValidHash": null, "validationError": null },
            "payloadId": "0x0000000000000001"
        }))
        .unwrap();
        assert_eq!(updated.payload_status.status, PayloadStatusKind::Syncing);
        assert_eq!(updated.payload_id.as_deref(), Some("0x0000000000000001"));
    }

    #[test]
    fn payload_roundtrips_through_json() {
        let payload = ExecutionPayload {
            block_number: U64::from(7u64),
            block_hash: B256::repeat_byte(0x42),
            transactions: vec![Bytes::from(vec![0x7e])],
            withdrawals: Some(vec![]),
            ..Default::default()
        };
        let json = serde_json::to_string(&payload).unwrap();
        let back: ExecutionPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
