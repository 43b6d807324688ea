//! A thin client for the beacon-chain API.

use alloy_primitives::hex;
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Deserializer};

/// The config spec method.
const SPEC_METHOD: &str = "eth/v1/config/spec";

/// The beacon genesis method.
const GENESIS_METHOD: &str = "eth/v1/beacon/genesis";

/// The blob sidecars method prefix.
const SIDECARS_METHOD_PREFIX: &str = "eth/v1/beacon/blob_sidecars";

/// The fallback slot interval when the spec omits `SECONDS_PER_SLOT`.
pub(crate) const DEFAULT_SECONDS_PER_SLOT: u64 = 12;

/// A reduced genesis response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIGenesisResponse {
    /// The data payload.
    pub data: ReducedGenesisData,
}

/// The genesis fields the derivation needs.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReducedGenesisData {
    /// The genesis time. The beacon API serves decimal strings.
    #[serde(deserialize_with = "quantity_string")]
    pub genesis_time: u64,
}

/// A reduced config spec response.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct APIConfigResponse {
    /// The data payload.
    pub data: ReducedConfigData,
}

/// The spec fields the derivation needs.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ReducedConfigData {
    /// The seconds per slot; absent on some providers.
    #[serde(rename = "SECONDS_PER_SLOT", default)]
    #[serde(deserialize_with = "optional_quantity")]
    pub seconds_per_slot: Option<u64>,
}

impl APIConfigResponse {
    /// Creates a new config response.
    pub const fn new(seconds_per_slot: u64) -> Self {
        Self { data: ReducedConfigData { seconds_per_slot: Some(seconds_per_slot) } }
    }
}

impl APIGenesisResponse {
    /// Creates a new genesis response.
    pub const fn new(genesis_time: u64) -> Self {
        Self { data: ReducedGenesisData { genesis_time } }
    }
}

/// One blob sidecar as served by the beacon API.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct BlobSidecar {
    /// The blob index within the block.
    #[serde(deserialize_with = "quantity_string")]
    pub index: u64,
    /// The blob payload, hex- or base64-encoded.
    #[serde(deserialize_with = "hex_or_base64")]
    pub blob: Vec<u8>,
    /// The KZG commitment, hex-encoded.
    #[serde(deserialize_with = "hex_bytes")]
    pub kzg_commitment: Vec<u8>,
}

#[derive(Debug, serde::Deserialize)]
struct SidecarsResponse {
    data: Vec<BlobSidecar>,
}

/// The [BeaconClient] is a thin wrapper around the beacon API.
#[async_trait]
pub trait BeaconClient {
    /// The error type for [BeaconClient] implementations.
    type Error: core::fmt::Display + Send + Sync;

    /// Returns the config spec.
    async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error>;

    /// Returns the beacon genesis.
    async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error>;

    /// Fetches all blob sidecars confirmed in the given slot.
    async fn blob_sidecars(&self, slot: u64) -> Result<Vec<BlobSidecar>, Self::Error>;
}

/// An online implementation of the [BeaconClient] trait.
#[derive(Debug, Clone)]
pub struct OnlineBeaconClient {
    /// The base URL of the beacon API.
    base: String,
    /// An optional bearer token.
    api_key: Option<String>,
    /// The inner reqwest client.
    inner: Client,
}

impl OnlineBeaconClient {
    /// Creates a new [OnlineBeaconClient] from the provided base URL.
    pub fn new_http(mut base: String, api_key: Option<String>) -> Self {
        // If base ends with a slash, remove it
        if base.ends_with('/') {
            base.remove(base.len() - 1);
        }
        Self { base, api_key, inner: Client::new() }
    }

    fn get(&self, path: String) -> reqwest::RequestBuilder {
        let request = self.inner.get(format!("{}/{}", self.base, path));
        match &self.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl BeaconClient for OnlineBeaconClient {
    type Error = reqwest::Error;

    async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error> {
        self.get(SPEC_METHOD.to_string()).send().await?.json().await
    }

    async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error> {
        self.get(GENESIS_METHOD.to_string()).send().await?.json().await
    }

    async fn blob_sidecars(&self, slot: u64) -> Result<Vec<BlobSidecar>, Self::Error> {
        let response = self
            .get(format!("{SIDECARS_METHOD_PREFIX}/{slot}"))
            .send()
            .await?
            .json::<SidecarsResponse>()
            .await?;
        Ok(response.data)
    }
}

/// Deserializes a beacon-API decimal-string quantity.
fn quantity_string<'de, D: Deserializer<'de>>(de: D) -> Result<u64, D::Error> {
    let raw = String::deserialize(de)?;
    raw.parse().map_err(serde::de::Error::custom)
}

/// Deserializes a decimal-string quantity that may be absent.
fn optional_quantity<'de, D: Deserializer<'de>>(de: D) -> Result<Option<u64>, D::Error> {
    let raw: Option<String> = Option::deserialize(de)?;
    match raw {
        Some(value) => value.parse().map(Some).map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Deserializes bytes that arrive either `0x`-hex or base64 encoded.
fn hex_or_base64<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(de)?;
    if let Some(stripped) = raw.strip_prefix("0x") {
        return hex::decode(stripped).map_err(serde::de::Error::custom);
    }
    base64::engine::general_purpose::STANDARD
        .decode(raw.as_bytes())
        .map_err(serde::de::Error::custom)
}

/// Deserializes `0x`-hex bytes.
fn hex_bytes<'de, D: Deserializer<'de>>(de: D) -> Result<Vec<u8>, D::Error> {
    let raw = String::deserialize(de)?;
    hex::decode(raw.trim_start_matches("0x")).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_accepts_hex_blob() {
        let sidecar: BlobSidecar = serde_json::from_value(serde_json::json!({
            "index": "2",
            "blob": "0xdeadbeef",
            "kzg_commitment": "0x1234"
        }))
        .unwrap();
        assert_eq!(sidecar.index, 2);
        assert_eq!(sidecar.blob, vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(sidecar.kzg_commitment, vec![0x12, 0x34]);
    }

    #[test]
    fn sidecar_accepts_base64_blob() {
        let sidecar: BlobSidecar = serde_json::from_value(serde_json::json!({
            "index": "0",
            "blob": "3q2+7w==",
            "kzg_commitment": "0x1234"
        }))
        .unwrap();
        assert_eq!(sidecar.blob, vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn spec_without_seconds_per_slot_is_accepted() {
        let spec: APIConfigResponse =
            serde_json::from_value(serde_json::json!({ "data": {} })).unwrap();
        assert_eq!(spec.data.seconds_per_slot, None);

        let spec: APIConfigResponse = serde_json::from_value(serde_json::json!({
            "data": { "SECONDS_PER_SLOT": "12" }
        }))
        .unwrap();
        assert_eq!(spec.data.seconds_per_slot, Some(12));
    }
}
