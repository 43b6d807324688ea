//! An online implementation of the [BlobProvider] trait.

use crate::beacon_client::{BeaconClient, BlobSidecar, DEFAULT_SECONDS_PER_SLOT};
use alloy_primitives::B256;
use async_trait::async_trait;
use facet_derive::{
    params::{BYTES_PER_BLOB, VERSIONED_HASH_VERSION_KZG},
    traits::BlobProvider,
    types::{Blob, BlockInfo, IndexedBlobHash},
};
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::warn;

/// An error for the [OnlineBlobProvider].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlobProviderError {
    /// The block timestamp precedes the beacon genesis.
    #[error("Slot derivation error: timestamp before genesis")]
    SlotDerivation,
    /// A sidecar payload had the wrong length.
    #[error("Invalid blob length: {0} bytes")]
    InvalidBlobLength(usize),
    /// The backing beacon client failed.
    #[error("Beacon client error: {0}")]
    Backend(String),
}

/// Fetches blobs over the beacon API and verifies them against their
/// versioned hashes.
///
/// A blob the beacon node no longer serves is reported as `None`, letting
/// the collector count it and continue, since derivation treats missing
/// blobs as empty carriers rather than failures.
#[derive(Debug, Clone)]
pub struct OnlineBlobProvider<B: BeaconClient> {
    /// The beacon API client.
    beacon_client: B,
    /// Beacon genesis time used for the time to slot conversion.
    genesis_time: Option<u64>,
    /// Slot interval used for the time to slot conversion.
    seconds_per_slot: Option<u64>,
}

impl<B: BeaconClient> OnlineBlobProvider<B> {
    /// Creates a new [OnlineBlobProvider]. The genesis time and slot
    /// interval are loaded from the beacon node on first use unless
    /// provided.
    pub const fn new(
        beacon_client: B,
        genesis_time: Option<u64>,
        seconds_per_slot: Option<u64>,
    ) -> Self {
        Self { beacon_client, genesis_time, seconds_per_slot }
    }

    /// Loads the beacon genesis and config spec.
    pub async fn load_configs(&mut self) -> Result<(), BlobProviderError> {
        if self.genesis_time.is_none() {
            self.genesis_time = Some(
                self.beacon_client
                    .beacon_genesis()
                    .await
                    .map_err(|e| BlobProviderError::Backend(e.to_string()))?
                    .data
                    .genesis_time,
            );
        }
        if self.seconds_per_slot.is_none() {
            let spec = self
                .beacon_client
                .config_spec()
                .await
                .map_err(|e| BlobProviderError::Backend(e.to_string()))?;
            self.seconds_per_slot =
                Some(spec.data.seconds_per_slot.unwrap_or(DEFAULT_SECONDS_PER_SLOT));
        }
        Ok(())
    }

    /// Computes the slot for the given timestamp.
    pub const fn slot(genesis: u64, slot_time: u64, timestamp: u64) -> Result<u64, BlobProviderError> {
        if timestamp < genesis {
            return Err(BlobProviderError::SlotDerivation);
        }
        Ok((timestamp - genesis) / slot_time)
    }

    /// The versioned hash of a KZG commitment:
    /// `0x01 ++ sha256(commitment)[1..]`.
    pub fn versioned_hash(commitment: &[u8]) -> B256 {
        let mut hash: [u8; 32] = Sha256::digest(commitment).into();
        hash[0] = VERSIONED_HASH_VERSION_KZG;
        B256::from(hash)
    }

    fn sidecar_to_blob(sidecar: &BlobSidecar) -> Result<Box<Blob>, BlobProviderError> {
        if sidecar.blob.len() != BYTES_PER_BLOB {
            return Err(BlobProviderError::InvalidBlobLength(sidecar.blob.len()));
        }
        Ok(Box::new(Blob::from_slice(&sidecar.blob)))
    }
}

#[async_trait]
impl<B> BlobProvider for OnlineBlobProvider<B>
where
    B: BeaconClient + Send + Sync,
{
    type Error = BlobProviderError;

    async fn get_blobs(
        &mut self,
        block: &BlockInfo,
        hashes: &[IndexedBlobHash],
    ) -> Result<Vec<Option<Box<Blob>>>, Self::Error> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }
        self.load_configs().await?;

        let genesis = self.genesis_time.expect("genesis config loaded");
        let interval = self.seconds_per_slot.expect("config spec loaded");
        let slot = Self::slot(genesis, interval, block.timestamp)?;

        let sidecars = self
            .beacon_client
            .blob_sidecars(slot)
            .await
            .map_err(|e| BlobProviderError::Backend(e.to_string()))?;

        // Match requested versioned hashes against the sidecar commitments.
        let mut out = Vec::with_capacity(hashes.len());
        for requested in hashes {
            let found = sidecars
                .iter()
                .find(|sidecar| Self::versioned_hash(&sidecar.kzg_commitment) == requested.hash);
            match found {
                Some(sidecar) => out.push(Some(Self::sidecar_to_blob(sidecar)?)),
                None => {
                    warn!(
                        target: "blob_provider",
                        slot,
                        hash = %requested.hash,
                        "blob sidecar not found"
                    );
                    out.push(None);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::beacon_client::{APIConfigResponse, APIGenesisResponse};
    use std::collections::HashMap;

    /// A [BeaconClient] serving canned responses.
    #[derive(Debug, Default, Clone)]
    struct MockBeaconClient {
        genesis: Option<APIGenesisResponse>,
        spec: Option<APIConfigResponse>,
        sidecars: HashMap<u64, Vec<BlobSidecar>>,
    }

    #[async_trait]
    impl BeaconClient for MockBeaconClient {
        type Error = String;

        async fn config_spec(&self) -> Result<APIConfigResponse, Self::Error> {
            self.spec.clone().ok_or_else(|| "config_spec not set".to_string())
        }

        async fn beacon_genesis(&self) -> Result<APIGenesisResponse, Self::Error> {
            self.genesis.clone().ok_or_else(|| "beacon_genesis not set".to_string())
        }

        async fn blob_sidecars(&self, slot: u64) -> Result<Vec<BlobSidecar>, Self::Error> {
            Ok(self.sidecars.get(&slot).cloned().unwrap_or_default())
        }
    }

    fn sidecar(index: u64, fill: u8) -> BlobSidecar {
        BlobSidecar {
            index,
            blob: vec![fill; BYTES_PER_BLOB],
            kzg_commitment: vec![fill; 48],
        }
    }

    #[test]
    fn slot_derivation() {
        assert_eq!(OnlineBlobProvider::<MockBeaconClient>::slot(10, 12, 34).unwrap(), 2);
        assert_eq!(
            OnlineBlobProvider::<MockBeaconClient>::slot(10, 12, 5),
            Err(BlobProviderError::SlotDerivation)
        );
    }

    #[test]
    fn versioned_hash_has_kzg_version_byte() {
        let hash = OnlineBlobProvider::<MockBeaconClient>::versioned_hash(&[0xaa; 48]);
        assert_eq!(hash[0], VERSIONED_HASH_VERSION_KZG);
    }

    #[tokio::test]
    async fn fetches_and_matches_blobs_by_versioned_hash() {
        let wanted = sidecar(0, 0x11);
        let hash = OnlineBlobProvider::<MockBeaconClient>::versioned_hash(&wanted.kzg_commitment);
        let client = MockBeaconClient {
            genesis: Some(APIGenesisResponse::new(10)),
            spec: Some(APIConfigResponse::new(12)),
            sidecars: HashMap::from([(2u64, vec![sidecar(1, 0x22), wanted])]),
        };
        let mut provider = OnlineBlobProvider::new(client, None, None);

        let block = BlockInfo { timestamp: 34, ..Default::default() };
        let blobs = provider
            .get_blobs(&block, &[IndexedBlobHash { index: 0, hash }])
            .await
            .unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].as_ref().unwrap()[0], 0x11);
    }

    #[tokio::test]
    async fn missing_sidecar_yields_none() {
        let client = MockBeaconClient {
            genesis: Some(APIGenesisResponse::new(10)),
            spec: Some(APIConfigResponse::new(12)),
            sidecars: HashMap::new(),
        };
        let mut provider = OnlineBlobProvider::new(client, None, None);

        let block = BlockInfo { timestamp: 34, ..Default::default() };
        let blobs = provider
            .get_blobs(&block, &[IndexedBlobHash { index: 0, hash: B256::ZERO }])
            .await
            .unwrap();
        assert_eq!(blobs, vec![None]);
    }

    #[tokio::test]
    async fn config_load_failure_is_backend_error() {
        let mut provider = OnlineBlobProvider::new(MockBeaconClient::default(), None, None);
        let block = BlockInfo { timestamp: 34, ..Default::default() };
        let result = provider
            .get_blobs(&block, &[IndexedBlobHash { index: 0, hash: B256::ZERO }])
            .await;
        assert_eq!(
            result.unwrap_err(),
            BlobProviderError::Backend("beacon_genesis not set".to_string())
        );
    }

    #[tokio::test]
    async fn empty_hash_list_short_circuits() {
        let mut provider = OnlineBlobProvider::new(MockBeaconClient::default(), None, None);
        let blobs = provider.get_blobs(&BlockInfo::default(), &[]).await.unwrap();
        assert!(blobs.is_empty());
    }
}
