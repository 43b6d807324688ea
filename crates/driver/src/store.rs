//! Persistence for derived blocks.
//!
//! Two keyed entities: L1 headers (by block number) and L2 block records (by
//! block number, carrying the ordered transaction payloads and the embedded
//! issuance state). Writes are append-only; a detected L1 reorg deletes L2
//! blocks derived from the orphaned range before re-deriving.

use alloy_primitives::Bytes;
use facet_derive::{mint::MintState, types::{BlockInfo, L1Header}};
use rocksdb::{Options, DB};
use std::path::PathBuf;
use thiserror::Error;

/// An error for [BlockStore] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The underlying database failed.
    #[error("Database error: {0}")]
    Database(String),
    /// A stored record could not be decoded.
    #[error("Corrupt record: {0}")]
    Codec(String),
}

/// A persisted L2 block.
#[derive(Debug, Default, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct L2BlockRecord {
    /// The block identity.
    pub info: BlockInfo,
    /// The L1 block this block was derived from.
    pub source_l1_number: u64,
    /// The position among blocks sharing the same source L1 block.
    pub sequence_number: u64,
    /// The ordered transaction payloads, system transactions first.
    pub transactions: Vec<Bytes>,
    /// The issuance state after this block.
    pub mint: MintState,
}

/// Storage for derived L1 and L2 block records.
pub trait BlockStore {
    /// Reads the stored L1 header for a block number.
    fn l1_header(&self, number: u64) -> Result<Option<L1Header>, StoreError>;

    /// Writes an L1 header.
    fn put_l1_header(&mut self, header: &L1Header) -> Result<(), StoreError>;

    /// Deletes L1 headers at or above the given number.
    fn delete_l1_from(&mut self, number: u64) -> Result<(), StoreError>;

    /// Reads an L2 block record.
    fn l2_block(&self, number: u64) -> Result<Option<L2BlockRecord>, StoreError>;

    /// The highest persisted L2 block number.
    fn l2_head(&self) -> Result<Option<u64>, StoreError>;

    /// Writes an L2 block record and advances the head.
    fn put_l2_block(&mut self, record: &L2BlockRecord) -> Result<(), StoreError>;

    /// Deletes every L2 block whose source L1 number is at or above the
    /// given number, returning how many were removed.
    fn delete_l2_from_source(&mut self, l1_number: u64) -> Result<usize, StoreError>;
}

const L1_PREFIX: &[u8] = b"l1:";
const L2_PREFIX: &[u8] = b"l2:";
const L2_HEAD_KEY: &[u8] = b"meta:l2_head";

fn l1_key(number: u64) -> Vec<u8> {
    [L1_PREFIX, number.to_be_bytes().as_slice()].concat()
}

fn l2_key(number: u64) -> Vec<u8> {
    [L2_PREFIX, number.to_be_bytes().as_slice()].concat()
}

/// A [BlockStore] over RocksDB.
#[derive(Debug)]
pub struct RocksBlockStore {
    db: DB,
}

impl RocksBlockStore {
    /// Opens (or creates) the store at the given directory.
    pub fn open(path: PathBuf) -> Result<Self, StoreError> {
        let mut options = Options::default();
        options.set_compression_type(rocksdb::DBCompressionType::Snappy);
        options.create_if_missing(true);
        let db = DB::open(&options, path).map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(Self { db })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, key: &[u8]) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.db.get(key).map_err(|e| StoreError::Database(e.to_string()))? else {
            return Ok(None);
        };
        serde_json::from_slice(&raw).map(Some).map_err(|e| StoreError::Codec(e.to_string()))
    }

    fn put_json<T: serde::Serialize>(&mut self, key: &[u8], value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(value).map_err(|e| StoreError::Codec(e.to_string()))?;
        self.db.put(key, raw).map_err(|e| StoreError::Database(e.to_string()))
    }
}

impl BlockStore for RocksBlockStore {
    fn l1_header(&self, number: u64) -> Result<Option<L1Header>, StoreError> {
        self.get_json(&l1_key(number))
    }

    fn put_l1_header(&mut self, header: &L1Header) -> Result<(), StoreError> {
        self.put_json(&l1_key(header.number), header)
    }

    fn delete_l1_from(&mut self, number: u64) -> Result<(), StoreError> {
        let mut current = number;
        while self.l1_header(current)?.is_some() {
            self.db
                .delete(l1_key(current))
                .map_err(|e| StoreError::Database(e.to_string()))?;
            current += 1;
        }
        Ok(())
    }

    fn l2_block(&self, number: u64) -> Result<Option<L2BlockRecord>, StoreError> {
        self.get_json(&l2_key(number))
    }

    fn l2_head(&self) -> Result<Option<u64>, StoreError> {
        let Some(raw) = self
            .db
            .get(L2_HEAD_KEY)
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };
        let bytes: [u8; 8] = raw
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Codec("bad l2 head".to_string()))?;
        Ok(Some(u64::from_be_bytes(bytes)))
    }

    fn put_l2_block(&mut self, record: &L2BlockRecord) -> Result<(), StoreError> {
        self.put_json(&l2_key(record.info.number), record)?;
        let head = self.l2_head()?.unwrap_or(0).max(record.info.number);
        self.db
            .put(L2_HEAD_KEY, head.to_be_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn delete_l2_from_source(&mut self, l1_number: u64) -> Result<usize, StoreError> {
        let Some(head) = self.l2_head()? else {
            return Ok(0);
        };

        let mut removed = 0usize;
        let mut current = head;
        loop {
            let Some(record) = self.l2_block(current)? else {
                break;
            };
            if record.source_l1_number < l1_number {
                break;
            }
            self.db
                .delete(l2_key(current))
                .map_err(|e| StoreError::Database(e.to_string()))?;
            removed += 1;
            if current == 0 {
                break;
            }
            current -= 1;
        }

        let new_head = if removed == 0 { head } else { current };
        if self.l2_block(new_head)?.is_some() {
            self.db
                .put(L2_HEAD_KEY, new_head.to_be_bytes())
                .map_err(|e| StoreError::Database(e.to_string()))?;
        } else {
            self.db
                .delete(L2_HEAD_KEY)
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }
        Ok(removed)
    }
}

/// An in-memory [BlockStore] for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryBlockStore {
    l1: std::collections::BTreeMap<u64, L1Header>,
    l2: std::collections::BTreeMap<u64, L2BlockRecord>,
}

impl BlockStore for MemoryBlockStore {
    fn l1_header(&self, number: u64) -> Result<Option<L1Header>, StoreError> {
        Ok(self.l1.get(&number).cloned())
    }

    fn put_l1_header(&mut self, header: &L1Header) -> Result<(), StoreError> {
        self.l1.insert(header.number, header.clone());
        Ok(())
    }

    fn delete_l1_from(&mut self, number: u64) -> Result<(), StoreError> {
        self.l1.retain(|n, _| *n < number);
        Ok(())
    }

    fn l2_block(&self, number: u64) -> Result<Option<L2BlockRecord>, StoreError> {
        Ok(self.l2.get(&number).cloned())
    }

    fn l2_head(&self) -> Result<Option<u64>, StoreError> {
        Ok(self.l2.keys().next_back().copied())
    }

    fn put_l2_block(&mut self, record: &L2BlockRecord) -> Result<(), StoreError> {
        self.l2.insert(record.info.number, record.clone());
        Ok(())
    }

    fn delete_l2_from_source(&mut self, l1_number: u64) -> Result<usize, StoreError> {
        let before = self.l2.len();
        self.l2.retain(|_, record| record.source_l1_number < l1_number);
        Ok(before - self.l2.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::B256;
    use std::sync::atomic::{AtomicU64, Ordering};

    fn temp_store() -> RocksBlockStore {
        static NEXT: AtomicU64 = AtomicU64::new(0);
        let unique = NEXT.fetch_add(1, Ordering::SeqCst);
        let mut path = std::env::temp_dir();
        path.push(format!("facet-store-test-{}-{unique}", std::process::id()));
        let _ = std::fs::remove_dir_all(&path);
        RocksBlockStore::open(path).unwrap()
    }

    fn l2_record(number: u64, source: u64) -> L2BlockRecord {
        L2BlockRecord {
            info: BlockInfo {
                number,
                hash: B256::with_last_byte(number as u8 + 1),
                parent_hash: B256::with_last_byte(number as u8),
                timestamp: number * 12,
            },
            source_l1_number: source,
            sequence_number: 0,
            transactions: vec![Bytes::from(vec![0x7e, number as u8])],
            mint: MintState::default(),
        }
    }

    #[test]
    fn l1_headers_roundtrip() {
        let mut store = temp_store();
        let header = L1Header { number: 42, hash: B256::repeat_byte(0x42), ..Default::default() };
        store.put_l1_header(&header).unwrap();
        assert_eq!(store.l1_header(42).unwrap(), Some(header));
        assert_eq!(store.l1_header(43).unwrap(), None);
    }

    #[test]
    fn l2_head_tracks_highest_block() {
        let mut store = temp_store();
        assert_eq!(store.l2_head().unwrap(), None);
        store.put_l2_block(&l2_record(10, 100)).unwrap();
        store.put_l2_block(&l2_record(11, 101)).unwrap();
        assert_eq!(store.l2_head().unwrap(), Some(11));
        assert_eq!(store.l2_block(10).unwrap().unwrap().source_l1_number, 100);
    }

    #[test]
    fn reorg_truncation_deletes_from_source() {
        let mut store = temp_store();
        store.put_l2_block(&l2_record(10, 100)).unwrap();
        store.put_l2_block(&l2_record(11, 101)).unwrap();
        store.put_l2_block(&l2_record(12, 101)).unwrap();
        store.put_l2_block(&l2_record(13, 102)).unwrap();

        let removed = store.delete_l2_from_source(101).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(store.l2_head().unwrap(), Some(10));
        assert!(store.l2_block(11).unwrap().is_none());
        assert!(store.l2_block(10).unwrap().is_some());
    }

    #[test]
    fn memory_store_matches_rocks_semantics() {
        let mut store = MemoryBlockStore::default();
        store.put_l2_block(&l2_record(10, 100)).unwrap();
        store.put_l2_block(&l2_record(11, 101)).unwrap();
        assert_eq!(store.l2_head().unwrap(), Some(11));
        assert_eq!(store.delete_l2_from_source(101).unwrap(), 1);
        assert_eq!(store.l2_head().unwrap(), Some(10));
    }
}
