//! RocksDB-backed peer store

use crate::error::{StorageError, StorageResult};
use ember_primitives::NodeId;
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, IteratorMode, MultiThreaded,
    Options, WriteBatch,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Column family names
pub mod cf {
    /// Known overlay nodes, keyed by node id
    pub const NODES: &str = "nodes";
}

/// All column family names
const ALL_CFS: &[&str] = &[cf::NODES];

type Db = DBWithThreadMode<MultiThreaded>;

/// A persisted overlay node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Node identifier (RIPEMD-160 of `host:port`)
    pub id: NodeId,
    /// Host address
    pub host: String,
    /// Overlay UDP port
    pub port: u16,
    /// Last-seen unix timestamp in milliseconds
    pub seen: i64,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Create the database if missing
    pub create_if_missing: bool,
    /// Maximum number of open files
    pub max_open_files: i32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            max_open_files: 128,
        }
    }
}

/// Persistent peer store.
///
/// Records are keyed by node id, so re-inserting a known node overwrites
/// its `seen` timestamp in place. The overlay is the single writer; readers
/// may live on any thread.
pub struct NodeStore {
    db: Db,
}

impl NodeStore {
    /// Open (or create) the store at `path`
    pub fn open(path: &Path, config: StoreConfig) -> StorageResult<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(config.create_if_missing);
        opts.create_missing_column_families(true);
        opts.set_max_open_files(config.max_open_files);

        let descriptors: Vec<ColumnFamilyDescriptor> = ALL_CFS
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()))
            .collect();

        let db = Db::open_cf_descriptors(&opts, path, descriptors)?;
        Ok(Self { db })
    }

    fn nodes_cf(&self) -> StorageResult<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(cf::NODES)
            .ok_or(StorageError::MissingColumnFamily(cf::NODES))
    }

    /// Insert or refresh one record
    pub fn put(&self, record: &NodeRecord) -> StorageResult<()> {
        let cf = self.nodes_cf()?;
        let value = serde_json::to_vec(record)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        self.db.put_cf(&cf, record.id.as_bytes(), value)?;
        Ok(())
    }

    /// Insert or refresh a batch of records in one write
    pub fn put_all(&self, records: &[NodeRecord]) -> StorageResult<()> {
        let cf = self.nodes_cf()?;
        let mut batch = WriteBatch::default();
        for record in records {
            let value = serde_json::to_vec(record)
                .map_err(|e| StorageError::Serialization(e.to_string()))?;
            batch.put_cf(&cf, record.id.as_bytes(), value);
        }
        self.db.write(batch)?;
        debug!(count = records.len(), "peer table flushed");
        Ok(())
    }

    /// Get one record by id
    pub fn get(&self, id: &NodeId) -> StorageResult<Option<NodeRecord>> {
        let cf = self.nodes_cf()?;
        match self.db.get_cf(&cf, id.as_bytes())? {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StorageError::Serialization(e.to_string())),
            None => Ok(None),
        }
    }

    /// Remove one record
    pub fn remove(&self, id: &NodeId) -> StorageResult<()> {
        let cf = self.nodes_cf()?;
        self.db.delete_cf(&cf, id.as_bytes())?;
        Ok(())
    }

    /// All stored records. Unparseable rows are skipped.
    pub fn all(&self) -> StorageResult<Vec<NodeRecord>> {
        let cf = self.nodes_cf()?;
        let mut records = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::Start) {
            let (_, value) = item?;
            match serde_json::from_slice::<NodeRecord>(&value) {
                Ok(record) => records.push(record),
                Err(e) => debug!(error = %e, "skipping unreadable peer record"),
            }
        }
        Ok(records)
    }

    /// Delete records last seen before `cutoff` (unix millis). Returns how
    /// many were removed.
    pub fn prune_seen_before(&self, cutoff: i64) -> StorageResult<usize> {
        let stale: Vec<NodeId> = self
            .all()?
            .into_iter()
            .filter(|record| record.seen < cutoff)
            .map(|record| record.id)
            .collect();
        for id in &stale {
            self.remove(id)?;
        }
        Ok(stale.len())
    }

    /// Trigger a full compaction of the node column family
    pub fn compact(&self) -> StorageResult<()> {
        let cf = self.nodes_cf()?;
        self.db
            .compact_range_cf(&cf, None::<&[u8]>, None::<&[u8]>);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(n: u8, seen: i64) -> NodeRecord {
        NodeRecord {
            id: NodeId::from_bytes([n; 20]),
            host: format!("10.0.0.{}", n),
            port: 7000,
            seen,
        }
    }

    fn open_store(dir: &TempDir) -> NodeStore {
        NodeStore::open(dir.path(), StoreConfig::default()).unwrap()
    }

    #[test]
    fn test_put_get_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let rec = record(1, 1000);
        store.put(&rec).unwrap();
        assert_eq!(store.get(&rec.id).unwrap(), Some(rec));
    }

    #[test]
    fn test_get_missing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        assert_eq!(store.get(&NodeId::from_bytes([9; 20])).unwrap(), None);
    }

    #[test]
    fn test_put_overwrites_seen() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.put(&record(1, 1000)).unwrap();
        store.put(&record(1, 2000)).unwrap();

        let rec = store.get(&NodeId::from_bytes([1; 20])).unwrap().unwrap();
        assert_eq!(rec.seen, 2000);
        assert_eq!(store.all().unwrap().len(), 1);
    }

    #[test]
    fn test_put_all_and_iterate() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let records = vec![record(1, 10), record(2, 20), record(3, 30)];
        store.put_all(&records).unwrap();

        let mut all = store.all().unwrap();
        all.sort_by_key(|r| r.seen);
        assert_eq!(all, records);
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let rec = record(1, 10);
        store.put(&rec).unwrap();
        store.remove(&rec.id).unwrap();
        assert_eq!(store.get(&rec.id).unwrap(), None);
    }

    #[test]
    fn test_prune_seen_before() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store
            .put_all(&[record(1, 10), record(2, 20), record(3, 30)])
            .unwrap();
        let removed = store.prune_seen_before(25).unwrap();
        assert_eq!(removed, 2);

        let all = store.all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].seen, 30);
    }

    #[test]
    fn test_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let rec = record(1, 10);
        {
            let store = open_store(&dir);
            store.put(&rec).unwrap();
        }
        let store = open_store(&dir);
        assert_eq!(store.get(&rec.id).unwrap(), Some(rec));
    }

    #[test]
    fn test_compact_runs() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.put(&record(1, 10)).unwrap();
        store.compact().unwrap();
        assert_eq!(store.all().unwrap().len(), 1);
    }
}
