//! Redb (Rust embedded database) backend for GIP storage.
//!
//! Redb is a pure Rust embedded key-value store that provides ACID
//! transactions without external dependencies, which makes it the default
//! persistence layer for embeddings and the learning log.

use crate::{StoreBackend, StoreError};
use redb::{Database, ReadableTable, TableDefinition};
use std::path::Path;
use std::sync::Arc;

/// Single table holding embeddings, schema markers, and log entries,
/// separated by key prefix.
const GIP_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("gip_data");

/// Redb backend implementation for persistent key-value storage.
///
/// All operations are atomic and durable by default. The `Arc<Database>`
/// wrapper allows safe sharing across threads; redb handles its own
/// internal locking and MVCC.
pub struct RedbBackend {
    db: Arc<Database>,
}

impl RedbBackend {
    /// Open or create a Redb database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let db = Database::create(path).map_err(StoreError::backend)?;

        // Accessing the table creates it if it doesn't exist
        let write_txn = db.begin_write().map_err(StoreError::backend)?;
        {
            let _table = write_txn.open_table(GIP_TABLE).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;

        Ok(Self { db: Arc::new(db) })
    }
}

impl StoreBackend for RedbBackend {
    fn put(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn.open_table(GIP_TABLE).map_err(StoreError::backend)?;
            table.insert(key, value).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(GIP_TABLE).map_err(StoreError::backend)?;

        match table.get(key).map_err(StoreError::backend)? {
            Some(value) => Ok(Some(value.value().to_vec())),
            None => Ok(None),
        }
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let write_txn = self.db.begin_write().map_err(StoreError::backend)?;
        {
            let mut table = write_txn.open_table(GIP_TABLE).map_err(StoreError::backend)?;
            table.remove(key).map_err(StoreError::backend)?;
        }
        write_txn.commit().map_err(StoreError::backend)?;
        Ok(())
    }

    fn scan(
        &self,
        visitor: &mut dyn FnMut(&str, &[u8]) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        let read_txn = self.db.begin_read().map_err(StoreError::backend)?;
        let table = read_txn.open_table(GIP_TABLE).map_err(StoreError::backend)?;

        for item in table.iter().map_err(StoreError::backend)? {
            let (key, value) = item.map_err(StoreError::backend)?;
            visitor(key.value(), value.value())?;
        }

        Ok(())
    }

    fn flush(&self) -> Result<(), StoreError> {
        // Redb commits are synchronous, so flush is a no-op
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn redb_backend_roundtrip() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("emb/key1", b"value1").unwrap();
        assert_eq!(backend.get("emb/key1").unwrap(), Some(b"value1".to_vec()));
        assert_eq!(backend.get("emb/nonexistent").unwrap(), None);
    }

    #[test]
    fn redb_backend_delete() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("key1", b"value1").unwrap();
        backend.delete("key1").unwrap();
        assert_eq!(backend.get("key1").unwrap(), None);
    }

    #[test]
    fn redb_backend_scan_is_key_ordered() {
        let temp_file = NamedTempFile::new().unwrap();
        let backend = RedbBackend::open(temp_file.path()).unwrap();

        backend.put("log/2", b"b").unwrap();
        backend.put("log/1", b"a").unwrap();
        backend.put("emb/x", b"e").unwrap();

        let mut keys = Vec::new();
        backend
            .scan(&mut |key, _value| {
                keys.push(key.to_string());
                Ok(())
            })
            .unwrap();

        assert_eq!(keys, vec!["emb/x", "log/1", "log/2"]);
    }
}
