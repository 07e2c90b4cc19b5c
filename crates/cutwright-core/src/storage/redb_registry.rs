//! redb-backed registry.
//!
//! A single table maps contract names to postcard-encoded `RegistryEntry`
//! values. Every `put` is its own committed write transaction, so an
//! interrupted run keeps every record written before the interruption.

use crate::error::RegistryError;
use crate::registry::{Registry, RegistryEntry};
use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};
use std::path::Path;

const CONTRACTS: TableDefinition<&str, &[u8]> = TableDefinition::new("contracts");

fn storage(err: impl Into<redb::Error>) -> RegistryError {
    RegistryError::from(err.into())
}

/// Persistent registry stored in a redb database file.
pub struct RedbRegistry {
    db: Database,
}

impl std::fmt::Debug for RedbRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbRegistry").finish_non_exhaustive()
    }
}

impl RedbRegistry {
    /// Open the database at `path`, creating it (and its table) if needed.
    pub fn open(path: &Path) -> Result<Self, RegistryError> {
        let db = Database::create(path).map_err(storage)?;

        // Make sure the table exists so read transactions never see
        // `TableDoesNotExist` on a fresh file.
        let txn = db.begin_write().map_err(storage)?;
        txn.open_table(CONTRACTS).map_err(storage)?;
        txn.commit().map_err(storage)?;

        Ok(Self { db })
    }

    fn decode(name: &str, bytes: &[u8]) -> Result<RegistryEntry, RegistryError> {
        postcard::from_bytes(bytes).map_err(|e| RegistryError::Encoding {
            name: name.to_string(),
            reason: e.to_string(),
        })
    }
}

impl Registry for RedbRegistry {
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let table = txn.open_table(CONTRACTS).map_err(storage)?;
        match table.get(name).map_err(storage)? {
            Some(guard) => Ok(Some(Self::decode(name, guard.value())?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError> {
        let bytes = postcard::to_allocvec(&entry).map_err(|e| RegistryError::Encoding {
            name: name.to_string(),
            reason: e.to_string(),
        })?;

        let txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = txn.open_table(CONTRACTS).map_err(storage)?;
            table.insert(name, bytes.as_slice()).map_err(storage)?;
        }
        txn.commit().map_err(storage)?;
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>, RegistryError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let table = txn.open_table(CONTRACTS).map_err(storage)?;

        let mut out = Vec::new();
        for item in table.iter().map_err(storage)? {
            let (key, value) = item.map_err(storage)?;
            let name = key.value().to_string();
            let entry = Self::decode(&name, value.value())?;
            out.push((name, entry));
        }
        Ok(out)
    }
}
