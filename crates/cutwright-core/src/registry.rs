//! # Address Registry
//!
//! Persisted `name -> address` records. Read during dependency resolution
//! and resumability checks, written once per newly installed module or
//! deployed stand-in, and finally for the proxy itself.

use crate::error::RegistryError;
use crate::primitives::{Address, Selector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryEntry {
    pub address: Address,
    /// Constructor arguments the contract was deployed with.
    pub constructor_args: Vec<Address>,
    /// Selectors routed to this contract by its confirmed cut. Empty for
    /// anything that is not an installed module.
    pub selectors: Vec<Selector>,
}

impl RegistryEntry {
    /// Create an entry with no constructor arguments.
    #[must_use]
    pub fn new(address: Address) -> Self {
        Self {
            address,
            constructor_args: Vec::new(),
            selectors: Vec::new(),
        }
    }

    /// Create an entry recording constructor arguments.
    #[must_use]
    pub fn with_args(address: Address, constructor_args: Vec<Address>) -> Self {
        Self {
            address,
            constructor_args,
            selectors: Vec::new(),
        }
    }

    /// Record the selectors a confirmed cut routed to this contract.
    #[must_use]
    pub fn with_selectors(mut self, selectors: Vec<Selector>) -> Self {
        self.selectors = selectors;
        self
    }
}

/// Persisted address store.
pub trait Registry {
    /// Look up an entry by name.
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError>;

    /// Insert or overwrite an entry.
    fn put(&mut self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError>;

    /// All entries, ordered by name.
    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>, RegistryError>;

    /// Look up just the address.
    fn address(&self, name: &str) -> Result<Option<Address>, RegistryError> {
        Ok(self.get(name)?.map(|entry| entry.address))
    }
}

/// In-memory registry. Used by dry runs and tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryRegistry {
    entries: BTreeMap<String, RegistryEntry>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from existing entries (e.g. a snapshot of a persistent store).
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = (String, RegistryEntry)>) -> Self {
        Self {
            entries: entries.into_iter().collect(),
        }
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Registry for MemoryRegistry {
    fn get(&self, name: &str) -> Result<Option<RegistryEntry>, RegistryError> {
        Ok(self.entries.get(name).cloned())
    }

    fn put(&mut self, name: &str, entry: RegistryEntry) -> Result<(), RegistryError> {
        self.entries.insert(name.to_string(), entry);
        Ok(())
    }

    fn entries(&self) -> Result<Vec<(String, RegistryEntry)>, RegistryError> {
        Ok(self
            .entries
            .iter()
            .map(|(name, entry)| (name.clone(), entry.clone()))
            .collect())
    }
}
