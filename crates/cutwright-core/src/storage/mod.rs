//! # Storage Module
//!
//! Persistent registry storage using redb.
//!
//! Uses redb embedded database for:
//! - ACID transactions (each record is committed on its own)
//! - Crash safety (copy-on-write B-trees), so interrupted runs can resume
//! - Entries encoded with postcard

mod redb_registry;

pub use redb_registry::RedbRegistry;
