//! # Persistent Storage
//!
//! Disk-backed store implementations for the Paceline CORE.

pub mod redb_store;

pub use redb_store::RedbStore;
