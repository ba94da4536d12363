//! # redb-backed Store
//!
//! A disk-backed policy and instance store using the redb embedded database.
//!
//! Provides:
//! - ACID transactions
//! - Crash safety (copy-on-write B-trees)
//! - MVCC (concurrent readers, single writer)
//! - Zero configuration
//!
//! The single-writer property is what makes the conditional write real: the
//! version check and the overwrite happen inside one write transaction, so
//! no interleaving can slip between them.

use crate::store::{InstanceStore, PolicyStore, VersionedInstance};
use crate::types::{InstanceId, PacelineError, SlaPolicy, StageInstance, StageName, Version};
use redb::{Database, ReadableDatabase, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;

/// Table for policies: stage name -> serialized SlaPolicy bytes
const POLICIES: TableDefinition<&str, &[u8]> = TableDefinition::new("policies");

/// Table for instances: InstanceId(u64) -> serialized VersionedInstance bytes
const INSTANCES: TableDefinition<u64, &[u8]> = TableDefinition::new("instances");

/// Table for metadata: key string -> value u64
const METADATA: TableDefinition<&str, u64> = TableDefinition::new("metadata");

/// A disk-backed store using redb.
///
/// Records are postcard-encoded. The instance id counter is persisted in
/// the metadata table and cached in memory between writes.
pub struct RedbStore {
    /// The redb database handle.
    db: Database,
    /// Next available instance ID.
    next_instance_id: u64,
}

impl std::fmt::Debug for RedbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbStore")
            .field("next_instance_id", &self.next_instance_id)
            .finish_non_exhaustive()
    }
}

impl RedbStore {
    /// Open or create a store database at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PacelineError> {
        let db =
            Database::create(path.as_ref()).map_err(|e| PacelineError::IoError(e.to_string()))?;

        // Initialize tables if they don't exist
        {
            let write_txn = db
                .begin_write()
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(POLICIES)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(INSTANCES)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            let _ = write_txn
                .open_table(METADATA)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            write_txn
                .commit()
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
        }

        // Load metadata
        let read_txn = db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        let next_instance_id = {
            let table = read_txn
                .open_table(METADATA)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            table
                .get("next_instance_id")
                .map_err(|e| PacelineError::IoError(e.to_string()))?
                .map(|v| v.value())
                .unwrap_or(1)
        };

        Ok(Self {
            db,
            next_instance_id,
        })
    }

    /// Compact the database (optional optimization).
    pub fn compact(&mut self) -> Result<(), PacelineError> {
        self.db
            .compact()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        Ok(())
    }
}

// =============================================================================
// POLICY STORE IMPLEMENTATION
// =============================================================================

impl PolicyStore for RedbStore {
    fn load_policy(&self, stage: &StageName) -> Result<Option<SlaPolicy>, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(POLICIES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        match table
            .get(stage.as_str())
            .map_err(|e| PacelineError::IoError(e.to_string()))?
        {
            Some(data) => {
                let policy: SlaPolicy = postcard::from_bytes(data.value())
                    .map_err(|e| PacelineError::SerializationError(e.to_string()))?;
                Ok(Some(policy))
            }
            None => Ok(None),
        }
    }

    fn save_policy(&mut self, policy: SlaPolicy) -> Result<(), PacelineError> {
        let bytes = postcard::to_allocvec(&policy)
            .map_err(|e| PacelineError::SerializationError(e.to_string()))?;

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        {
            let mut table = write_txn
                .open_table(POLICIES)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            table
                .insert(policy.stage.as_str(), bytes.as_slice())
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        Ok(())
    }

    fn policies(&self) -> Result<Vec<SlaPolicy>, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(POLICIES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        let mut policies = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| PacelineError::IoError(e.to_string()))?
        {
            let (_, data) = entry.map_err(|e| PacelineError::IoError(e.to_string()))?;
            let policy: SlaPolicy = postcard::from_bytes(data.value())
                .map_err(|e| PacelineError::SerializationError(e.to_string()))?;
            policies.push(policy);
        }
        Ok(policies)
    }

    fn policy_count(&self) -> Result<usize, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(POLICIES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        Ok(count as usize)
    }
}

// =============================================================================
// INSTANCE STORE IMPLEMENTATION
// =============================================================================

impl InstanceStore for RedbStore {
    fn insert_instance(&mut self, instance: StageInstance) -> Result<InstanceId, PacelineError> {
        let id = InstanceId(self.next_instance_id);
        let record = VersionedInstance {
            version: Version::initial(),
            instance,
        };
        let bytes = postcard::to_allocvec(&record)
            .map_err(|e| PacelineError::SerializationError(e.to_string()))?;

        let next_id = self.next_instance_id.saturating_add(1);

        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        {
            let mut instances_table = write_txn
                .open_table(INSTANCES)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            instances_table
                .insert(id.0, bytes.as_slice())
                .map_err(|e| PacelineError::IoError(e.to_string()))?;

            let mut meta_table = write_txn
                .open_table(METADATA)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
            meta_table
                .insert("next_instance_id", next_id)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;
        }
        write_txn
            .commit()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        // Update in-memory state only after successful commit
        self.next_instance_id = next_id;

        Ok(id)
    }

    fn load_instance(&self, id: InstanceId) -> Result<Option<VersionedInstance>, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(INSTANCES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        match table
            .get(id.0)
            .map_err(|e| PacelineError::IoError(e.to_string()))?
        {
            Some(data) => {
                let record: VersionedInstance = postcard::from_bytes(data.value())
                    .map_err(|e| PacelineError::SerializationError(e.to_string()))?;
                Ok(Some(record))
            }
            None => Ok(None),
        }
    }

    fn save_instance(
        &mut self,
        id: InstanceId,
        instance: &StageInstance,
        expected: Version,
    ) -> Result<Version, PacelineError> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        // The version check and the overwrite share this transaction;
        // on any failure below the transaction is dropped, not committed
        let new_version = {
            let mut table = write_txn
                .open_table(INSTANCES)
                .map_err(|e| PacelineError::IoError(e.to_string()))?;

            let current: VersionedInstance = match table
                .get(id.0)
                .map_err(|e| PacelineError::IoError(e.to_string()))?
            {
                Some(data) => postcard::from_bytes(data.value())
                    .map_err(|e| PacelineError::SerializationError(e.to_string()))?,
                None => return Err(PacelineError::InstanceNotFound(id)),
            };

            if current.version != expected {
                return Err(PacelineError::WriteConflict {
                    expected: expected.value(),
                    actual: current.version.value(),
                });
            }

            let new_version = current.version.next();
            let record = VersionedInstance {
                version: new_version,
                instance: instance.clone(),
            };
            let bytes = postcard::to_allocvec(&record)
                .map_err(|e| PacelineError::SerializationError(e.to_string()))?;
            table
                .insert(id.0, bytes.as_slice())
                .map_err(|e| PacelineError::IoError(e.to_string()))?;

            new_version
        };

        write_txn
            .commit()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        Ok(new_version)
    }

    fn instances(&self) -> Result<Vec<(InstanceId, VersionedInstance)>, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(INSTANCES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;

        let mut instances = Vec::new();
        for entry in table
            .iter()
            .map_err(|e| PacelineError::IoError(e.to_string()))?
        {
            let (key, data) = entry.map_err(|e| PacelineError::IoError(e.to_string()))?;
            let record: VersionedInstance = postcard::from_bytes(data.value())
                .map_err(|e| PacelineError::SerializationError(e.to_string()))?;
            instances.push((InstanceId(key.value()), record));
        }
        Ok(instances)
    }

    fn instance_count(&self) -> Result<usize, PacelineError> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let table = read_txn
            .open_table(INSTANCES)
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        let count = table
            .len()
            .map_err(|e| PacelineError::IoError(e.to_string()))?;
        Ok(count as usize)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::types::{OwnerRole, PolicySnapshot};
    use chrono::{TimeZone, Utc};
    use tempfile::tempdir;

    fn sample_policy(stage: &str) -> SlaPolicy {
        SlaPolicy {
            stage: StageName::new(stage),
            duration_days: 5,
            grace_days: 2,
            allow_extensions: true,
            max_extensions: 1,
            extension_days: 3,
            is_active: true,
        }
    }

    fn sample_instance() -> StageInstance {
        StageInstance {
            stage: StageName::new("evaluation"),
            owner: OwnerRole::Applicant,
            started_at: Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts"),
            policy: PolicySnapshot {
                duration_days: 5,
                grace_days: 2,
                allow_extensions: true,
                max_extensions: 1,
                extension_days: 3,
            },
            extensions_granted: 0,
            closed: None,
        }
    }

    #[test]
    fn policy_round_trip() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store
            .save_policy(sample_policy("evaluation"))
            .expect("save");

        let loaded = store
            .load_policy(&StageName::new("evaluation"))
            .expect("load");
        assert_eq!(loaded, Some(sample_policy("evaluation")));
        assert_eq!(store.policy_count().expect("count"), 1);
    }

    #[test]
    fn policies_persist_after_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store
                .save_policy(sample_policy("supervisor_review"))
                .expect("save");
            store
                .save_policy(sample_policy("evaluation"))
                .expect("save");
        }
        // Store dropped here, simulating process exit

        {
            let store = RedbStore::open(&db_path).expect("reopen db");
            assert_eq!(store.policy_count().expect("count"), 2);
            let loaded = store
                .load_policy(&StageName::new("supervisor_review"))
                .expect("load");
            assert!(loaded.is_some());
        }
    }

    #[test]
    fn insert_and_load_instance() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let id = store.insert_instance(sample_instance()).expect("insert");
        assert_eq!(id, InstanceId(1));

        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.version, Version::initial());
        assert_eq!(loaded.instance, sample_instance());
    }

    #[test]
    fn conditional_save_bumps_version() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let id = store.insert_instance(sample_instance()).expect("insert");

        let mut modified = sample_instance();
        modified.extensions_granted = 1;

        let new_version = store
            .save_instance(id, &modified, Version::initial())
            .expect("save");
        assert_eq!(new_version, Version(2));

        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.version, Version(2));
        assert_eq!(loaded.instance.extensions_granted, 1);
    }

    #[test]
    fn stale_version_conflict_persists_nothing() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let id = store.insert_instance(sample_instance()).expect("insert");

        let mut first_writer = sample_instance();
        first_writer.extensions_granted = 1;
        store
            .save_instance(id, &first_writer, Version::initial())
            .expect("save");

        // A second writer still holding version 1 must lose
        let mut second_writer = sample_instance();
        second_writer.extensions_granted = 9;
        let err = store
            .save_instance(id, &second_writer, Version::initial())
            .expect_err("conflict");
        assert!(matches!(
            err,
            PacelineError::WriteConflict {
                expected: 1,
                actual: 2
            }
        ));

        // The losing write left no trace
        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.version, Version(2));
        assert_eq!(loaded.instance.extensions_granted, 1);
    }

    #[test]
    fn save_unknown_instance_fails() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let err = store
            .save_instance(InstanceId(999), &sample_instance(), Version::initial())
            .expect_err("missing");
        assert!(matches!(err, PacelineError::InstanceNotFound(_)));
    }

    #[test]
    fn next_instance_id_preserved_across_reopen() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");

        {
            let mut store = RedbStore::open(&db_path).expect("open db");
            store.insert_instance(sample_instance()).expect("insert");
            store.insert_instance(sample_instance()).expect("insert");
        }

        {
            let mut store = RedbStore::open(&db_path).expect("reopen db");
            let id = store.insert_instance(sample_instance()).expect("insert");
            assert_eq!(id, InstanceId(3));
            assert_eq!(store.instance_count().expect("count"), 3);
        }
    }

    #[test]
    fn instances_listed_in_id_order() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store.insert_instance(sample_instance()).expect("insert");
        store.insert_instance(sample_instance()).expect("insert");
        store.insert_instance(sample_instance()).expect("insert");

        let ids: Vec<_> = store
            .instances()
            .expect("list")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![InstanceId(1), InstanceId(2), InstanceId(3)]);
    }

    #[test]
    fn closed_instance_round_trip() {
        use crate::types::{CloseStatus, Closure};

        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        let id = store.insert_instance(sample_instance()).expect("insert");

        let mut closed = sample_instance();
        closed.closed = Some(Closure {
            at: Utc.with_ymd_and_hms(2025, 3, 4, 12, 0, 0).single().expect("ts"),
            status: CloseStatus::Completed,
        });
        store
            .save_instance(id, &closed, Version::initial())
            .expect("save");

        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.instance.closed.map(|c| c.status), Some(CloseStatus::Completed));
    }

    #[test]
    fn compact_preserves_data() {
        let temp = tempdir().expect("temp dir");
        let db_path = temp.path().join("test.redb");
        let mut store = RedbStore::open(&db_path).expect("open db");

        store
            .save_policy(sample_policy("evaluation"))
            .expect("save");
        store.insert_instance(sample_instance()).expect("insert");

        store.compact().expect("compact");

        assert_eq!(store.policy_count().expect("count"), 1);
        assert_eq!(store.instance_count().expect("count"), 1);
    }
}
