//! # Store Traits & In-Memory Backend
//!
//! Persistence collaborators for the Paceline CORE.
//!
//! The engine never touches a database directly; it is handed a store.
//! All data structures use `BTreeMap` for deterministic ordering.
//!
//! All fallible operations return `Result<T, PacelineError>` to support both
//! in-memory and persistent storage backends uniformly.

use crate::types::{InstanceId, PacelineError, SlaPolicy, StageInstance, StageName, Version};
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

// =============================================================================
// VERSIONED RECORDS
// =============================================================================

/// A stage instance together with its persistence version.
///
/// The version lives beside the record, not inside it, so the clock inputs
/// stay exactly the four fields the status computation is defined over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionedInstance {
    /// Record version, starts at 1 and increments on every successful write.
    pub version: Version,
    /// The instance payload.
    pub instance: StageInstance,
}

// =============================================================================
// POLICY STORE TRAIT
// =============================================================================

/// Storage for SLA policies, keyed by stage name.
///
/// `save_policy` must only ever be called with a validated policy; the
/// store persists what it is given and enforces no business rules.
pub trait PolicyStore {
    /// Load the policy for a stage, if one is configured.
    fn load_policy(&self, stage: &StageName) -> Result<Option<SlaPolicy>, PacelineError>;

    /// Insert or replace the policy for its stage.
    fn save_policy(&mut self, policy: SlaPolicy) -> Result<(), PacelineError>;

    /// All configured policies in stage-name order.
    fn policies(&self) -> Result<Vec<SlaPolicy>, PacelineError>;

    /// Number of configured policies.
    fn policy_count(&self) -> Result<usize, PacelineError>;
}

// =============================================================================
// INSTANCE STORE TRAIT
// =============================================================================

/// Storage for stage instances with conditional-write semantics.
///
/// `save_instance` is a compare-and-swap on the record version: the write
/// succeeds only if the persisted version equals `expected`, otherwise it
/// fails with [`PacelineError::WriteConflict`] and persists nothing.
pub trait InstanceStore {
    /// Insert a new instance. Assigns the next id; the record version
    /// starts at [`Version::initial`].
    fn insert_instance(&mut self, instance: StageInstance) -> Result<InstanceId, PacelineError>;

    /// Load an instance with its current version.
    fn load_instance(&self, id: InstanceId) -> Result<Option<VersionedInstance>, PacelineError>;

    /// Conditionally overwrite an instance.
    ///
    /// Returns the new version on success. Fails with
    /// [`PacelineError::InstanceNotFound`] if the id is unknown and with
    /// [`PacelineError::WriteConflict`] if `expected` does not match the
    /// persisted version.
    fn save_instance(
        &mut self,
        id: InstanceId,
        instance: &StageInstance,
        expected: Version,
    ) -> Result<Version, PacelineError>;

    /// All instances in id order.
    fn instances(&self) -> Result<Vec<(InstanceId, VersionedInstance)>, PacelineError>;

    /// Number of stored instances.
    fn instance_count(&self) -> Result<usize, PacelineError>;
}

// =============================================================================
// MEMORY STORE
// =============================================================================

/// Deterministic in-memory store.
///
/// Uses `BTreeMap` exclusively for deterministic ordering.
/// No `HashMap` allowed.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    /// Policy storage: StageName -> SlaPolicy
    policies: BTreeMap<StageName, SlaPolicy>,

    /// Instance storage: InstanceId -> VersionedInstance
    instances: BTreeMap<InstanceId, VersionedInstance>,

    /// Next available InstanceId
    next_instance_id: u64,
}

impl MemoryStore {
    /// Create a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next_instance_id: 1,
            ..Self::default()
        }
    }
}

impl PolicyStore for MemoryStore {
    fn load_policy(&self, stage: &StageName) -> Result<Option<SlaPolicy>, PacelineError> {
        Ok(self.policies.get(stage).cloned())
    }

    fn save_policy(&mut self, policy: SlaPolicy) -> Result<(), PacelineError> {
        self.policies.insert(policy.stage.clone(), policy);
        Ok(())
    }

    fn policies(&self) -> Result<Vec<SlaPolicy>, PacelineError> {
        Ok(self.policies.values().cloned().collect())
    }

    fn policy_count(&self) -> Result<usize, PacelineError> {
        Ok(self.policies.len())
    }
}

impl InstanceStore for MemoryStore {
    fn insert_instance(&mut self, instance: StageInstance) -> Result<InstanceId, PacelineError> {
        let id = InstanceId(self.next_instance_id);
        self.next_instance_id = self.next_instance_id.saturating_add(1);

        self.instances.insert(
            id,
            VersionedInstance {
                version: Version::initial(),
                instance,
            },
        );

        Ok(id)
    }

    fn load_instance(&self, id: InstanceId) -> Result<Option<VersionedInstance>, PacelineError> {
        Ok(self.instances.get(&id).cloned())
    }

    fn save_instance(
        &mut self,
        id: InstanceId,
        instance: &StageInstance,
        expected: Version,
    ) -> Result<Version, PacelineError> {
        let Some(current) = self.instances.get_mut(&id) else {
            return Err(PacelineError::InstanceNotFound(id));
        };

        if current.version != expected {
            return Err(PacelineError::WriteConflict {
                expected: expected.value(),
                actual: current.version.value(),
            });
        }

        let new_version = current.version.next();
        current.version = new_version;
        current.instance = instance.clone();

        Ok(new_version)
    }

    fn instances(&self) -> Result<Vec<(InstanceId, VersionedInstance)>, PacelineError> {
        Ok(self
            .instances
            .iter()
            .map(|(id, v)| (*id, v.clone()))
            .collect())
    }

    fn instance_count(&self) -> Result<usize, PacelineError> {
        Ok(self.instances.len())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{OwnerRole, PolicySnapshot};
    use chrono::{TimeZone, Utc};

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

    fn sample_instance(stage: &str) -> StageInstance {
        StageInstance {
            stage: StageName::new(stage),
            owner: OwnerRole::Staff,
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
    fn save_and_load_policy() {
        let mut store = MemoryStore::new();
        store
            .save_policy(sample_policy("evaluation"))
            .expect("save");

        let loaded = store
            .load_policy(&StageName::new("evaluation"))
            .expect("load");
        assert_eq!(loaded.map(|p| p.duration_days), Some(5));
    }

    #[test]
    fn load_missing_policy_returns_none() {
        let store = MemoryStore::new();
        let loaded = store.load_policy(&StageName::new("unknown")).expect("load");
        assert!(loaded.is_none());
    }

    #[test]
    fn save_policy_replaces_existing() {
        let mut store = MemoryStore::new();
        store
            .save_policy(sample_policy("evaluation"))
            .expect("save");

        let mut updated = sample_policy("evaluation");
        updated.duration_days = 10;
        store.save_policy(updated).expect("save");

        assert_eq!(store.policy_count().expect("count"), 1);
        let loaded = store
            .load_policy(&StageName::new("evaluation"))
            .expect("load");
        assert_eq!(loaded.map(|p| p.duration_days), Some(10));
    }

    #[test]
    fn policies_in_stage_name_order() {
        let mut store = MemoryStore::new();
        store.save_policy(sample_policy("revision")).expect("save");
        store.save_policy(sample_policy("evaluation")).expect("save");

        let stages: Vec<_> = store
            .policies()
            .expect("list")
            .into_iter()
            .map(|p| p.stage.as_str().to_string())
            .collect();
        assert_eq!(stages, vec!["evaluation", "revision"]);
    }

    #[test]
    fn insert_assigns_sequential_ids_and_initial_version() {
        let mut store = MemoryStore::new();
        let first = store
            .insert_instance(sample_instance("evaluation"))
            .expect("insert");
        let second = store
            .insert_instance(sample_instance("evaluation"))
            .expect("insert");

        assert_eq!(first, InstanceId(1));
        assert_eq!(second, InstanceId(2));

        let loaded = store.load_instance(first).expect("load").expect("present");
        assert_eq!(loaded.version, Version::initial());
    }

    #[test]
    fn conditional_save_bumps_version() {
        let mut store = MemoryStore::new();
        let id = store
            .insert_instance(sample_instance("evaluation"))
            .expect("insert");

        let mut instance = sample_instance("evaluation");
        instance.extensions_granted = 1;

        let new_version = store
            .save_instance(id, &instance, Version::initial())
            .expect("save");
        assert_eq!(new_version, Version(2));

        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.version, Version(2));
        assert_eq!(loaded.instance.extensions_granted, 1);
    }

    #[test]
    fn stale_version_save_is_a_conflict() {
        let mut store = MemoryStore::new();
        let id = store
            .insert_instance(sample_instance("evaluation"))
            .expect("insert");

        let instance = sample_instance("evaluation");
        store
            .save_instance(id, &instance, Version::initial())
            .expect("save");

        // A second writer still holding version 1 must lose
        let err = store
            .save_instance(id, &instance, Version::initial())
            .expect_err("conflict");
        assert!(matches!(
            err,
            PacelineError::WriteConflict {
                expected: 1,
                actual: 2
            }
        ));

        // The conflicting write must not have bumped the version
        let loaded = store.load_instance(id).expect("load").expect("present");
        assert_eq!(loaded.version, Version(2));
    }

    #[test]
    fn save_unknown_instance_fails() {
        let mut store = MemoryStore::new();
        let err = store
            .save_instance(
                InstanceId(999),
                &sample_instance("evaluation"),
                Version::initial(),
            )
            .expect_err("missing");
        assert!(matches!(err, PacelineError::InstanceNotFound(_)));
    }

    #[test]
    fn instances_in_id_order() {
        let mut store = MemoryStore::new();
        store
            .insert_instance(sample_instance("evaluation"))
            .expect("insert");
        store
            .insert_instance(sample_instance("revision"))
            .expect("insert");

        let ids: Vec<_> = store
            .instances()
            .expect("list")
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        assert_eq!(ids, vec![InstanceId(1), InstanceId(2)]);
        assert_eq!(store.instance_count().expect("count"), 2);
    }
}
