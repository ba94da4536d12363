//! # Engine Module
//!
//! The high-level facade combining a storage backend with the policy
//! resolver, stage clock, and lifecycle engine. Both the HTTP API and the
//! CLI talk to the core exclusively through this handle.
//!
//! ## Storage Backends
//!
//! The engine supports two storage backends:
//! - `InMemory`: Uses `MemoryStore` (fast, volatile)
//! - `Persistent`: Uses `RedbStore` for disk-backed ACID storage
//!
//! ## Concurrency
//!
//! Every instance mutation is load, transform, conditional save. When the
//! conditional save loses a race, the engine reloads and retries once
//! (`CONFLICT_RETRY_LIMIT`); a second conflict is surfaced to the caller.

use crate::clock::{Escalation, StageClock, escalation};
use crate::lifecycle::LifecycleEngine;
use crate::policy::{PolicyResolver, default_policies, validate_policy};
use crate::primitives::CONFLICT_RETRY_LIMIT;
use crate::storage::RedbStore;
use crate::store::{InstanceStore, MemoryStore, PolicyStore, VersionedInstance};
use crate::types::{
    CloseStatus, InstanceId, OwnerRole, PacelineError, SlaPolicy, StageInstance, StageName,
    StageStatus, Version,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::Path;

/// Storage backend for an Engine.
#[derive(Debug)]
pub enum StoreBackend {
    /// In-memory store (fast, volatile).
    InMemory(MemoryStore),
    /// Disk-backed store using redb (ACID, persistent).
    Persistent(RedbStore),
}

impl Default for StoreBackend {
    fn default() -> Self {
        Self::InMemory(MemoryStore::new())
    }
}

// NOTE: StoreBackend does NOT implement Clone.
// RedbStore (database handle) cannot be safely cloned.

/// A fully evaluated view of one stage instance at a given instant.
///
/// `due_at`, `expiry_at`, `status`, and `escalation` are derived on every
/// call, never stored.
#[derive(Debug, Clone, Serialize)]
pub struct InstanceReport {
    /// The instance identifier.
    pub id: InstanceId,
    /// The persistence record version.
    pub version: Version,
    /// The stored record.
    pub instance: StageInstance,
    /// When the stage becomes overdue.
    pub due_at: DateTime<Utc>,
    /// When the stage expires.
    pub expiry_at: DateTime<Utc>,
    /// Deadline status at the evaluation instant.
    pub status: StageStatus,
    /// Consequence of that status for this owner.
    pub escalation: Escalation,
}

/// Aggregate counters over the whole store, evaluated at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct EngineMetrics {
    /// Configured policies.
    pub policies: usize,
    /// Stored instances, open or closed.
    pub instances: usize,
    /// Instances not yet closed.
    pub open: usize,
    /// Open instances before their due instant.
    pub on_time: usize,
    /// Open instances inside their grace period.
    pub overdue: usize,
    /// Open instances past their expiry instant.
    pub expired: usize,
    /// Closed instances.
    pub closed: usize,
}

/// The Engine combines a storage backend with the pure core logic.
///
/// All reads re-derive status through the stage clock; all writes go
/// through the lifecycle engine and the conditional-save discipline.
#[derive(Debug, Default)]
pub struct Engine {
    /// The storage backend (in-memory or persistent).
    backend: StoreBackend,
}

impl Engine {
    /// Create a new engine with in-memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine with an existing in-memory store.
    #[must_use]
    pub fn with_memory(store: MemoryStore) -> Self {
        Self {
            backend: StoreBackend::InMemory(store),
        }
    }

    /// Create an engine with persistent redb storage.
    ///
    /// Opens or creates a redb database at the given path.
    pub fn with_redb(path: impl AsRef<Path>) -> Result<Self, PacelineError> {
        let store = RedbStore::open(path)?;
        Ok(Self {
            backend: StoreBackend::Persistent(store),
        })
    }

    /// Check if using persistent storage.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        matches!(self.backend, StoreBackend::Persistent(_))
    }

    // =========================================================================
    // POLICIES
    // =========================================================================

    /// Validate and persist a policy.
    ///
    /// The policy is checked whole before anything is written; an invalid
    /// edit is never partially applied.
    pub fn upsert_policy(&mut self, policy: SlaPolicy) -> Result<(), PacelineError> {
        validate_policy(&policy)?;
        match &mut self.backend {
            StoreBackend::InMemory(store) => store.save_policy(policy),
            StoreBackend::Persistent(store) => store.save_policy(policy),
        }
    }

    /// Look up the policy for a stage.
    pub fn policy(&self, stage: &StageName) -> Result<SlaPolicy, PacelineError> {
        match &self.backend {
            StoreBackend::InMemory(store) => PolicyResolver::resolve(store, stage),
            StoreBackend::Persistent(store) => PolicyResolver::resolve(store, stage),
        }
    }

    /// All configured policies in stage-name order.
    pub fn policies(&self) -> Result<Vec<SlaPolicy>, PacelineError> {
        match &self.backend {
            StoreBackend::InMemory(store) => store.policies(),
            StoreBackend::Persistent(store) => store.policies(),
        }
    }

    /// Persist the seed policy set. Returns how many policies were written.
    pub fn seed_default_policies(&mut self) -> Result<usize, PacelineError> {
        let seeds = default_policies();
        let count = seeds.len();
        for policy in seeds {
            self.upsert_policy(policy)?;
        }
        Ok(count)
    }

    // =========================================================================
    // INSTANCES
    // =========================================================================

    /// Open a new stage instance.
    ///
    /// Resolves the policy (rejecting missing or inactive ones), captures
    /// its snapshot, and inserts the record at version 1.
    pub fn open_stage(
        &mut self,
        stage: &StageName,
        owner: OwnerRole,
        started_at: DateTime<Utc>,
    ) -> Result<InstanceId, PacelineError> {
        match &mut self.backend {
            StoreBackend::InMemory(store) => {
                let policy = PolicyResolver::resolve_for_open(store, stage)?;
                store.insert_instance(LifecycleEngine::open_instance(&policy, owner, started_at))
            }
            StoreBackend::Persistent(store) => {
                let policy = PolicyResolver::resolve_for_open(store, stage)?;
                store.insert_instance(LifecycleEngine::open_instance(&policy, owner, started_at))
            }
        }
    }

    /// Load an instance with its current version.
    pub fn instance(&self, id: InstanceId) -> Result<VersionedInstance, PacelineError> {
        let record = match &self.backend {
            StoreBackend::InMemory(store) => store.load_instance(id)?,
            StoreBackend::Persistent(store) => store.load_instance(id)?,
        };
        record.ok_or(PacelineError::InstanceNotFound(id))
    }

    /// Compute the status of an instance at the given instant.
    pub fn status(&self, id: InstanceId, now: DateTime<Utc>) -> Result<StageStatus, PacelineError> {
        let record = self.instance(id)?;
        Ok(StageClock::compute_status(&record.instance, now))
    }

    /// Fully evaluate an instance at the given instant.
    pub fn inspect(
        &self,
        id: InstanceId,
        now: DateTime<Utc>,
    ) -> Result<InstanceReport, PacelineError> {
        let record = self.instance(id)?;
        let status = StageClock::compute_status(&record.instance, now);
        Ok(InstanceReport {
            id,
            version: record.version,
            due_at: StageClock::due_at(&record.instance),
            expiry_at: StageClock::expiry_at(&record.instance),
            status,
            escalation: escalation(status, record.instance.owner),
            instance: record.instance,
        })
    }

    /// Grant one extension to an instance.
    ///
    /// Load, apply, conditional save; retries once on a write conflict.
    pub fn grant_extension(&mut self, id: InstanceId) -> Result<VersionedInstance, PacelineError> {
        self.mutate_instance(id, LifecycleEngine::grant_extension)
    }

    /// Close an instance with the given terminal status.
    pub fn close(
        &mut self,
        id: InstanceId,
        status: CloseStatus,
        at: DateTime<Utc>,
    ) -> Result<VersionedInstance, PacelineError> {
        self.mutate_instance(id, |instance| {
            LifecycleEngine::close_instance(instance, status, at)
        })
    }

    fn mutate_instance<F>(
        &mut self,
        id: InstanceId,
        transform: F,
    ) -> Result<VersionedInstance, PacelineError>
    where
        F: Fn(&StageInstance) -> Result<StageInstance, PacelineError>,
    {
        match &mut self.backend {
            StoreBackend::InMemory(store) => mutate_with_retry(store, id, &transform),
            StoreBackend::Persistent(store) => mutate_with_retry(store, id, &transform),
        }
    }

    // =========================================================================
    // METRICS
    // =========================================================================

    /// Aggregate counters over the whole store, evaluated at `now`.
    pub fn metrics(&self, now: DateTime<Utc>) -> Result<EngineMetrics, PacelineError> {
        let (policies, instances) = match &self.backend {
            StoreBackend::InMemory(store) => (store.policy_count()?, store.instances()?),
            StoreBackend::Persistent(store) => (store.policy_count()?, store.instances()?),
        };

        let mut metrics = EngineMetrics {
            policies,
            instances: instances.len(),
            open: 0,
            on_time: 0,
            overdue: 0,
            expired: 0,
            closed: 0,
        };

        for (_, record) in instances {
            match StageClock::compute_status(&record.instance, now) {
                StageStatus::OnTime => {
                    metrics.open = metrics.open.saturating_add(1);
                    metrics.on_time = metrics.on_time.saturating_add(1);
                }
                StageStatus::Overdue => {
                    metrics.open = metrics.open.saturating_add(1);
                    metrics.overdue = metrics.overdue.saturating_add(1);
                }
                StageStatus::Expired => {
                    metrics.open = metrics.open.saturating_add(1);
                    metrics.expired = metrics.expired.saturating_add(1);
                }
                StageStatus::Completed | StageStatus::Cancelled => {
                    metrics.closed = metrics.closed.saturating_add(1);
                }
            }
        }

        Ok(metrics)
    }
}

/// Load, transform, conditionally save; reload and retry on conflict.
///
/// Business-rule rejections from `transform` surface immediately. Only a
/// [`PacelineError::WriteConflict`] from the save triggers a reload, at most
/// `CONFLICT_RETRY_LIMIT` times.
fn mutate_with_retry<S, F>(
    store: &mut S,
    id: InstanceId,
    transform: &F,
) -> Result<VersionedInstance, PacelineError>
where
    S: InstanceStore,
    F: Fn(&StageInstance) -> Result<StageInstance, PacelineError>,
{
    let mut attempts: u32 = 0;
    loop {
        let Some(current) = store.load_instance(id)? else {
            return Err(PacelineError::InstanceNotFound(id));
        };

        let updated = transform(&current.instance)?;

        match store.save_instance(id, &updated, current.version) {
            Ok(version) => {
                return Ok(VersionedInstance {
                    version,
                    instance: updated,
                });
            }
            Err(PacelineError::WriteConflict { .. }) if attempts < CONFLICT_RETRY_LIMIT => {
                attempts = attempts.saturating_add(1);
            }
            Err(e) => return Err(e),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
