//! # Core Type Definitions
//!
//! This module contains all core types for the Paceline SLA engine:
//! - Identifiers (`StageName`, `InstanceId`, `Version`)
//! - Policy records (`SlaPolicy`, `PolicySnapshot`)
//! - Stage instance records (`StageInstance`, `Closure`)
//! - Status enums (`StageStatus`, `CloseStatus`, `OwnerRole`)
//! - Error types (`PacelineError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (no floating-point)
//! - Implement `Ord` where used as `BTreeMap` keys for deterministic ordering
//! - Use saturating arithmetic for counters to prevent overflow

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a workflow stage, e.g. `supervisor_review`.
/// One SLA policy exists per stage name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StageName(pub String);

impl StageName {
    /// Create a new stage name from a string.
    #[must_use]
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the stage name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for StageName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Unique identifier for a stage instance (one submission occupying one stage).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstanceId(pub u64);

impl std::fmt::Display for InstanceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Version of a persisted stage-instance record.
///
/// Conditional writes compare against this value; a mismatch means another
/// writer got there first and the caller must reload.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Version(pub u64);

impl Version {
    /// The version assigned to a freshly inserted record.
    #[must_use]
    pub const fn initial() -> Self {
        Self(1)
    }

    /// The version after one successful conditional write.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }

    /// Get the raw version value.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }
}

// =============================================================================
// SLA POLICY
// =============================================================================

/// The SLA policy for one workflow stage.
///
/// Invariants (enforced by [`crate::policy::validate_policy`] before any
/// persistence):
/// - `duration_days >= 1`
/// - if `allow_extensions` then `max_extensions >= 1` and `extension_days >= 1`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlaPolicy {
    /// The stage this policy governs (unique key).
    pub stage: StageName,
    /// Nominal time allotted for the stage, in days.
    pub duration_days: u32,
    /// Buffer after the nominal duration before the instance expires, in days.
    pub grace_days: u32,
    /// Whether extensions may be granted for this stage.
    pub allow_extensions: bool,
    /// Maximum number of extensions, meaningful only if `allow_extensions`.
    pub max_extensions: u32,
    /// Days added per granted extension, meaningful only if `allow_extensions`.
    pub extension_days: u32,
    /// Inactive policies are never applied to NEW stage instances.
    /// Existing instances keep their snapshot regardless.
    pub is_active: bool,
}

impl SlaPolicy {
    /// Capture the clock-relevant fields for a new stage instance.
    ///
    /// The snapshot is immutable for the instance's lifetime: policy edits
    /// apply only to instances opened afterwards.
    #[must_use]
    pub fn snapshot(&self) -> PolicySnapshot {
        PolicySnapshot {
            duration_days: self.duration_days,
            grace_days: self.grace_days,
            allow_extensions: self.allow_extensions,
            max_extensions: self.max_extensions,
            extension_days: self.extension_days,
        }
    }
}

/// The policy values captured when a stage instance is opened.
///
/// Decoupled from later policy edits so that an instance's deadlines never
/// shift retroactively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicySnapshot {
    /// Nominal duration in days.
    pub duration_days: u32,
    /// Grace period in days.
    pub grace_days: u32,
    /// Whether extensions may be granted.
    pub allow_extensions: bool,
    /// Maximum number of extensions.
    pub max_extensions: u32,
    /// Days added per extension.
    pub extension_days: u32,
}

// =============================================================================
// ROLES & STATUSES
// =============================================================================

/// The role that owns a stage instance.
///
/// The owner determines the consequence of missing a deadline (see
/// [`crate::clock::escalation`]); it is an input to that decision, never
/// derived by the clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerRole {
    /// Supervisor / evaluator stages. Deadline misses remind, never block.
    Staff,
    /// Applicant-owned stages. Expiry is a hard stop requiring admin action.
    Applicant,
}

impl OwnerRole {
    /// Get the role as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            OwnerRole::Staff => "staff",
            OwnerRole::Applicant => "applicant",
        }
    }
}

impl std::str::FromStr for OwnerRole {
    type Err = PacelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "staff" => Ok(OwnerRole::Staff),
            "applicant" => Ok(OwnerRole::Applicant),
            other => Err(PacelineError::InvalidOwnerRole {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for OwnerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal outcome of a stage instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseStatus {
    /// The stage was completed normally.
    Completed,
    /// The stage was cancelled (submission withdrawn, admin intervention).
    Cancelled,
}

impl CloseStatus {
    /// Get the close status as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseStatus::Completed => "completed",
            CloseStatus::Cancelled => "cancelled",
        }
    }
}

impl std::str::FromStr for CloseStatus {
    type Err = PacelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(CloseStatus::Completed),
            "cancelled" => Ok(CloseStatus::Cancelled),
            other => Err(PacelineError::InvalidCloseStatus {
                value: other.to_string(),
            }),
        }
    }
}

impl std::fmt::Display for CloseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Deadline status of a stage instance at a given instant.
///
/// Derived by [`crate::clock::StageClock::compute_status`]; never stored,
/// so it can never drift from the inputs it is computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Before the due instant.
    OnTime,
    /// At or past the due instant, still inside the grace period.
    Overdue,
    /// At or past the expiry instant.
    Expired,
    /// Closed as completed.
    Completed,
    /// Closed as cancelled.
    Cancelled,
}

impl StageStatus {
    /// Get the status as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::OnTime => "on_time",
            StageStatus::Overdue => "overdue",
            StageStatus::Expired => "expired",
            StageStatus::Completed => "completed",
            StageStatus::Cancelled => "cancelled",
        }
    }

    /// Check if this status is terminal (the clock no longer applies).
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Cancelled)
    }
}

impl From<CloseStatus> for StageStatus {
    fn from(status: CloseStatus) -> Self {
        match status {
            CloseStatus::Completed => StageStatus::Completed,
            CloseStatus::Cancelled => StageStatus::Cancelled,
        }
    }
}

impl std::fmt::Display for StageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// STAGE INSTANCE
// =============================================================================

/// The terminal record of a closed stage instance.
///
/// Timestamp and status travel together so they can never be set
/// independently or drift apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Closure {
    /// When the instance left the stage.
    pub at: DateTime<Utc>,
    /// How the instance left the stage.
    pub status: CloseStatus,
}

/// One concrete occurrence of a submission occupying a workflow stage.
///
/// Mutated only through [`crate::lifecycle::LifecycleEngine`]: extension
/// grants (bounded `+1` on `extensions_granted`) and closing (exactly once).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageInstance {
    /// The stage this instance occupies.
    pub stage: StageName,
    /// Which role owns the stage deadline.
    pub owner: OwnerRole,
    /// When the instance entered this stage.
    pub started_at: DateTime<Utc>,
    /// Policy values captured at creation time.
    pub policy: PolicySnapshot,
    /// Extensions granted so far, bounded by `policy.max_extensions`.
    pub extensions_granted: u32,
    /// Set exactly once when the instance leaves the stage.
    pub closed: Option<Closure>,
}

impl StageInstance {
    /// Check whether the instance has been closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }
}

// =============================================================================
// POLICY FIELDS (validation tagging)
// =============================================================================

/// The policy field that violated an invariant.
///
/// Returned inside [`PacelineError::InvalidPolicy`] so callers can highlight
/// the offending form field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyField {
    /// The `stage` name.
    Stage,
    /// The `duration_days` field.
    DurationDays,
    /// The `grace_days` field.
    GraceDays,
    /// The `max_extensions` field.
    MaxExtensions,
    /// The `extension_days` field.
    ExtensionDays,
}

impl PolicyField {
    /// Get the field name as it appears in the policy record.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            PolicyField::Stage => "stage",
            PolicyField::DurationDays => "duration_days",
            PolicyField::GraceDays => "grace_days",
            PolicyField::MaxExtensions => "max_extensions",
            PolicyField::ExtensionDays => "extension_days",
        }
    }
}

impl std::fmt::Display for PolicyField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the Paceline engine.
///
/// - No silent failures
/// - Business-rule violations are returned as values, never panics
/// - Only persistence failures (`IoError`, `SerializationError`) are
///   unexpected; everything else is recoverable by the caller
#[derive(Debug, Error)]
pub enum PacelineError {
    /// No SLA policy is configured for the stage. Fatal for instance
    /// creation: the workflow transition must be blocked rather than
    /// defaulting to an arbitrary duration.
    #[error("no SLA policy configured for stage '{0}'")]
    PolicyNotFound(StageName),

    /// The policy exists but is inactive and must not govern new instances.
    #[error("SLA policy for stage '{0}' is inactive")]
    PolicyInactive(StageName),

    /// A policy edit violated an invariant. Rejected before persistence,
    /// never partially applied.
    #[error("invalid policy field {field}: {reason}")]
    InvalidPolicy {
        /// The first field that violated a constraint.
        field: PolicyField,
        /// Why the value was rejected.
        reason: String,
    },

    /// The stage policy does not allow extensions.
    #[error("extensions are disabled for this stage")]
    ExtensionsDisabled,

    /// All permitted extensions have already been granted.
    #[error("extension limit reached: {granted} of {max} already granted")]
    ExtensionLimitReached {
        /// Extensions granted so far.
        granted: u32,
        /// The policy's maximum.
        max: u32,
    },

    /// The stage instance has already been closed.
    #[error("stage instance is already closed")]
    StageAlreadyClosed,

    /// The requested stage instance does not exist.
    #[error("stage instance not found: {0}")]
    InstanceNotFound(InstanceId),

    /// A conditional write lost a race with a concurrent writer.
    #[error("concurrent write detected: expected version {expected}, found {actual}")]
    WriteConflict {
        /// The version the writer read before modifying.
        expected: u64,
        /// The version actually persisted.
        actual: u64,
    },

    /// An owner role string could not be parsed.
    #[error("invalid owner role: {value}")]
    InvalidOwnerRole {
        /// The invalid value provided.
        value: String,
    },

    /// A close status string could not be parsed.
    #[error("invalid close status: {value}")]
    InvalidCloseStatus {
        /// The invalid value provided.
        value: String,
    },

    /// A serialization or deserialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred in the persistence layer.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_initial_and_next() {
        let v = Version::initial();
        assert_eq!(v.value(), 1);
        assert_eq!(v.next().value(), 2);
    }

    #[test]
    fn version_next_saturates() {
        let v = Version(u64::MAX);
        assert_eq!(v.next().value(), u64::MAX);
    }

    #[test]
    fn owner_role_round_trip() {
        for role in [OwnerRole::Staff, OwnerRole::Applicant] {
            let parsed: OwnerRole = role.as_str().parse().expect("parse");
            assert_eq!(parsed, role);
        }
    }

    #[test]
    fn owner_role_rejects_unknown() {
        let err = "auditor".parse::<OwnerRole>().expect_err("must fail");
        assert!(matches!(err, PacelineError::InvalidOwnerRole { .. }));
    }

    #[test]
    fn close_status_round_trip() {
        for status in [CloseStatus::Completed, CloseStatus::Cancelled] {
            let parsed: CloseStatus = status.as_str().parse().expect("parse");
            assert_eq!(parsed, status);
        }
    }

    #[test]
    fn stage_status_terminal() {
        assert!(StageStatus::Completed.is_terminal());
        assert!(StageStatus::Cancelled.is_terminal());
        assert!(!StageStatus::OnTime.is_terminal());
        assert!(!StageStatus::Overdue.is_terminal());
        assert!(!StageStatus::Expired.is_terminal());
    }

    #[test]
    fn close_status_maps_to_stage_status() {
        assert_eq!(
            StageStatus::from(CloseStatus::Completed),
            StageStatus::Completed
        );
        assert_eq!(
            StageStatus::from(CloseStatus::Cancelled),
            StageStatus::Cancelled
        );
    }

    #[test]
    fn snapshot_captures_clock_fields() {
        let policy = SlaPolicy {
            stage: StageName::new("evaluation"),
            duration_days: 10,
            grace_days: 2,
            allow_extensions: true,
            max_extensions: 3,
            extension_days: 5,
            is_active: true,
        };

        let snapshot = policy.snapshot();
        assert_eq!(snapshot.duration_days, 10);
        assert_eq!(snapshot.grace_days, 2);
        assert!(snapshot.allow_extensions);
        assert_eq!(snapshot.max_extensions, 3);
        assert_eq!(snapshot.extension_days, 5);
    }
}
