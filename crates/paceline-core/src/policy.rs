//! # SLA Policy Resolver
//!
//! Resolution and validation of SLA policies for the Paceline CORE.
//!
//! Resolution is a plain lookup: stage name in, policy out. A missing policy
//! is an error, never a fallback duration; the caller must block the workflow
//! transition instead of guessing a deadline.
//!
//! Validation runs before any persistence. A policy edit that violates a
//! constraint is rejected whole, tagged with the first offending field.

use crate::primitives::{
    MAX_DURATION_DAYS, MAX_EXTENSIONS, MAX_EXTENSION_DAYS, MAX_GRACE_DAYS, MAX_STAGE_NAME_LENGTH,
};
use crate::store::PolicyStore;
use crate::types::{PacelineError, PolicyField, SlaPolicy, StageName};

/// The PolicyResolver consolidates policy lookup for the engine.
///
/// The CORE is a closed system: no default policies are invented at
/// resolution time, only what the store holds is ever returned.
pub struct PolicyResolver;

impl PolicyResolver {
    /// Look up the policy for a stage.
    ///
    /// Returns [`PacelineError::PolicyNotFound`] when the stage has no
    /// configured policy. Inactive policies are returned as-is; instances
    /// already opened under them are governed by their snapshot anyway.
    pub fn resolve<S: PolicyStore>(
        store: &S,
        stage: &StageName,
    ) -> Result<SlaPolicy, PacelineError> {
        store
            .load_policy(stage)?
            .ok_or_else(|| PacelineError::PolicyNotFound(stage.clone()))
    }

    /// Look up the policy that will govern a NEW stage instance.
    ///
    /// Like [`Self::resolve`], but additionally rejects inactive policies
    /// with [`PacelineError::PolicyInactive`]: an inactive policy must never
    /// be snapshotted into a fresh instance.
    pub fn resolve_for_open<S: PolicyStore>(
        store: &S,
        stage: &StageName,
    ) -> Result<SlaPolicy, PacelineError> {
        let policy = Self::resolve(store, stage)?;
        if !policy.is_active {
            return Err(PacelineError::PolicyInactive(stage.clone()));
        }
        Ok(policy)
    }
}

// =============================================================================
// VALIDATION
// =============================================================================

/// Validate a policy before it is persisted.
///
/// Checks run in field order; the first violated constraint is returned as
/// [`PacelineError::InvalidPolicy`] and nothing is applied.
pub fn validate_policy(policy: &SlaPolicy) -> Result<(), PacelineError> {
    if policy.stage.as_str().is_empty() {
        return Err(PacelineError::InvalidPolicy {
            field: PolicyField::Stage,
            reason: "stage name must not be empty".to_string(),
        });
    }
    if policy.stage.as_str().len() > MAX_STAGE_NAME_LENGTH {
        return Err(PacelineError::InvalidPolicy {
            field: PolicyField::Stage,
            reason: format!("stage name exceeds {MAX_STAGE_NAME_LENGTH} bytes"),
        });
    }

    if policy.duration_days < 1 {
        return Err(PacelineError::InvalidPolicy {
            field: PolicyField::DurationDays,
            reason: "duration_days must be at least 1".to_string(),
        });
    }
    if policy.duration_days > MAX_DURATION_DAYS {
        return Err(PacelineError::InvalidPolicy {
            field: PolicyField::DurationDays,
            reason: format!("duration_days exceeds {MAX_DURATION_DAYS}"),
        });
    }

    if policy.grace_days > MAX_GRACE_DAYS {
        return Err(PacelineError::InvalidPolicy {
            field: PolicyField::GraceDays,
            reason: format!("grace_days exceeds {MAX_GRACE_DAYS}"),
        });
    }

    if policy.allow_extensions {
        if policy.max_extensions < 1 {
            return Err(PacelineError::InvalidPolicy {
                field: PolicyField::MaxExtensions,
                reason: "max_extensions must be at least 1 when extensions are allowed"
                    .to_string(),
            });
        }
        if policy.max_extensions > MAX_EXTENSIONS {
            return Err(PacelineError::InvalidPolicy {
                field: PolicyField::MaxExtensions,
                reason: format!("max_extensions exceeds {MAX_EXTENSIONS}"),
            });
        }
        if policy.extension_days < 1 {
            return Err(PacelineError::InvalidPolicy {
                field: PolicyField::ExtensionDays,
                reason: "extension_days must be at least 1 when extensions are allowed"
                    .to_string(),
            });
        }
        if policy.extension_days > MAX_EXTENSION_DAYS {
            return Err(PacelineError::InvalidPolicy {
                field: PolicyField::ExtensionDays,
                reason: format!("extension_days exceeds {MAX_EXTENSION_DAYS}"),
            });
        }
    }

    Ok(())
}

// =============================================================================
// SEED POLICIES
// =============================================================================

/// The seed policy set for a fresh database.
///
/// One policy per workflow stage of the review pipeline, applied by
/// `init --seed`. Operators are expected to tune these afterwards.
#[must_use]
pub fn default_policies() -> Vec<SlaPolicy> {
    vec![
        SlaPolicy {
            stage: StageName::new("supervisor_review"),
            duration_days: 14,
            grace_days: 3,
            allow_extensions: true,
            max_extensions: 2,
            extension_days: 7,
            is_active: true,
        },
        SlaPolicy {
            stage: StageName::new("evaluation"),
            duration_days: 30,
            grace_days: 5,
            allow_extensions: true,
            max_extensions: 1,
            extension_days: 14,
            is_active: true,
        },
        SlaPolicy {
            stage: StageName::new("revision_requested"),
            duration_days: 21,
            grace_days: 7,
            allow_extensions: true,
            max_extensions: 3,
            extension_days: 7,
            is_active: true,
        },
        SlaPolicy {
            stage: StageName::new("materials_requested"),
            duration_days: 10,
            grace_days: 2,
            allow_extensions: true,
            max_extensions: 1,
            extension_days: 5,
            is_active: true,
        },
        SlaPolicy {
            stage: StageName::new("certificate_issued"),
            duration_days: 5,
            grace_days: 1,
            allow_extensions: false,
            max_extensions: 0,
            extension_days: 0,
            is_active: true,
        },
    ]
}

// =============================================================================
// TESTS
// =============================================================================
