//! # Lifecycle Engine
//!
//! Consolidates stage-instance mutation for the Paceline CORE.
//!
//! A stage instance changes in exactly two ways after it is opened:
//! a bounded extension grant (`extensions_granted + 1`) and a single close.
//! Both are expressed as pure record transitions here; persistence and
//! concurrency live in the stores and the engine facade.
//!
//! All transitions are:
//! - Deterministic
//! - Validated before anything is produced
//! - Non-mutating on failure (the input is untouched, an error is returned)

use crate::types::{
    CloseStatus, Closure, OwnerRole, PacelineError, SlaPolicy, StageInstance,
};
use chrono::{DateTime, Utc};

/// The LifecycleEngine consolidates all stage-instance transitions.
///
/// The CORE is a closed system. Every transition follows deterministic,
/// hardcoded rules; nothing here reads a clock or a store.
pub struct LifecycleEngine;

impl LifecycleEngine {
    /// Open a new stage instance under the given policy.
    ///
    /// Captures the policy snapshot at this moment; later policy edits
    /// never touch this instance. The caller must have resolved an active
    /// policy (see [`crate::policy::PolicyResolver::resolve_for_open`]).
    #[must_use]
    pub fn open_instance(
        policy: &SlaPolicy,
        owner: OwnerRole,
        started_at: DateTime<Utc>,
    ) -> StageInstance {
        StageInstance {
            stage: policy.stage.clone(),
            owner,
            started_at,
            policy: policy.snapshot(),
            extensions_granted: 0,
            closed: None,
        }
    }

    /// Grant one extension.
    ///
    /// Checks, in order:
    /// - the instance is still open ([`PacelineError::StageAlreadyClosed`])
    /// - the snapshot allows extensions ([`PacelineError::ExtensionsDisabled`])
    /// - the limit is not yet reached ([`PacelineError::ExtensionLimitReached`])
    ///
    /// On success returns a copy with `extensions_granted + 1`; the input
    /// is never mutated.
    pub fn grant_extension(instance: &StageInstance) -> Result<StageInstance, PacelineError> {
        if instance.is_closed() {
            return Err(PacelineError::StageAlreadyClosed);
        }

        if !instance.policy.allow_extensions {
            return Err(PacelineError::ExtensionsDisabled);
        }

        if instance.extensions_granted >= instance.policy.max_extensions {
            return Err(PacelineError::ExtensionLimitReached {
                granted: instance.extensions_granted,
                max: instance.policy.max_extensions,
            });
        }

        let mut granted = instance.clone();
        granted.extensions_granted = granted.extensions_granted.saturating_add(1);
        Ok(granted)
    }

    /// Close an instance, exactly once.
    ///
    /// Fails with [`PacelineError::StageAlreadyClosed`] if a closure is
    /// already recorded; a closed instance is immutable.
    pub fn close_instance(
        instance: &StageInstance,
        status: CloseStatus,
        at: DateTime<Utc>,
    ) -> Result<StageInstance, PacelineError> {
        if instance.is_closed() {
            return Err(PacelineError::StageAlreadyClosed);
        }

        let mut closed = instance.clone();
        closed.closed = Some(Closure { at, status });
        Ok(closed)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StageName;
    use chrono::{Duration, TimeZone};

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts")
    }

    fn policy() -> SlaPolicy {
        SlaPolicy {
            stage: StageName::new("evaluation"),
            duration_days: 5,
            grace_days: 2,
            allow_extensions: true,
            max_extensions: 1,
            extension_days: 3,
            is_active: true,
        }
    }

    #[test]
    fn open_captures_snapshot() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Applicant, start());

        assert_eq!(instance.stage, StageName::new("evaluation"));
        assert_eq!(instance.owner, OwnerRole::Applicant);
        assert_eq!(instance.started_at, start());
        assert_eq!(instance.policy, policy().snapshot());
        assert_eq!(instance.extensions_granted, 0);
        assert!(!instance.is_closed());
    }

    #[test]
    fn snapshot_is_isolated_from_policy_edits() {
        let mut p = policy();
        let instance = LifecycleEngine::open_instance(&p, OwnerRole::Staff, start());

        p.duration_days = 100;

        // The instance still carries the values captured at open time
        assert_eq!(instance.policy.duration_days, 5);
    }

    #[test]
    fn grant_extension_increments() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Staff, start());
        let granted = LifecycleEngine::grant_extension(&instance).expect("grant");

        assert_eq!(granted.extensions_granted, 1);
        // Input untouched
        assert_eq!(instance.extensions_granted, 0);
    }

    #[test]
    fn grant_extension_at_limit_fails() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Staff, start());
        let granted = LifecycleEngine::grant_extension(&instance).expect("grant");

        let err = LifecycleEngine::grant_extension(&granted).expect_err("limit");
        assert!(matches!(
            err,
            PacelineError::ExtensionLimitReached { granted: 1, max: 1 }
        ));
        // The failed grant must not have changed the record
        assert_eq!(granted.extensions_granted, 1);
    }

    #[test]
    fn grant_extension_disabled_fails() {
        let mut p = policy();
        p.allow_extensions = false;
        let instance = LifecycleEngine::open_instance(&p, OwnerRole::Staff, start());

        let err = LifecycleEngine::grant_extension(&instance).expect_err("disabled");
        assert!(matches!(err, PacelineError::ExtensionsDisabled));
    }

    #[test]
    fn grant_extension_on_closed_instance_fails() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Staff, start());
        let closed = LifecycleEngine::close_instance(
            &instance,
            CloseStatus::Completed,
            start() + Duration::days(3),
        )
        .expect("close");

        let err = LifecycleEngine::grant_extension(&closed).expect_err("closed");
        assert!(matches!(err, PacelineError::StageAlreadyClosed));
    }

    #[test]
    fn close_records_closure() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Staff, start());
        let at = start() + Duration::days(4);

        let closed =
            LifecycleEngine::close_instance(&instance, CloseStatus::Cancelled, at).expect("close");

        assert_eq!(
            closed.closed,
            Some(Closure {
                at,
                status: CloseStatus::Cancelled
            })
        );
        // Input untouched
        assert!(!instance.is_closed());
    }

    #[test]
    fn close_twice_fails() {
        let instance = LifecycleEngine::open_instance(&policy(), OwnerRole::Staff, start());
        let closed = LifecycleEngine::close_instance(
            &instance,
            CloseStatus::Completed,
            start() + Duration::days(3),
        )
        .expect("close");

        let err = LifecycleEngine::close_instance(
            &closed,
            CloseStatus::Cancelled,
            start() + Duration::days(4),
        )
        .expect_err("second close");
        assert!(matches!(err, PacelineError::StageAlreadyClosed));

        // The original closure is untouched
        assert_eq!(closed.closed.map(|c| c.status), Some(CloseStatus::Completed));
    }
}
