//! # Stage Instance Clock
//!
//! The pure deadline computation for the Paceline CORE.
//!
//! Status is a function of exactly four inputs: the evaluation instant, the
//! policy snapshot, the start timestamp, and the extensions granted so far.
//! "Now" is always an explicit argument, never sampled inside; the same
//! inputs always yield the same status. Status is never stored.
//!
//! Boundary semantics:
//! - `now == due_at` is already OVERDUE (the allotted time is over)
//! - `now == expiry_at` is already EXPIRED (the grace period is over)

use crate::types::{OwnerRole, PolicySnapshot, StageInstance, StageStatus};
use chrono::{DateTime, Duration, Utc};

/// The StageClock consolidates all deadline arithmetic.
///
/// No I/O, no mutation, no hidden state. Integer day arithmetic only,
/// saturating so a pathological snapshot can never wrap.
pub struct StageClock;

impl StageClock {
    /// The nominal duration plus all granted extensions, in days.
    ///
    /// `duration_days + extensions_granted * extension_days`, computed in
    /// `u64` with saturating arithmetic.
    #[must_use]
    pub fn effective_duration_days(policy: &PolicySnapshot, extensions_granted: u32) -> u64 {
        u64::from(policy.duration_days).saturating_add(
            u64::from(extensions_granted).saturating_mul(u64::from(policy.extension_days)),
        )
    }

    /// The instant the stage becomes overdue.
    #[must_use]
    pub fn due_at(instance: &StageInstance) -> DateTime<Utc> {
        let days = Self::effective_duration_days(&instance.policy, instance.extensions_granted);
        add_days(instance.started_at, days)
    }

    /// The instant the stage expires (due instant plus grace period).
    #[must_use]
    pub fn expiry_at(instance: &StageInstance) -> DateTime<Utc> {
        add_days(Self::due_at(instance), u64::from(instance.policy.grace_days))
    }

    /// Compute the status of an instance at the given instant.
    ///
    /// Closed instances report their terminal close status regardless of
    /// `now`. Open instances report:
    /// - `now < due_at` → OnTime
    /// - `due_at <= now < expiry_at` → Overdue
    /// - `now >= expiry_at` → Expired
    #[must_use]
    pub fn compute_status(instance: &StageInstance, now: DateTime<Utc>) -> StageStatus {
        if let Some(closure) = &instance.closed {
            return closure.status.into();
        }

        let due = Self::due_at(instance);
        let expiry = Self::expiry_at(instance);

        if now < due {
            StageStatus::OnTime
        } else if now < expiry {
            StageStatus::Overdue
        } else {
            StageStatus::Expired
        }
    }
}

/// Add whole days to a timestamp, clamping to the maximum representable
/// instant instead of overflowing.
fn add_days(ts: DateTime<Utc>, days: u64) -> DateTime<Utc> {
    let delta = i64::try_from(days)
        .ok()
        .and_then(Duration::try_days)
        .unwrap_or(Duration::MAX);
    ts.checked_add_signed(delta).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// =============================================================================
// ESCALATION
// =============================================================================

/// The consequence of a deadline state, differentiated by owner role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Escalation {
    /// No action required.
    None,
    /// Notify the owner; the stage is not blocked.
    Reminder,
    /// Hard stop: the instance cannot proceed without an administrator.
    AdminIntervention,
}

impl Escalation {
    /// Get the escalation as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Escalation::None => "none",
            Escalation::Reminder => "reminder",
            Escalation::AdminIntervention => "admin_intervention",
        }
    }
}

impl std::fmt::Display for Escalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map a status and owner role to its escalation.
///
/// The role is an input to this decision, never derived by the clock:
/// - Overdue, either role → Reminder
/// - Expired, applicant-owned → AdminIntervention (hard stop)
/// - Expired, staff-owned → Reminder (staff stages are never blocked)
/// - OnTime and terminal statuses → None
#[must_use]
pub fn escalation(status: StageStatus, owner: OwnerRole) -> Escalation {
    match (status, owner) {
        (StageStatus::Overdue, _) => Escalation::Reminder,
        (StageStatus::Expired, OwnerRole::Applicant) => Escalation::AdminIntervention,
        (StageStatus::Expired, OwnerRole::Staff) => Escalation::Reminder,
        (
            StageStatus::OnTime | StageStatus::Completed | StageStatus::Cancelled,
            _,
        ) => Escalation::None,
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CloseStatus, Closure, StageName};
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).single().expect("ts")
    }

    fn instance(duration_days: u32, grace_days: u32, extensions_granted: u32) -> StageInstance {
        StageInstance {
            stage: StageName::new("evaluation"),
            owner: OwnerRole::Staff,
            started_at: start(),
            policy: PolicySnapshot {
                duration_days,
                grace_days,
                allow_extensions: true,
                max_extensions: 1,
                extension_days: 3,
            },
            extensions_granted,
            closed: None,
        }
    }

    #[test]
    fn effective_duration_includes_extensions() {
        let policy = PolicySnapshot {
            duration_days: 5,
            grace_days: 2,
            allow_extensions: true,
            max_extensions: 2,
            extension_days: 3,
        };

        assert_eq!(StageClock::effective_duration_days(&policy, 0), 5);
        assert_eq!(StageClock::effective_duration_days(&policy, 1), 8);
        assert_eq!(StageClock::effective_duration_days(&policy, 2), 11);
    }

    #[test]
    fn effective_duration_saturates() {
        let policy = PolicySnapshot {
            duration_days: u32::MAX,
            grace_days: 0,
            allow_extensions: true,
            max_extensions: u32::MAX,
            extension_days: u32::MAX,
        };

        assert_eq!(
            StageClock::effective_duration_days(&policy, u32::MAX),
            u64::MAX
        );
    }

    #[test]
    fn worked_scenario_without_extension() {
        // duration 5d, grace 2d: due = T+5d, expiry = T+7d
        let inst = instance(5, 2, 0);

        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(4)),
            StageStatus::OnTime
        );
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(5)),
            StageStatus::Overdue
        );
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(6)),
            StageStatus::Overdue
        );
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(7)),
            StageStatus::Expired
        );
    }

    #[test]
    fn worked_scenario_with_extension() {
        // One 3-day extension shifts due to T+8d, expiry to T+10d
        let inst = instance(5, 2, 1);

        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(7)),
            StageStatus::OnTime
        );
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(8)),
            StageStatus::Overdue
        );
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(10)),
            StageStatus::Expired
        );
    }

    #[test]
    fn due_instant_is_already_overdue() {
        let inst = instance(5, 2, 0);
        let due = StageClock::due_at(&inst);

        assert_eq!(
            StageClock::compute_status(&inst, due - Duration::seconds(1)),
            StageStatus::OnTime
        );
        assert_eq!(StageClock::compute_status(&inst, due), StageStatus::Overdue);
    }

    #[test]
    fn expiry_instant_is_already_expired() {
        let inst = instance(5, 2, 0);
        let expiry = StageClock::expiry_at(&inst);

        assert_eq!(
            StageClock::compute_status(&inst, expiry - Duration::seconds(1)),
            StageStatus::Overdue
        );
        assert_eq!(
            StageClock::compute_status(&inst, expiry),
            StageStatus::Expired
        );
    }

    #[test]
    fn zero_grace_skips_overdue_window() {
        // With grace 0 the due instant and expiry instant coincide;
        // the expiry boundary wins
        let inst = instance(5, 0, 0);
        let due = StageClock::due_at(&inst);

        assert_eq!(due, StageClock::expiry_at(&inst));
        assert_eq!(StageClock::compute_status(&inst, due), StageStatus::Expired);
    }

    #[test]
    fn closed_instance_reports_terminal_status() {
        let mut inst = instance(5, 2, 0);
        inst.closed = Some(Closure {
            at: start() + Duration::days(3),
            status: CloseStatus::Completed,
        });

        // Terminal even long past expiry
        assert_eq!(
            StageClock::compute_status(&inst, start() + Duration::days(100)),
            StageStatus::Completed
        );

        inst.closed = Some(Closure {
            at: start() + Duration::days(3),
            status: CloseStatus::Cancelled,
        });
        assert_eq!(
            StageClock::compute_status(&inst, start()),
            StageStatus::Cancelled
        );
    }

    #[test]
    fn pathological_snapshot_clamps_instead_of_overflowing() {
        let inst = instance(u32::MAX, u32::MAX, u32::MAX);

        assert_eq!(StageClock::due_at(&inst), DateTime::<Utc>::MAX_UTC);
        assert_eq!(StageClock::expiry_at(&inst), DateTime::<Utc>::MAX_UTC);
        assert_eq!(
            StageClock::compute_status(&inst, start()),
            StageStatus::OnTime
        );
    }

    #[test]
    fn escalation_mapping() {
        use Escalation as E;
        use OwnerRole::{Applicant, Staff};
        use StageStatus as S;

        assert_eq!(escalation(S::OnTime, Staff), E::None);
        assert_eq!(escalation(S::OnTime, Applicant), E::None);
        assert_eq!(escalation(S::Overdue, Staff), E::Reminder);
        assert_eq!(escalation(S::Overdue, Applicant), E::Reminder);
        assert_eq!(escalation(S::Expired, Staff), E::Reminder);
        assert_eq!(escalation(S::Expired, Applicant), E::AdminIntervention);
        assert_eq!(escalation(S::Completed, Applicant), E::None);
        assert_eq!(escalation(S::Cancelled, Staff), E::None);
    }

    fn status_rank(status: StageStatus) -> u8 {
        match status {
            StageStatus::OnTime => 0,
            StageStatus::Overdue => 1,
            StageStatus::Expired => 2,
            StageStatus::Completed | StageStatus::Cancelled => 3,
        }
    }

    proptest! {
        #[test]
        fn compute_status_is_deterministic(
            duration in 1u32..3650,
            grace in 0u32..365,
            granted in 0u32..100,
            offset_hours in 0i64..200_000,
        ) {
            let inst = instance(duration, grace, granted);
            let now = start() + Duration::hours(offset_hours);

            let first = StageClock::compute_status(&inst, now);
            let second = StageClock::compute_status(&inst, now);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn open_status_is_monotone_in_time(
            duration in 1u32..3650,
            grace in 0u32..365,
            granted in 0u32..100,
            earlier_hours in 0i64..200_000,
            delta_hours in 0i64..200_000,
        ) {
            let inst = instance(duration, grace, granted);
            let earlier = start() + Duration::hours(earlier_hours);
            let later = earlier + Duration::hours(delta_hours);

            let rank_earlier = status_rank(StageClock::compute_status(&inst, earlier));
            let rank_later = status_rank(StageClock::compute_status(&inst, later));
            prop_assert!(rank_earlier <= rank_later);
        }

        #[test]
        fn extension_never_shortens_deadline(
            duration in 1u32..3650,
            grace in 0u32..365,
            granted in 0u32..99,
        ) {
            let before = instance(duration, grace, granted);
            let after = instance(duration, grace, granted + 1);

            prop_assert!(StageClock::due_at(&after) >= StageClock::due_at(&before));
            prop_assert!(StageClock::expiry_at(&after) >= StageClock::expiry_at(&before));
        }
    }
}
