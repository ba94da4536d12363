//! # Innate Primitives
//!
//! Hardcoded runtime constants for the Paceline CORE.
//!
//! Paceline starts with zero data but fixed logic.
//! These bounds are compiled into the binary and are immutable at runtime.
//! Every value that crosses the API boundary is checked against them before
//! it reaches the engine.

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for stage names.
///
/// Stage names longer than this will be rejected by policy validation.
/// This prevents memory exhaustion from malicious or malformed input.
pub const MAX_STAGE_NAME_LENGTH: usize = 128;

/// Maximum nominal duration for a stage, in days (ten years).
///
/// An SLA longer than this is almost certainly a data-entry error and is
/// rejected rather than silently accepted.
pub const MAX_DURATION_DAYS: u32 = 3650;

/// Maximum grace period, in days (one year).
pub const MAX_GRACE_DAYS: u32 = 365;

/// Maximum days granted per extension, in days (one year).
pub const MAX_EXTENSION_DAYS: u32 = 365;

/// Maximum number of extensions a single policy may permit.
///
/// Bounds `extensions_granted * extension_days` so deadline arithmetic
/// stays far away from timestamp overflow.
pub const MAX_EXTENSIONS: u32 = 100;

// =============================================================================
// CONCURRENCY
// =============================================================================

/// How many times a conditional write is retried after a version conflict
/// before the conflict is surfaced to the caller.
///
/// - Retry means: reload the record, re-check business rules, write again.
/// - One retry absorbs the common interleaving; repeated conflicts are
///   surfaced as [`crate::types::PacelineError::WriteConflict`].
pub const CONFLICT_RETRY_LIMIT: u32 = 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_retry_limit_is_one() {
        // Reload-and-retry happens exactly once
        assert_eq!(CONFLICT_RETRY_LIMIT, 1);
    }

    #[test]
    fn extension_arithmetic_cannot_overflow_u64() {
        // Worst case effective duration must fit comfortably in u64 days
        let worst = u64::from(MAX_DURATION_DAYS)
            + u64::from(MAX_EXTENSIONS) * u64::from(MAX_EXTENSION_DAYS)
            + u64::from(MAX_GRACE_DAYS);
        assert!(worst < 100_000);
    }
}
