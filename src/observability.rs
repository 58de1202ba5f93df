use crate::appointment::AppointmentState;
use crate::engine::EngineError;

// ── Scheduling outcomes ─────────────────────────────────────────

/// Counter: validation passes run by the scheduler. Labels: outcome.
pub const VALIDATIONS_TOTAL: &str = "appointments_validations_total";

/// Counter: bookings, reschedules or reactivations refused because of overlaps.
pub const CONFLICTS_TOTAL: &str = "appointments_conflicts_total";

/// Counter: appointments written (new or rescheduled).
pub const COMMITS_TOTAL: &str = "appointments_commits_total";

// ── WAL ─────────────────────────────────────────────────────────

/// Histogram: WAL group-commit flush duration in seconds.
pub const WAL_FLUSH_DURATION_SECONDS: &str = "appointments_wal_flush_duration_seconds";

/// Histogram: WAL group-commit batch size (events per flush).
pub const WAL_FLUSH_BATCH_SIZE: &str = "appointments_wal_flush_batch_size";

/// Counter: background compactions performed.
pub const WAL_COMPACTIONS_TOTAL: &str = "appointments_wal_compactions_total";

/// Map a validation result to a short label for metrics.
pub fn outcome_label(result: &Result<AppointmentState, EngineError>) -> &'static str {
    match result {
        Ok(AppointmentState::Validated) => "validated",
        Ok(AppointmentState::Rejected(_)) => "rejected",
        Ok(AppointmentState::Draft | AppointmentState::Committed) => "unexpected",
        Err(EngineError::NotFound(_)) => "unknown_activity",
        Err(EngineError::EmptyActivitySet) => "empty",
        Err(EngineError::DuplicateActivity(_)) => "duplicate_activity",
        Err(EngineError::InvalidInterval { .. }) => "invalid_interval",
        Err(EngineError::LimitExceeded(_)) => "limit_exceeded",
        Err(EngineError::Collaborator(_)) => "collaborator_error",
        Err(_) => "error",
    }
}
