use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::store::{AppointmentQuery, BlockedSlotQuery};
use super::EngineError;

/// Everything a candidate span collides with. Empty means schedulable.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictReport {
    pub overlapping_appointments: Vec<AppointmentRecord>,
    pub overlapping_blocked_slots: Vec<BlockedSlot>,
}

impl ConflictReport {
    pub fn is_empty(&self) -> bool {
        self.overlapping_appointments.is_empty() && self.overlapping_blocked_slots.is_empty()
    }

    pub fn len(&self) -> usize {
        self.overlapping_appointments.len() + self.overlapping_blocked_slots.len()
    }
}

pub(crate) fn validate_span(span: &Span) -> Result<(), EngineError> {
    if span.end <= span.start {
        return Err(EngineError::InvalidInterval {
            start: span.start,
            end: span.end,
        });
    }
    if span.start < MIN_VALID_TIMESTAMP_MS || span.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if span.duration_ms() > MAX_SPAN_DURATION_MS {
        return Err(EngineError::LimitExceeded("span too wide"));
    }
    Ok(())
}

/// Coarse window handed to the query collaborators: whole days around the candidate.
pub fn date_range_hint(candidate: &Span) -> Span {
    candidate.day_bounds()
}

/// Collect every occupying appointment and blocked slot of `provider_id` that
/// overlaps `candidate`. `exclude` skips the appointment being re-validated.
pub async fn check_conflicts(
    appointments: &dyn AppointmentQuery,
    blocked: &dyn BlockedSlotQuery,
    provider_id: Ulid,
    candidate: Span,
    exclude: Option<Ulid>,
) -> Result<ConflictReport, EngineError> {
    candidate.duration()?;
    let hint = date_range_hint(&candidate);

    let overlapping_appointments = appointments
        .find_appointments(provider_id, hint)
        .await?
        .into_iter()
        .filter(|a| a.provider_id == provider_id)
        .filter(|a| Some(a.id) != exclude)
        .filter(AppointmentRecord::blocks_others)
        .filter(|a| a.span.overlaps(&candidate))
        .collect();

    let overlapping_blocked_slots = blocked
        .find_blocked_slots(provider_id, hint)
        .await?
        .into_iter()
        .filter(|b| b.provider_id == provider_id)
        .filter(|b| b.span.overlaps(&candidate))
        .collect();

    Ok(ConflictReport {
        overlapping_appointments,
        overlapping_blocked_slots,
    })
}
