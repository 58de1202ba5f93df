use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::availability::free_spans;
use super::{EngineError, Scheduler};

fn check_window(window: &Span) -> Result<(), EngineError> {
    window.duration()?;
    if window.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

impl Scheduler {
    pub async fn get_appointment(&self, id: Ulid) -> Result<AppointmentRecord, EngineError> {
        self.store
            .get_appointment(&id)
            .await
            .ok_or(EngineError::NotFound(id))
    }

    /// Every appointment of the provider overlapping `window`, canceled ones included.
    pub async fn appointments_for(
        &self,
        provider_id: Ulid,
        window: Span,
    ) -> Result<Vec<AppointmentRecord>, EngineError> {
        check_window(&window)?;
        let Some(schedule) = self.store.get_schedule(&provider_id) else {
            return Ok(vec![]);
        };
        let guard = schedule.read().await;
        Ok(guard.overlapping_appointments(&window).cloned().collect())
    }

    pub async fn blocked_slots_for(
        &self,
        provider_id: Ulid,
        window: Span,
    ) -> Result<Vec<BlockedSlot>, EngineError> {
        check_window(&window)?;
        let Some(schedule) = self.store.get_schedule(&provider_id) else {
            return Ok(vec![]);
        };
        let guard = schedule.read().await;
        Ok(guard.overlapping_blocked(&window).cloned().collect())
    }

    /// Gaps in the provider's day that could take a new appointment.
    pub async fn free_spans(
        &self,
        provider_id: Ulid,
        window: Span,
        min_duration: Option<Ms>,
    ) -> Result<Vec<Span>, EngineError> {
        check_window(&window)?;
        let mut free = match self.store.get_schedule(&provider_id) {
            Some(schedule) => free_spans(&*schedule.read().await, &window),
            None => vec![window],
        };
        if let Some(min) = min_duration {
            free.retain(|span| span.duration_ms() >= min);
        }
        Ok(free)
    }

    pub fn provider_ids(&self) -> Vec<Ulid> {
        self.store.provider_ids()
    }
}
