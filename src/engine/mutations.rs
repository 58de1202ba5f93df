use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::appointment::{Appointment, AppointmentState};
use crate::limits::*;
use crate::model::*;
use crate::observability::{self, COMMITS_TOTAL, CONFLICTS_TOTAL, VALIDATIONS_TOTAL};

use super::conflict::{check_conflicts, validate_span};
use super::store::AppointmentCommit;
use super::{EngineError, Scheduler, WalCommand};

#[async_trait]
impl AppointmentCommit for Scheduler {
    /// New appointments are booked as `Pending`; committed ones are rescheduled in place.
    async fn commit(&self, appointment: &Appointment) -> Result<Ulid, EngineError> {
        let (id, event) = match appointment.id() {
            None => {
                let record = appointment.to_record(Ulid::new(), AppointmentStatus::Pending)?;
                let schedule = self.store.schedule_for(record.provider_id);
                if schedule.read().await.len() >= MAX_ENTRIES_PER_PROVIDER {
                    return Err(EngineError::LimitExceeded("too many entries for provider"));
                }
                (record.id, Event::booked(&record))
            }
            Some(id) => {
                let existing = self
                    .store
                    .get_appointment(&id)
                    .await
                    .ok_or(EngineError::NotFound(id))?;
                if existing.provider_id != appointment.provider_id() {
                    return Err(EngineError::InvalidState("appointment cannot move between providers"));
                }
                let record = appointment.to_record(id, existing.status)?;
                let event = Event::AppointmentRescheduled {
                    id,
                    provider_id: record.provider_id,
                    activity_ids: record.activity_ids,
                    span: record.span,
                    price: record.price,
                };
                (id, event)
            }
        };

        self.persist_and_apply(&event).await?;
        metrics::counter!(COMMITS_TOTAL).increment(1);
        Ok(id)
    }
}

impl Scheduler {
    /// Validate under the provider lock, then commit. A conflict comes back as
    /// `SchedulingConflict` with the full report; the appointment stays `Rejected`.
    async fn validate_and_commit(&self, appointment: &mut Appointment) -> Result<AppointmentRecord, EngineError> {
        let validated = appointment.validate(&self.validator()).await.cloned();
        metrics::counter!(VALIDATIONS_TOTAL, "outcome" => observability::outcome_label(&validated))
            .increment(1);

        if let AppointmentState::Rejected(report) = validated? {
            metrics::counter!(CONFLICTS_TOTAL).increment(1);
            debug!(
                "rejected appointment for provider {}: {} conflict(s)",
                appointment.provider_id(),
                report.len()
            );
            return Err(EngineError::SchedulingConflict(report));
        }

        let id = self.commit(appointment).await?;
        appointment.mark_committed(id)?;
        self.store
            .get_appointment(&id)
            .await
            .ok_or(EngineError::NotFound(id))
    }

    pub async fn book(&self, appointment: &mut Appointment) -> Result<AppointmentRecord, EngineError> {
        if let Some(id) = appointment.id() {
            return Err(EngineError::AlreadyExists(id));
        }
        let _guard = self.lock_provider(appointment.provider_id()).await;
        let record = self.validate_and_commit(appointment).await?;
        info!(
            "booked {} for provider {} [{}, {}) price {}",
            record.id, record.provider_id, record.span.start, record.span.end, record.price
        );
        Ok(record)
    }

    /// Move and/or change the activities of a committed appointment. The full
    /// derivation and conflict check run again, excluding the appointment itself.
    pub async fn reschedule(
        &self,
        id: Ulid,
        start: Option<Ms>,
        activity_ids: Option<Vec<Ulid>>,
    ) -> Result<AppointmentRecord, EngineError> {
        let provider_id = self
            .store
            .get_provider_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_provider(provider_id).await;

        let record = self
            .store
            .get_appointment(&id)
            .await
            .ok_or(EngineError::NotFound(id))?;
        let mut appointment = Appointment::from_record(&record);
        appointment.set_start(start.unwrap_or(record.span.start));
        if let Some(ids) = activity_ids {
            appointment.set_activities(ids);
        }

        let updated = self.validate_and_commit(&mut appointment).await?;
        info!("rescheduled {id} to [{}, {})", updated.span.start, updated.span.end);
        Ok(updated)
    }

    /// Changing a canceled appointment back to an occupying status re-checks its time.
    pub async fn set_status(&self, id: Ulid, status: AppointmentStatus) -> Result<AppointmentRecord, EngineError> {
        let provider_id = self
            .store
            .get_provider_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_provider(provider_id).await;

        let mut record = self
            .store
            .get_appointment(&id)
            .await
            .ok_or(EngineError::NotFound(id))?;
        if record.status == status {
            return Ok(record);
        }

        if record.prevents_overlap && !record.status.occupies_time() && status.occupies_time() {
            let report = check_conflicts(&self.store, &self.store, provider_id, record.span, Some(id)).await?;
            if !report.is_empty() {
                metrics::counter!(CONFLICTS_TOTAL).increment(1);
                return Err(EngineError::SchedulingConflict(report));
            }
        }

        let event = Event::AppointmentStatusChanged { id, provider_id, status };
        self.persist_and_apply(&event).await?;
        info!("appointment {id}: {} -> {}", record.status.as_str(), status.as_str());
        record.status = status;
        Ok(record)
    }

    pub async fn cancel(&self, id: Ulid, by_provider: bool) -> Result<AppointmentRecord, EngineError> {
        let status = if by_provider {
            AppointmentStatus::CanceledByProviders
        } else {
            AppointmentStatus::CanceledByRecipients
        };
        self.set_status(id, status).await
    }

    pub async fn remove_appointment(&self, id: Ulid) -> Result<AppointmentRecord, EngineError> {
        let provider_id = self
            .store
            .get_provider_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_provider(provider_id).await;
        let record = self
            .store
            .get_appointment(&id)
            .await
            .ok_or(EngineError::NotFound(id))?;

        let event = Event::AppointmentRemoved { id, provider_id };
        self.persist_and_apply(&event).await?;
        Ok(record)
    }

    /// Mark time unavailable. Existing appointments under the slot are left alone;
    /// they show up in [`Scheduler::appointments_for`] for manual handling.
    pub async fn block_slot(
        &self,
        provider_id: Ulid,
        span: Span,
        reason: Option<String>,
    ) -> Result<BlockedSlot, EngineError> {
        validate_span(&span)?;
        if let Some(ref r) = reason
            && r.len() > MAX_REASON_LEN {
                return Err(EngineError::LimitExceeded("reason too long"));
            }
        let _guard = self.lock_provider(provider_id).await;
        let schedule = self.store.schedule_for(provider_id);
        if schedule.read().await.len() >= MAX_ENTRIES_PER_PROVIDER {
            return Err(EngineError::LimitExceeded("too many entries for provider"));
        }

        let slot = BlockedSlot {
            id: Ulid::new(),
            provider_id,
            span,
            reason,
        };
        self.persist_and_apply(&Event::blocked(&slot)).await?;
        info!("blocked [{}, {}) for provider {provider_id}", span.start, span.end);
        Ok(slot)
    }

    pub async fn unblock_slot(&self, id: Ulid) -> Result<Ulid, EngineError> {
        let provider_id = self
            .store
            .get_provider_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let _guard = self.lock_provider(provider_id).await;
        let schedule = self.store.schedule_for(provider_id);
        if !schedule.read().await.blocked.iter().any(|b| b.id == id) {
            return Err(EngineError::NotFound(id));
        }

        let event = Event::SlotUnblocked { id, provider_id };
        self.persist_and_apply(&event).await?;
        Ok(provider_id)
    }

    /// Rewrite the WAL with only the events needed to recreate the current state.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        // No appends between the snapshot and the file swap.
        let _gate = self.write_gate.write().await;
        let events = self.store.snapshot_events().await;
        let count = events.len();
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::collaborator("WAL writer shut down"))?;
        rx.await
            .map_err(|_| EngineError::collaborator("WAL writer dropped response"))?
            .map_err(EngineError::collaborator)?;
        info!("compacted WAL to {count} event(s)");
        Ok(())
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
