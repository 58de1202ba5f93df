use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::appointment::Appointment;
use crate::model::*;

use super::EngineError;

pub type SharedSchedule = Arc<RwLock<ProviderSchedule>>;

// ── Collaborator contracts ───────────────────────────────────

/// Lists a provider's committed appointments. The result must be a superset of
/// everything overlapping `hint`; extra rows are filtered by the caller.
#[async_trait]
pub trait AppointmentQuery: Send + Sync {
    async fn find_appointments(
        &self,
        provider_id: Ulid,
        hint: Span,
    ) -> Result<Vec<AppointmentRecord>, EngineError>;
}

/// Lists a provider's blocked slots; same superset contract as [`AppointmentQuery`].
#[async_trait]
pub trait BlockedSlotQuery: Send + Sync {
    async fn find_blocked_slots(
        &self,
        provider_id: Ulid,
        hint: Span,
    ) -> Result<Vec<BlockedSlot>, EngineError>;
}

/// Persists a `Validated` appointment and returns its committed id.
#[async_trait]
pub trait AppointmentCommit: Send + Sync {
    async fn commit(&self, appointment: &Appointment) -> Result<Ulid, EngineError>;
}

// ── In-memory reference store ────────────────────────────────

pub struct InMemoryStore {
    schedules: DashMap<Ulid, SharedSchedule>,
    /// Reverse lookup: appointment or blocked-slot id → provider id
    entity_to_provider: DashMap<Ulid, Ulid>,
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            schedules: DashMap::new(),
            entity_to_provider: DashMap::new(),
        }
    }

    pub fn provider_count(&self) -> usize {
        self.schedules.len()
    }

    pub fn get_schedule(&self, provider_id: &Ulid) -> Option<SharedSchedule> {
        self.schedules.get(provider_id).map(|e| e.value().clone())
    }

    /// Get or lazily create a provider's schedule.
    pub fn schedule_for(&self, provider_id: Ulid) -> SharedSchedule {
        self.schedules
            .entry(provider_id)
            .or_insert_with(|| Arc::new(RwLock::new(ProviderSchedule::new(provider_id))))
            .value()
            .clone()
    }

    pub fn provider_ids(&self) -> Vec<Ulid> {
        self.schedules.iter().map(|e| *e.key()).collect()
    }

    pub fn get_provider_for_entity(&self, entity_id: &Ulid) -> Option<Ulid> {
        self.entity_to_provider.get(entity_id).map(|e| *e.value())
    }

    pub async fn get_appointment(&self, id: &Ulid) -> Option<AppointmentRecord> {
        let provider_id = self.get_provider_for_entity(id)?;
        let schedule = self.get_schedule(&provider_id)?;
        let guard = schedule.read().await;
        guard.get_appointment(*id).cloned()
    }

    /// Apply an event to the provider's schedule (caller holds the write lock).
    pub fn apply_event(&self, ps: &mut ProviderSchedule, event: &Event) {
        match event {
            Event::AppointmentBooked {
                id,
                provider_id,
                recipient_id,
                activity_ids,
                span,
                price,
                status,
                prevents_overlap,
            } => {
                ps.insert_appointment(AppointmentRecord {
                    id: *id,
                    provider_id: *provider_id,
                    recipient_id: *recipient_id,
                    activity_ids: activity_ids.clone(),
                    span: *span,
                    price: *price,
                    status: *status,
                    prevents_overlap: *prevents_overlap,
                });
                self.entity_to_provider.insert(*id, *provider_id);
            }
            Event::AppointmentRescheduled {
                id,
                activity_ids,
                span,
                price,
                ..
            } => {
                if let Some(mut record) = ps.remove_appointment(*id) {
                    record.activity_ids = activity_ids.clone();
                    record.span = *span;
                    record.price = *price;
                    ps.insert_appointment(record);
                }
            }
            Event::AppointmentStatusChanged { id, status, .. } => {
                if let Some(record) = ps.appointments.iter_mut().find(|a| a.id == *id) {
                    record.status = *status;
                }
            }
            Event::AppointmentRemoved { id, .. } => {
                ps.remove_appointment(*id);
                self.entity_to_provider.remove(id);
            }
            Event::SlotBlocked {
                id,
                provider_id,
                span,
                reason,
            } => {
                ps.insert_blocked(BlockedSlot {
                    id: *id,
                    provider_id: *provider_id,
                    span: *span,
                    reason: reason.clone(),
                });
                self.entity_to_provider.insert(*id, *provider_id);
            }
            Event::SlotUnblocked { id, .. } => {
                ps.remove_blocked(*id);
                self.entity_to_provider.remove(id);
            }
        }
    }

    /// Minimal event list that recreates the current state.
    pub async fn snapshot_events(&self) -> Vec<Event> {
        let mut events = Vec::new();
        for provider_id in self.provider_ids() {
            let Some(schedule) = self.get_schedule(&provider_id) else {
                continue;
            };
            let guard = schedule.read().await;
            events.extend(guard.blocked.iter().map(Event::blocked));
            events.extend(guard.appointments.iter().map(Event::booked));
        }
        events
    }
}

#[async_trait]
impl AppointmentQuery for InMemoryStore {
    async fn find_appointments(
        &self,
        provider_id: Ulid,
        hint: Span,
    ) -> Result<Vec<AppointmentRecord>, EngineError> {
        let Some(schedule) = self.get_schedule(&provider_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard.overlapping_appointments(&hint).cloned().collect())
    }
}

#[async_trait]
impl BlockedSlotQuery for InMemoryStore {
    async fn find_blocked_slots(
        &self,
        provider_id: Ulid,
        hint: Span,
    ) -> Result<Vec<BlockedSlot>, EngineError> {
        let Some(schedule) = self.get_schedule(&provider_id) else {
            return Ok(Vec::new());
        };
        let guard = schedule.read().await;
        Ok(guard.overlapping_blocked(&hint).cloned().collect())
    }
}
