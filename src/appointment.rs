use std::collections::HashSet;

use ulid::Ulid;

use crate::catalog::{ActivityLookup, resolve_activities};
use crate::config::SchedulingPolicy;
use crate::engine::{
    AppointmentQuery, BlockedSlotQuery, ConflictReport, Derivation, EngineError, check_conflicts,
    derive, validate_span,
};
use crate::limits::MAX_ACTIVITIES_PER_APPOINTMENT;
use crate::model::*;

/// `Draft → Validated → Committed`, or `Draft → Rejected`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AppointmentState {
    #[default]
    Draft,
    Validated,
    /// Carries every overlap found, for the caller to present.
    Rejected(ConflictReport),
    Committed,
}

/// The collaborators and policy a validation pass runs against.
#[derive(Clone, Copy)]
pub struct Validator<'a> {
    pub catalog: &'a dyn ActivityLookup,
    pub appointments: &'a dyn AppointmentQuery,
    pub blocked: &'a dyn BlockedSlotQuery,
    pub policy: &'a SchedulingPolicy,
}

/// An appointment candidate. Derived end and price exist only after validation,
/// and any change to the schedule-relevant fields sends it back to `Draft`.
#[derive(Debug, Clone)]
pub struct Appointment {
    id: Option<Ulid>,
    provider_id: Ulid,
    recipient_id: Ulid,
    activity_ids: Vec<Ulid>,
    start: Ms,
    prevents_overlap: bool,
    activities: Vec<Activity>,
    derivation: Option<Derivation>,
    state: AppointmentState,
}

impl Appointment {
    pub fn new(provider_id: Ulid, recipient_id: Ulid, activity_ids: Vec<Ulid>, start: Ms) -> Self {
        Self {
            id: None,
            provider_id,
            recipient_id,
            activity_ids,
            start,
            prevents_overlap: true,
            activities: Vec::new(),
            derivation: None,
            state: AppointmentState::Draft,
        }
    }

    /// Appointments that don't prevent overlap are ignored when others are checked.
    pub fn with_prevents_overlap(mut self, prevents_overlap: bool) -> Self {
        self.prevents_overlap = prevents_overlap;
        self
    }

    /// Rehydrate a stored appointment in the `Committed` state.
    pub fn from_record(record: &AppointmentRecord) -> Self {
        Self {
            id: Some(record.id),
            provider_id: record.provider_id,
            recipient_id: record.recipient_id,
            activity_ids: record.activity_ids.clone(),
            start: record.span.start,
            prevents_overlap: record.prevents_overlap,
            activities: Vec::new(),
            derivation: Some(Derivation {
                span: record.span,
                duration: record.span.duration_ms(),
                price: record.price,
            }),
            state: AppointmentState::Committed,
        }
    }

    pub fn id(&self) -> Option<Ulid> {
        self.id
    }

    pub fn provider_id(&self) -> Ulid {
        self.provider_id
    }

    pub fn recipient_id(&self) -> Ulid {
        self.recipient_id
    }

    pub fn activity_ids(&self) -> &[Ulid] {
        &self.activity_ids
    }

    /// Activities as resolved by the last successful validation, in list order.
    pub fn activities(&self) -> &[Activity] {
        &self.activities
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn prevents_overlap(&self) -> bool {
        self.prevents_overlap
    }

    pub fn derivation(&self) -> Option<&Derivation> {
        self.derivation.as_ref()
    }

    pub fn end(&self) -> Option<Ms> {
        self.derivation.map(|d| d.end())
    }

    pub fn price(&self) -> Option<Money> {
        self.derivation.map(|d| d.price)
    }

    pub fn span(&self) -> Option<Span> {
        self.derivation.map(|d| d.span)
    }

    pub fn state(&self) -> &AppointmentState {
        &self.state
    }

    pub fn is_validated(&self) -> bool {
        self.state == AppointmentState::Validated
    }

    pub fn rejection(&self) -> Option<&ConflictReport> {
        match &self.state {
            AppointmentState::Rejected(report) => Some(report),
            _ => None,
        }
    }

    pub fn set_start(&mut self, start: Ms) {
        self.start = start;
        self.reset();
    }

    pub fn set_activities(&mut self, activity_ids: Vec<Ulid>) {
        self.activity_ids = activity_ids;
        self.reset();
    }

    fn reset(&mut self) {
        self.activities.clear();
        self.derivation = None;
        self.state = AppointmentState::Draft;
    }

    /// Resolve activities, derive end and price, then check the provider's
    /// commitments. Input-contract violations return `Err` and leave the
    /// appointment in `Draft`; overlaps move it to `Rejected`.
    pub async fn validate(&mut self, v: &Validator<'_>) -> Result<&AppointmentState, EngineError> {
        if self.state == AppointmentState::Committed {
            return Err(EngineError::InvalidState(
                "committed appointment must be modified before re-validation",
            ));
        }
        self.reset();

        if self.activity_ids.len() > MAX_ACTIVITIES_PER_APPOINTMENT {
            return Err(EngineError::LimitExceeded("too many activities"));
        }
        let activities = resolve_activities(v.catalog, &self.activity_ids).await?;

        if !v.policy.allow_duplicate_activities {
            let mut seen = HashSet::with_capacity(activities.len());
            if let Some(dup) = activities.iter().find(|a| !seen.insert(a.id)) {
                return Err(EngineError::DuplicateActivity(dup.id));
            }
        }

        let derivation = derive(&activities, self.start)?;
        validate_span(&derivation.span)?;

        let report = check_conflicts(
            v.appointments,
            v.blocked,
            self.provider_id,
            derivation.span,
            self.id,
        )
        .await?;

        self.activities = activities;
        self.derivation = Some(derivation);
        self.state = if report.is_empty() {
            AppointmentState::Validated
        } else {
            AppointmentState::Rejected(report)
        };
        Ok(&self.state)
    }

    /// Called by the persistence side once a `Validated` appointment is stored.
    pub fn mark_committed(&mut self, id: Ulid) -> Result<(), EngineError> {
        if !self.is_validated() {
            return Err(EngineError::InvalidState("only a validated appointment can be committed"));
        }
        self.id = Some(id);
        self.state = AppointmentState::Committed;
        Ok(())
    }

    /// Build the stored form of a `Validated` appointment.
    pub fn to_record(&self, id: Ulid, status: AppointmentStatus) -> Result<AppointmentRecord, EngineError> {
        let derivation = match (&self.state, self.derivation) {
            (AppointmentState::Validated, Some(d)) => d,
            _ => return Err(EngineError::InvalidState("appointment is not validated")),
        };
        Ok(AppointmentRecord {
            id,
            provider_id: self.provider_id,
            recipient_id: self.recipient_id,
            activity_ids: self.activity_ids.clone(),
            span: derivation.span,
            price: derivation.price,
            status,
            prevents_overlap: self.prevents_overlap,
        })
    }
}
