use std::fmt;

use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Unix milliseconds. Durations are `Ms` too.
pub type Ms = i64;

pub const MINUTE: Ms = 60_000;
pub const HOUR: Ms = 60 * MINUTE;
pub const DAY: Ms = 24 * HOUR;

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    /// Checked constructor for spans built from caller input.
    pub fn try_new(start: Ms, end: Ms) -> Result<Self, EngineError> {
        if end <= start {
            return Err(EngineError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    /// `end - start`, failing if the span is empty or inverted.
    pub fn duration(&self) -> Result<Ms, EngineError> {
        if self.end <= self.start {
            return Err(EngineError::InvalidInterval {
                start: self.start,
                end: self.end,
            });
        }
        Ok(self.end - self.start)
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Widen to whole-day boundaries. Used as the coarse query window for conflict lookups.
    pub fn day_bounds(&self) -> Span {
        let start = self.start.div_euclid(DAY).saturating_mul(DAY);
        let end_day = self.end.saturating_sub(1).div_euclid(DAY) + 1;
        Span::new(start, end_day.saturating_mul(DAY))
    }
}

/// Exact money amount in minor units (hundredths).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// `Money::new(20, 50)` is 20.50.
    pub const fn new(units: i64, cents: i64) -> Self {
        Money(units * 100 + cents)
    }

    pub const fn cents(&self) -> i64 {
        self.0
    }

    pub fn checked_add(self, other: Money) -> Option<Money> {
        self.0.checked_add(other.0).map(Money)
    }

    pub fn is_negative(&self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{sign}{}.{:02}", abs / 100, abs % 100)
    }
}

/// A schedulable service type. Reference data, never modified by appointment logic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Activity {
    pub id: Ulid,
    pub name: String,
    pub duration: Ms,
    pub price: Money,
}

impl Activity {
    pub fn new(id: Ulid, name: impl Into<String>, duration: Ms, price: Money) -> Result<Self, EngineError> {
        let name = name.into();
        if name.len() > crate::limits::MAX_NAME_LEN {
            return Err(EngineError::LimitExceeded("activity name too long"));
        }
        if duration < 0 {
            return Err(EngineError::InvalidActivity("negative duration"));
        }
        if price.is_negative() {
            return Err(EngineError::InvalidActivity("negative price"));
        }
        Ok(Self {
            id,
            name,
            duration,
            price,
        })
    }
}

/// Time a provider is unavailable (holiday, personal block).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSlot {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub span: Span,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AppointmentStatus {
    #[default]
    Pending,
    ConfirmedByRecipients,
    CanceledByRecipients,
    CanceledByProviders,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    /// Canceled appointments release their time; everything else keeps it.
    pub fn occupies_time(&self) -> bool {
        !matches!(
            self,
            AppointmentStatus::CanceledByRecipients | AppointmentStatus::CanceledByProviders
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Pending => "pending",
            AppointmentStatus::ConfirmedByRecipients => "confirmed_by_recipients",
            AppointmentStatus::CanceledByRecipients => "canceled_by_recipients",
            AppointmentStatus::CanceledByProviders => "canceled_by_providers",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::NoShow => "no_show",
        }
    }
}

/// A committed appointment as the store holds it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentRecord {
    pub id: Ulid,
    pub provider_id: Ulid,
    pub recipient_id: Ulid,
    pub activity_ids: Vec<Ulid>,
    pub span: Span,
    pub price: Money,
    pub status: AppointmentStatus,
    pub prevents_overlap: bool,
}

impl AppointmentRecord {
    /// Whether this record can conflict with a new candidate.
    pub fn blocks_others(&self) -> bool {
        self.prevents_overlap && self.status.occupies_time()
    }
}

/// Anything placed on a provider's timeline.
pub trait Timed {
    fn span(&self) -> Span;
}

impl Timed for AppointmentRecord {
    fn span(&self) -> Span {
        self.span
    }
}

impl Timed for BlockedSlot {
    fn span(&self) -> Span {
        self.span
    }
}

/// Insert keeping `items` sorted by `span.start`.
fn insert_sorted<T: Timed>(items: &mut Vec<T>, item: T) {
    let start = item.span().start;
    let pos = items
        .binary_search_by_key(&start, |i| i.span().start)
        .unwrap_or_else(|e| e);
    items.insert(pos, item);
}

/// Items whose span overlaps `query`. Everything at or after the partition point
/// starts at or after `query.end` and can't overlap.
fn overlapping<'a, T: Timed>(items: &'a [T], query: &Span) -> impl Iterator<Item = &'a T> {
    let right_bound = items.partition_point(|i| i.span().start < query.end);
    let query_start = query.start;
    items[..right_bound]
        .iter()
        .filter(move |i| i.span().end > query_start)
}

/// One provider's timeline: committed appointments and blocked slots, each sorted by start.
#[derive(Debug, Clone, Default)]
pub struct ProviderSchedule {
    pub provider_id: Ulid,
    pub appointments: Vec<AppointmentRecord>,
    pub blocked: Vec<BlockedSlot>,
}

impl ProviderSchedule {
    pub fn new(provider_id: Ulid) -> Self {
        Self {
            provider_id,
            appointments: Vec::new(),
            blocked: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.appointments.len() + self.blocked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn insert_appointment(&mut self, record: AppointmentRecord) {
        insert_sorted(&mut self.appointments, record);
    }

    pub fn remove_appointment(&mut self, id: Ulid) -> Option<AppointmentRecord> {
        let pos = self.appointments.iter().position(|a| a.id == id)?;
        Some(self.appointments.remove(pos))
    }

    pub fn get_appointment(&self, id: Ulid) -> Option<&AppointmentRecord> {
        self.appointments.iter().find(|a| a.id == id)
    }

    pub fn insert_blocked(&mut self, slot: BlockedSlot) {
        insert_sorted(&mut self.blocked, slot);
    }

    pub fn remove_blocked(&mut self, id: Ulid) -> Option<BlockedSlot> {
        let pos = self.blocked.iter().position(|b| b.id == id)?;
        Some(self.blocked.remove(pos))
    }

    pub fn overlapping_appointments(&self, query: &Span) -> impl Iterator<Item = &AppointmentRecord> {
        overlapping(&self.appointments, query)
    }

    pub fn overlapping_blocked(&self, query: &Span) -> impl Iterator<Item = &BlockedSlot> {
        overlapping(&self.blocked, query)
    }
}

/// Flat event types. This is the WAL record format.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    AppointmentBooked {
        id: Ulid,
        provider_id: Ulid,
        recipient_id: Ulid,
        activity_ids: Vec<Ulid>,
        span: Span,
        price: Money,
        status: AppointmentStatus,
        prevents_overlap: bool,
    },
    AppointmentRescheduled {
        id: Ulid,
        provider_id: Ulid,
        activity_ids: Vec<Ulid>,
        span: Span,
        price: Money,
    },
    AppointmentStatusChanged {
        id: Ulid,
        provider_id: Ulid,
        status: AppointmentStatus,
    },
    AppointmentRemoved {
        id: Ulid,
        provider_id: Ulid,
    },
    SlotBlocked {
        id: Ulid,
        provider_id: Ulid,
        span: Span,
        reason: Option<String>,
    },
    SlotUnblocked {
        id: Ulid,
        provider_id: Ulid,
    },
}

impl Event {
    pub fn provider_id(&self) -> Ulid {
        match self {
            Event::AppointmentBooked { provider_id, .. }
            | Event::AppointmentRescheduled { provider_id, .. }
            | Event::AppointmentStatusChanged { provider_id, .. }
            | Event::AppointmentRemoved { provider_id, .. }
            | Event::SlotBlocked { provider_id, .. }
            | Event::SlotUnblocked { provider_id, .. } => *provider_id,
        }
    }

    /// Appointment changes, as opposed to blocked-slot changes.
    pub fn is_appointment(&self) -> bool {
        !matches!(self, Event::SlotBlocked { .. } | Event::SlotUnblocked { .. })
    }

    pub fn booked(record: &AppointmentRecord) -> Self {
        Event::AppointmentBooked {
            id: record.id,
            provider_id: record.provider_id,
            recipient_id: record.recipient_id,
            activity_ids: record.activity_ids.clone(),
            span: record.span,
            price: record.price,
            status: record.status,
            prevents_overlap: record.prevents_overlap,
        }
    }

    pub fn blocked(slot: &BlockedSlot) -> Self {
        Event::SlotBlocked {
            id: slot.id,
            provider_id: slot.provider_id,
            span: slot.span,
            reason: slot.reason.clone(),
        }
    }
}
