use ulid::Ulid;

use crate::model::Ms;

use super::conflict::ConflictReport;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug)]
pub enum EngineError {
    NotFound(Ulid),
    AlreadyExists(Ulid),
    EmptyActivitySet,
    DuplicateActivity(Ulid),
    InvalidInterval { start: Ms, end: Ms },
    InvalidActivity(&'static str),
    InvalidState(&'static str),
    /// Business-rule rejection. The caller can pick another time or provider.
    SchedulingConflict(ConflictReport),
    LimitExceeded(&'static str),
    /// Failure inside a query or commit collaborator, passed through untouched.
    Collaborator(BoxError),
}

impl EngineError {
    pub fn collaborator(err: impl Into<BoxError>) -> Self {
        EngineError::Collaborator(err.into())
    }

    /// True for the recoverable outcome; everything else is an input-contract
    /// violation or a collaborator fault.
    pub fn is_conflict(&self) -> bool {
        matches!(self, EngineError::SchedulingConflict(_))
    }

    pub fn conflict_report(&self) -> Option<&ConflictReport> {
        match self {
            EngineError::SchedulingConflict(report) => Some(report),
            _ => None,
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::EmptyActivitySet => write!(f, "appointment has no activities"),
            EngineError::DuplicateActivity(id) => {
                write!(f, "activity {id} listed more than once")
            }
            EngineError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): end must be after start")
            }
            EngineError::InvalidActivity(msg) => write!(f, "invalid activity: {msg}"),
            EngineError::InvalidState(msg) => write!(f, "invalid state: {msg}"),
            EngineError::SchedulingConflict(report) => write!(
                f,
                "scheduling conflict: {} overlapping appointment(s), {} overlapping blocked slot(s)",
                report.overlapping_appointments.len(),
                report.overlapping_blocked_slots.len()
            ),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::Collaborator(e) => write!(f, "collaborator error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EngineError::Collaborator(e) => Some(e.as_ref()),
            _ => None,
        }
    }
}
