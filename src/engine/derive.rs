use serde::{Deserialize, Serialize};

use crate::model::*;

use super::EngineError;

/// Values computed from an appointment's activities and start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Derivation {
    pub span: Span,
    pub duration: Ms,
    pub price: Money,
}

impl Derivation {
    pub fn end(&self) -> Ms {
        self.span.end
    }
}

/// `end = start + Σ duration`, `price = Σ price`, both in exact integer arithmetic.
pub fn derive(activities: &[Activity], start: Ms) -> Result<Derivation, EngineError> {
    if activities.is_empty() {
        return Err(EngineError::EmptyActivitySet);
    }

    let mut duration: Ms = 0;
    let mut price = Money::ZERO;
    for activity in activities {
        duration = duration
            .checked_add(activity.duration)
            .ok_or(EngineError::LimitExceeded("total duration overflows"))?;
        price = price
            .checked_add(activity.price)
            .ok_or(EngineError::LimitExceeded("total price overflows"))?;
    }

    let end = start
        .checked_add(duration)
        .ok_or(EngineError::LimitExceeded("end time overflows"))?;
    let span = Span::try_new(start, end)?;

    Ok(Derivation {
        span,
        duration,
        price,
    })
}
