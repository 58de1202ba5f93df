use crate::model::*;

// ── Free-time computation ─────────────────────────────────────────

/// Free spans of a provider inside `window`: the window minus every blocked
/// slot and every appointment that occupies time. Appointments that don't
/// prevent overlap leave their time free.
pub fn free_spans(schedule: &ProviderSchedule, window: &Span) -> Vec<Span> {
    let mut busy: Vec<Span> = schedule
        .overlapping_blocked(window)
        .map(|b| b.span)
        .chain(
            schedule
                .overlapping_appointments(window)
                .filter(|a| a.blocks_others())
                .map(|a| a.span),
        )
        .map(|s| Span::new(s.start.max(window.start), s.end.min(window.end)))
        .collect();

    if busy.is_empty() {
        return vec![*window];
    }
    busy.sort_by_key(|s| s.start);
    let busy = merge_overlapping(&busy);
    subtract_intervals(&[*window], &busy)
}

/// Merge sorted overlapping/adjacent intervals into disjoint intervals.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start <= last.end {
                last.end = last.end.max(span.end);
                continue;
            }
        merged.push(span);
    }
    merged
}

/// `base` minus `to_remove`; both sorted by start and internally disjoint.
pub fn subtract_intervals(base: &[Span], to_remove: &[Span]) -> Vec<Span> {
    let mut result = Vec::new();
    let mut ri = 0;

    for &b in base {
        let mut current_start = b.start;
        let current_end = b.end;

        while ri < to_remove.len() && to_remove[ri].end <= current_start {
            ri += 1;
        }

        let mut j = ri;
        while j < to_remove.len() && to_remove[j].start < current_end {
            let r = &to_remove[j];
            if r.start > current_start {
                result.push(Span::new(current_start, r.start));
            }
            current_start = current_start.max(r.end);
            j += 1;
        }

        if current_start < current_end {
            result.push(Span::new(current_start, current_end));
        }
    }

    result
}
