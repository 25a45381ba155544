use chrono_tz::Tz;
use ulid::Ulid;

use crate::model::*;

use super::calendar::BoundaryCalendar;

/// Synthetic `Closed` events for a visible window: everything before `now`,
/// plus the before-opening and after-closing parts of every day that has
/// boundaries. Touching or overlapping spans are merged first.
pub fn closed_events(calendar: &BoundaryCalendar, window: &DateRange, tz: &Tz, now: Ms) -> Vec<ExistingEvent> {
    let mut spans: Vec<Span> = Vec::new();

    let window_start = day_start_ms(tz, window.from());
    let window_end = day_end_ms(tz, window.to());
    if let Ok(past) = Span::new(window_start, now.min(window_end)) {
        spans.push(past);
    }

    for day in window.days() {
        spans.extend(calendar.closed_spans_on(day, tz));
    }

    spans.sort_by_key(|s| s.start());
    merge_overlapping(&spans)
        .into_iter()
        .enumerate()
        .map(|(i, span)| ExistingEvent::closed(closed_event_id(&span, i), span))
        .collect()
}

/// Stable across rebuilds of the same window.
fn closed_event_id(span: &Span, seq: usize) -> Ulid {
    Ulid::from_parts(span.start().max(0) as u64, seq as u128)
}

/// Merge sorted overlapping/adjacent spans into disjoint spans.
pub fn merge_overlapping(sorted: &[Span]) -> Vec<Span> {
    let mut merged: Vec<Span> = Vec::new();
    for &span in sorted {
        if let Some(last) = merged.last_mut()
            && span.start() <= last.end()
        {
            if span.end() > last.end()
                && let Ok(joined) = Span::new(last.start(), span.end())
            {
                *last = joined;
            }
            continue;
        }
        merged.push(span);
    }
    merged
}
