use ulid::Ulid;

use crate::model::*;

use super::index::BookingIndex;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as Ms)
}

/// Decide whether `candidate` may be committed.
///
/// Checks run in a fixed order and the first failing one is reported:
/// past start, calendar deactivated, resource deactivated, then the overlap
/// scan. Closed-hours shading reaches this function as `Closed` events in
/// `index`. During the scan, if any selected resource denies on booking
/// (explicitly, or because its direct-booking cutoff has passed) every
/// overlapping reservation blocks; without such a resource only `Closed`
/// events block and ordinary reservations may coexist.
pub fn resolve(
    candidate: &CandidateSelection,
    now: Ms,
    index: &BookingIndex,
    policies: &PolicySet,
    deactivation: &Deactivation,
) -> ConflictDecision {
    let span = candidate.span();

    if span.start() < now {
        return ConflictDecision::deny(ConflictReason::PastStart);
    }

    if deactivation.calendar {
        return ConflictDecision::deny(ConflictReason::CalendarDeactivated);
    }

    if let Some(resource_id) = candidate
        .resource_ids()
        .iter()
        .find(|rid| deactivation.resource_deactivated(rid, span))
    {
        return ConflictDecision::deny(ConflictReason::ResourceApplicationDeactivated {
            resource_id: *resource_id,
        });
    }

    let deny_flag_resources: Vec<Ulid> = candidate
        .resource_ids()
        .iter()
        .copied()
        .filter(|rid| policies.denies_if_booked(rid, now))
        .collect();

    let exclude = candidate.exclude_event_id();
    for event in index.query(candidate.resource_ids(), span) {
        if exclude == Some(event.id) {
            continue;
        }
        match event.kind {
            EventKind::Booking | EventKind::Allocation | EventKind::Event if !deny_flag_resources.is_empty() => {
                return ConflictDecision::deny(ConflictReason::DenyIfBookedOverlap {
                    event_title: event.title.clone(),
                    resource_names: deny_flag_resources.iter().map(|rid| policies.display_name(rid)).collect(),
                });
            }
            EventKind::Closed => return ConflictDecision::deny(ConflictReason::ClosedHours),
            EventKind::Booking | EventKind::Allocation | EventKind::Event => {}
        }
    }

    ConflictDecision::allow()
}
