use std::collections::HashMap;

use ulid::Ulid;

use crate::model::*;

/// Positions into `BookingIndex::events` for one resource (or the building-wide
/// lane), sorted by start. `max_len` bounds how far back an overlapping event
/// can start, so both ends of a lookup are binary searches.
#[derive(Debug, Clone, Default)]
struct Lane {
    slots: Vec<usize>,
    max_len: Ms,
}

impl Lane {
    fn push(&mut self, pos: usize, span: &Span) {
        self.slots.push(pos);
        self.max_len = self.max_len.max(span.duration_ms());
    }

    fn overlapping<'a>(&'a self, events: &'a [ExistingEvent], query: &'a Span) -> impl Iterator<Item = usize> + 'a {
        // Anything starting at or before `query.start - max_len` has ended by `query.start`.
        let horizon = query.start().saturating_sub(self.max_len);
        let left = self.slots.partition_point(|&i| events[i].span.start() <= horizon);
        // Everything from `right` on starts at or after `query.end`.
        let right = self.slots.partition_point(|&i| events[i].span.start() < query.end());
        self.slots[left..right.max(left)]
            .iter()
            .copied()
            .filter(move |&i| events[i].span.overlaps(query))
    }
}

/// Immutable lookup structure over the events of one booking context.
/// Rebuilt wholesale whenever the event set changes.
#[derive(Debug, Clone, Default)]
pub struct BookingIndex {
    /// Sorted by `(span.start, id)`.
    events: Vec<ExistingEvent>,
    lanes: HashMap<Ulid, Lane>,
    shared: Lane,
}

impl BookingIndex {
    pub fn build(mut events: Vec<ExistingEvent>) -> Self {
        events.sort_by_key(|e| (e.span.start(), e.id));
        events.dedup_by_key(|e| e.id);

        let mut lanes: HashMap<Ulid, Lane> = HashMap::new();
        let mut shared = Lane::default();
        for (pos, event) in events.iter().enumerate() {
            if event.is_building_wide() {
                shared.push(pos, &event.span);
                continue;
            }
            for rid in &event.resource_ids {
                let lane = lanes.entry(*rid).or_default();
                // An event listing the same resource twice gets one slot.
                if lane.slots.last() != Some(&pos) {
                    lane.push(pos, &event.span);
                }
            }
        }

        Self { events, lanes, shared }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn events(&self) -> &[ExistingEvent] {
        &self.events
    }

    pub fn get(&self, id: &Ulid) -> Option<&ExistingEvent> {
        self.events.iter().find(|e| e.id == *id)
    }

    /// Events on any of `resource_ids` (plus building-wide events) overlapping
    /// `query`, each once, ordered by `(start, id)`.
    pub fn query(&self, resource_ids: &[Ulid], query: &Span) -> Vec<&ExistingEvent> {
        let mut hits: Vec<usize> = self.shared.overlapping(&self.events, query).collect();
        for rid in resource_ids {
            if let Some(lane) = self.lanes.get(rid) {
                hits.extend(lane.overlapping(&self.events, query));
            }
        }
        hits.sort_unstable();
        hits.dedup();
        hits.into_iter().map(|i| &self.events[i]).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(resources: &[Ulid], start: Ms, end: Ms, kind: EventKind) -> ExistingEvent {
        ExistingEvent {
            id: Ulid::new(),
            resource_ids: resources.to_vec(),
            span: Span::new(start, end).unwrap(),
            kind,
            title: None,
        }
    }

    fn span(start: Ms, end: Ms) -> Span {
        Span::new(start, end).unwrap()
    }

    fn ids(hits: &[&ExistingEvent]) -> Vec<Ulid> {
        hits.iter().map(|e| e.id).collect()
    }

    #[test]
    fn query_filters_by_resource() {
        let a = Ulid::new();
        let b = Ulid::new();
        let on_a = event(&[a], 100, 200, EventKind::Booking);
        let on_b = event(&[b], 100, 200, EventKind::Booking);
        let index = BookingIndex::build(vec![on_a.clone(), on_b.clone()]);

        assert_eq!(ids(&index.query(&[a], &span(150, 160))), vec![on_a.id]);
        assert_eq!(ids(&index.query(&[b], &span(150, 160))), vec![on_b.id]);
        assert!(index.query(&[Ulid::new()], &span(150, 160)).is_empty());
    }

    #[test]
    fn query_skips_past_and_future() {
        let r = Ulid::new();
        let past = event(&[r], 100, 200, EventKind::Booking);
        let hit = event(&[r], 450, 600, EventKind::Allocation);
        let future = event(&[r], 1000, 1100, EventKind::Booking);
        let index = BookingIndex::build(vec![future, past, hit.clone()]);

        assert_eq!(ids(&index.query(&[r], &span(500, 800))), vec![hit.id]);
    }

    #[test]
    fn adjacent_events_are_not_returned() {
        let r = Ulid::new();
        let index = BookingIndex::build(vec![
            event(&[r], 100, 200, EventKind::Booking),
            event(&[r], 300, 400, EventKind::Booking),
        ]);
        assert!(index.query(&[r], &span(200, 300)).is_empty());
    }

    #[test]
    fn long_event_spanning_query_is_found() {
        let r = Ulid::new();
        let long = event(&[r], 0, 10_000, EventKind::Event);
        let mut events = vec![long.clone()];
        for i in 1..50 {
            events.push(event(&[r], i * 100, i * 100 + 50, EventKind::Booking));
        }
        let index = BookingIndex::build(events);

        let hits = index.query(&[r], &span(9_000, 9_010));
        assert_eq!(ids(&hits), vec![long.id]);
    }

    #[test]
    fn building_wide_events_match_every_resource() {
        let closed = event(&[], 0, 500, EventKind::Closed);
        let index = BookingIndex::build(vec![closed.clone()]);
        assert_eq!(ids(&index.query(&[Ulid::new()], &span(400, 600))), vec![closed.id]);
    }

    #[test]
    fn multi_resource_event_returned_once() {
        let a = Ulid::new();
        let b = Ulid::new();
        let shared = event(&[a, b, a], 100, 300, EventKind::Booking);
        let index = BookingIndex::build(vec![shared.clone()]);

        let hits = index.query(&[a, b], &span(150, 250));
        assert_eq!(ids(&hits), vec![shared.id]);
    }

    #[test]
    fn results_are_ordered_by_start() {
        let a = Ulid::new();
        let b = Ulid::new();
        let third = event(&[a], 300, 900, EventKind::Booking);
        let first = event(&[b], 100, 900, EventKind::Booking);
        let second = event(&[], 200, 900, EventKind::Closed);
        let index = BookingIndex::build(vec![third.clone(), first.clone(), second.clone()]);

        let hits = index.query(&[a, b], &span(500, 600));
        assert_eq!(ids(&hits), vec![first.id, second.id, third.id]);
    }

    #[test]
    fn duplicate_ids_collapse() {
        let r = Ulid::new();
        let e = event(&[r], 100, 200, EventKind::Booking);
        let index = BookingIndex::build(vec![e.clone(), e.clone()]);
        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&e.id), Some(&e));
    }

    #[test]
    fn empty_index() {
        let index = BookingIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.query(&[Ulid::new()], &span(0, 1000)).is_empty());
    }

    #[test]
    fn matches_linear_scan() {
        let resources: Vec<Ulid> = (0..4).map(|_| Ulid::new()).collect();
        let mut events = Vec::new();
        for i in 0..200i64 {
            let r = resources[(i % 4) as usize];
            let start = (i * 37) % 5_000;
            let len = 10 + (i * 13) % 400;
            events.push(event(&[r], start, start + len, EventKind::Booking));
        }
        let index = BookingIndex::build(events.clone());

        for q in [span(0, 50), span(1_000, 1_200), span(2_500, 2_501), span(4_900, 6_000)] {
            let filter = &resources[..2];
            let mut expected: Vec<&ExistingEvent> = events
                .iter()
                .filter(|e| e.resource_ids.iter().any(|r| filter.contains(r)) && e.span.overlaps(&q))
                .collect();
            expected.sort_by_key(|e| (e.span.start(), e.id));
            assert_eq!(ids(&index.query(filter, &q)), ids(&expected));
        }
    }
}
