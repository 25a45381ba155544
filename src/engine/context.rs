use std::sync::Arc;

use chrono_tz::Tz;
use ulid::Ulid;

use crate::model::*;

use super::calendar::{BoundaryCalendar, VisibleHours};
use super::closed::closed_events;
use super::conflict::resolve;
use super::index::BookingIndex;

/// Immutable view of one building's booking inputs. Every change produces a
/// new snapshot; checks in flight keep reading the one they started with.
#[derive(Debug, Clone)]
pub struct BookingContext {
    pub building_id: Ulid,
    pub tz: Tz,
    /// Organizations without seasons fall back to default opening hours.
    pub organization: bool,
    pub version: u64,
    window: DateRange,
    seasons: Arc<Vec<Season>>,
    calendar: BoundaryCalendar,
    /// Fetched reservations, without the synthetic closed shading.
    events: Arc<Vec<ExistingEvent>>,
    closed: Arc<Vec<ExistingEvent>>,
    index: Arc<BookingIndex>,
    policies: Arc<PolicySet>,
    deactivation: Arc<Deactivation>,
}

impl BookingContext {
    pub fn new(building_id: Ulid, tz: Tz, organization: bool, window: DateRange, now: Ms) -> Self {
        let calendar = BoundaryCalendar::build(&[], window);
        let closed = closed_events(&calendar, &window, &tz, now);
        let index = BookingIndex::build(closed.clone());
        Self {
            building_id,
            tz,
            organization,
            version: 0,
            window,
            seasons: Arc::new(Vec::new()),
            calendar,
            events: Arc::new(Vec::new()),
            closed: Arc::new(closed),
            index: Arc::new(index),
            policies: Arc::new(PolicySet::default()),
            deactivation: Arc::new(Deactivation::default()),
        }
    }

    pub fn window(&self) -> &DateRange {
        &self.window
    }

    pub fn seasons(&self) -> &[Season] {
        &self.seasons
    }

    pub fn calendar(&self) -> &BoundaryCalendar {
        &self.calendar
    }

    pub fn events(&self) -> &[ExistingEvent] {
        &self.events
    }

    pub fn closed(&self) -> &[ExistingEvent] {
        &self.closed
    }

    pub fn index(&self) -> &BookingIndex {
        &self.index
    }

    pub fn policies(&self) -> &PolicySet {
        &self.policies
    }

    pub fn deactivation(&self) -> &Deactivation {
        &self.deactivation
    }

    pub fn visible_hours(&self) -> VisibleHours {
        self.calendar.visible_hours(&self.events, &self.tz, self.organization)
    }

    pub fn check(&self, candidate: &CandidateSelection, now: Ms) -> ConflictDecision {
        resolve(candidate, now, &self.index, &self.policies, &self.deactivation)
    }

    // ── Rebuilds ─────────────────────────────────────────────

    pub fn with_seasons(&self, seasons: Vec<Season>, now: Ms) -> Self {
        let mut next = self.successor();
        next.seasons = Arc::new(seasons);
        next.recompute_calendar(now);
        next
    }

    pub fn with_window(&self, window: DateRange, now: Ms) -> Self {
        let mut next = self.successor();
        next.window = window;
        next.recompute_calendar(now);
        next
    }

    pub fn with_events(&self, events: Vec<ExistingEvent>) -> Self {
        let mut next = self.successor();
        // Closed shading is derived here, never accepted from the feed.
        next.events = Arc::new(events.into_iter().filter(|e| e.kind != EventKind::Closed).collect());
        next.reindex();
        next
    }

    pub fn with_policies(&self, policies: PolicySet) -> Self {
        let mut next = self.successor();
        next.policies = Arc::new(policies);
        next
    }

    pub fn with_deactivation(&self, deactivation: Deactivation) -> Self {
        let mut next = self.successor();
        next.deactivation = Arc::new(deactivation);
        next
    }

    fn successor(&self) -> Self {
        let mut next = self.clone();
        next.version += 1;
        next
    }

    fn recompute_calendar(&mut self, now: Ms) {
        self.calendar = BoundaryCalendar::build(&self.seasons, self.window);
        self.closed = Arc::new(closed_events(&self.calendar, &self.window, &self.tz, now));
        self.reindex();
    }

    fn reindex(&mut self) {
        let mut all = Vec::with_capacity(self.events.len() + self.closed.len());
        all.extend(self.events.iter().cloned());
        all.extend(self.closed.iter().cloned());
        self.index = Arc::new(BookingIndex::build(all));
    }
}
