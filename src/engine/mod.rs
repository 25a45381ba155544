mod calendar;
mod closed;
mod conflict;
mod context;
mod error;
mod index;

pub use calendar::{BoundaryCalendar, NEAR_MIDNIGHT, ORGANIZATION_CLOSE, ORGANIZATION_OPEN, VisibleHours};
pub use closed::{closed_events, merge_overlapping};
pub use conflict::resolve;
pub use context::BookingContext;
pub use error::EngineError;
pub use index::BookingIndex;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use chrono::NaiveDate;
use chrono_tz::Tz;
use dashmap::DashMap;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::config::EngineConfig;
use crate::limits::*;
use crate::model::*;
use crate::notify::{Change, NotifyHub, SnapshotChanged};
use crate::observability;
use crate::source::CalendarSource;

use conflict::now_ms;

pub type SharedContext = Arc<BookingContext>;

/// Registry of per-building snapshots. Reads clone an `Arc` and never block on
/// rebuilds; each rebuild swaps in a fresh snapshot under the map entry lock.
pub struct Engine {
    contexts: DashMap<Ulid, SharedContext>,
    /// Slots reserved against `max_contexts`; taken under the entry lock.
    open: AtomicUsize,
    pub notify: Arc<NotifyHub>,
    config: EngineConfig,
}

impl Engine {
    pub fn new(config: EngineConfig, notify: Arc<NotifyHub>) -> Self {
        Self {
            contexts: DashMap::new(),
            open: AtomicUsize::new(0),
            notify,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self, building_id: &Ulid) -> Option<SharedContext> {
        self.contexts.get(building_id).map(|e| e.value().clone())
    }

    pub fn context_count(&self) -> usize {
        self.contexts.len()
    }

    pub fn open_context(
        &self,
        building_id: Ulid,
        tz: Option<Tz>,
        organization: bool,
        window_start: NaiveDate,
        now: Ms,
    ) -> Result<SharedContext, EngineError> {
        let tz = tz.unwrap_or(self.config.default_timezone);
        let window = window_of(window_start, self.config.window_weeks)?;

        let (ctx, open) = match self.contexts.entry(building_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => return Err(EngineError::AlreadyExists(building_id)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let max = self.config.max_contexts;
                let Ok(before) = self
                    .open
                    .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| (n < max).then_some(n + 1))
                else {
                    warn!(%building_id, max, "context limit reached");
                    return Err(EngineError::LimitExceeded("too many booking contexts"));
                };
                let ctx = Arc::new(BookingContext::new(building_id, tz, organization, window, now));
                slot.insert(ctx.clone());
                (ctx, before + 1)
            }
        };

        info!(%building_id, tz = tz.name(), from = %window.from(), to = %window.to(), "booking context opened");
        metrics::gauge!(observability::CONTEXTS_ACTIVE).set(open as f64);
        self.announce(&ctx, Change::Opened);
        Ok(ctx)
    }

    pub fn close_context(&self, building_id: &Ulid) -> Result<(), EngineError> {
        let (_, ctx) = self
            .contexts
            .remove(building_id)
            .ok_or(EngineError::NotFound(*building_id))?;
        let open = self.open.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        info!(%building_id, "booking context closed");
        metrics::gauge!(observability::CONTEXTS_ACTIVE).set(open as f64);
        self.notify.send(SnapshotChanged {
            building_id: *building_id,
            version: ctx.version + 1,
            change: Change::Closed,
        });
        self.notify.remove(building_id);
        Ok(())
    }

    // ── Rebuilds ─────────────────────────────────────────────

    pub fn replace_seasons(&self, building_id: Ulid, seasons: Vec<Season>, now: Ms) -> Result<SharedContext, EngineError> {
        if seasons.len() > MAX_SEASONS_PER_CONTEXT {
            return Err(EngineError::LimitExceeded("too many seasons"));
        }
        self.rebuild(building_id, Change::Seasons, |ctx| Ok(ctx.with_seasons(seasons, now)))
    }

    pub fn move_window(&self, building_id: Ulid, window_start: NaiveDate, now: Ms) -> Result<SharedContext, EngineError> {
        let window = window_of(window_start, self.config.window_weeks)?;
        self.rebuild(building_id, Change::Window, |ctx| Ok(ctx.with_window(window, now)))
    }

    pub fn replace_events(&self, building_id: Ulid, events: Vec<ExistingEvent>) -> Result<SharedContext, EngineError> {
        self.check_event_count(events.len())?;
        self.rebuild(building_id, Change::Events, |ctx| Ok(ctx.with_events(events)))
    }

    pub fn replace_policies(
        &self,
        building_id: Ulid,
        policies: Vec<ResourceBookingPolicy>,
    ) -> Result<SharedContext, EngineError> {
        if policies.len() > MAX_POLICIES_PER_CONTEXT {
            return Err(EngineError::LimitExceeded("too many resource policies"));
        }
        self.rebuild(building_id, Change::Policies, |ctx| Ok(ctx.with_policies(PolicySet::new(policies))))
    }

    pub fn set_deactivation(&self, building_id: Ulid, deactivation: Deactivation) -> Result<SharedContext, EngineError> {
        self.rebuild(building_id, Change::Deactivation, |ctx| Ok(ctx.with_deactivation(deactivation)))
    }

    /// Fetch every input from `source` concurrently and install them as one snapshot.
    pub async fn refresh<S>(&self, building_id: Ulid, source: &S, now: Ms) -> Result<SharedContext, EngineError>
    where
        S: CalendarSource + ?Sized,
    {
        let current = self.context(&building_id).ok_or(EngineError::NotFound(building_id))?;
        let window = current.window().to_span(&current.tz)?;

        let (seasons, events, policies, deactivation) = futures::try_join!(
            source.seasons(building_id),
            source.events(building_id, window),
            source.policies(building_id),
            source.deactivation(building_id),
        )?;

        if seasons.len() > MAX_SEASONS_PER_CONTEXT {
            return Err(EngineError::LimitExceeded("too many seasons"));
        }
        if policies.len() > MAX_POLICIES_PER_CONTEXT {
            return Err(EngineError::LimitExceeded("too many resource policies"));
        }
        self.check_event_count(events.len())?;

        self.rebuild(building_id, Change::Refreshed, |ctx| {
            let mut next = ctx
                .with_seasons(seasons, now)
                .with_events(events)
                .with_policies(PolicySet::new(policies))
                .with_deactivation(deactivation);
            // One refresh is one version step.
            next.version = ctx.version + 1;
            Ok(next)
        })
    }

    /// Swap in the snapshot `build` derives from the current one.
    fn rebuild<F>(&self, building_id: Ulid, change: Change, build: F) -> Result<SharedContext, EngineError>
    where
        F: FnOnce(&BookingContext) -> Result<BookingContext, EngineError>,
    {
        let mut entry = self
            .contexts
            .get_mut(&building_id)
            .ok_or(EngineError::NotFound(building_id))?;
        let next = Arc::new(build(entry.value())?);
        *entry.value_mut() = next.clone();
        drop(entry);

        debug!(
            %building_id,
            version = next.version,
            change = change.label(),
            events = next.events().len(),
            closed = next.closed().len(),
            "snapshot rebuilt"
        );
        metrics::counter!(observability::SNAPSHOT_REBUILDS_TOTAL, "change" => change.label()).increment(1);
        self.announce(&next, change);
        Ok(next)
    }

    fn announce(&self, ctx: &BookingContext, change: Change) {
        self.notify.send(SnapshotChanged {
            building_id: ctx.building_id,
            version: ctx.version,
            change,
        });
    }

    fn check_event_count(&self, n: usize) -> Result<(), EngineError> {
        if n > self.config.max_events_per_context {
            warn!(events = n, max = self.config.max_events_per_context, "event set rejected");
            return Err(EngineError::LimitExceeded("too many events"));
        }
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────

    pub fn check(&self, building_id: Ulid, candidate: &CandidateSelection) -> Result<ConflictDecision, EngineError> {
        self.check_at(building_id, candidate, now_ms())
    }

    pub fn check_at(
        &self,
        building_id: Ulid,
        candidate: &CandidateSelection,
        now: Ms,
    ) -> Result<ConflictDecision, EngineError> {
        if candidate.resource_ids().len() > MAX_RESOURCES_PER_SELECTION {
            return Err(EngineError::LimitExceeded("too many resources in selection"));
        }
        let ctx = self.context(&building_id).ok_or(EngineError::NotFound(building_id))?;

        let started = Instant::now();
        let decision = ctx.check(candidate, now);
        metrics::histogram!(observability::CHECK_DURATION_SECONDS).record(started.elapsed().as_secs_f64());

        let reason = observability::reason_label(decision.reason());
        metrics::counter!(observability::DECISIONS_TOTAL, "reason" => reason).increment(1);
        debug!(
            %building_id,
            version = ctx.version,
            resources = candidate.resource_ids().len(),
            start = candidate.span().start(),
            end = candidate.span().end(),
            reason,
            "conflict check"
        );
        Ok(decision)
    }

    pub fn visible_hours(&self, building_id: &Ulid) -> Result<VisibleHours, EngineError> {
        let ctx = self.context(building_id).ok_or(EngineError::NotFound(*building_id))?;
        Ok(ctx.visible_hours())
    }
}

/// The visible window starting at `start`, rejected when it is too long or
/// runs off the calendar.
fn window_of(start: NaiveDate, weeks: u32) -> Result<DateRange, EngineError> {
    match DateRange::weeks_from(start, weeks) {
        Ok(window) if window.num_days() <= MAX_WINDOW_DAYS => Ok(window),
        _ => {
            warn!(%start, weeks, "window rejected");
            Err(EngineError::LimitExceeded("window too wide"))
        }
    }
}
