use std::collections::HashMap;

use chrono::{DateTime, Datelike, Days, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, TimeZone, Timelike, Weekday};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds. The only instant type.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;
pub const HOUR_MS: Ms = 3_600_000;
pub const DAY_MS: Ms = 86_400_000;

// ── Spans ────────────────────────────────────────────────────────

/// Half-open interval `[start, end)`. Always non-empty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawSpan", into = "RawSpan")]
pub struct Span {
    start: Ms,
    end: Ms,
}

#[derive(Serialize, Deserialize)]
struct RawSpan {
    start: Ms,
    end: Ms,
}

impl TryFrom<RawSpan> for Span {
    type Error = ModelError;

    fn try_from(raw: RawSpan) -> Result<Self, Self::Error> {
        Span::new(raw.start, raw.end)
    }
}

impl From<Span> for RawSpan {
    fn from(span: Span) -> Self {
        RawSpan { start: span.start, end: span.end }
    }
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Result<Self, ModelError> {
        if start >= end {
            return Err(ModelError::InvalidInterval { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> Ms {
        self.start
    }

    pub fn end(&self) -> Ms {
        self.end
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    /// Shared endpoints do not overlap.
    pub fn overlaps(&self, other: &Span) -> bool {
        !(self.end <= other.start || self.start >= other.end)
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// Returns true if `self` fully contains `other`.
    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Intersection with the local calendar day `day` in `tz`.
    pub fn clamp_to_day(&self, day: NaiveDate, tz: &Tz) -> Option<Span> {
        let start = self.start.max(day_start_ms(tz, day));
        let end = self.end.min(day_end_ms(tz, day));
        Span::new(start, end).ok()
    }
}

// ── Local time helpers ───────────────────────────────────────────

/// Wall-clock `at` in `tz` as unix ms. Ambiguous times (DST fall-back) take the
/// earlier instant; times inside a DST gap are read with the offset in force after it.
pub fn local_ms(tz: &Tz, at: NaiveDateTime) -> Ms {
    match tz.from_local_datetime(&at) {
        LocalResult::Single(dt) => dt.timestamp_millis(),
        LocalResult::Ambiguous(earliest, _) => earliest.timestamp_millis(),
        LocalResult::None => at
            .checked_add_signed(TimeDelta::hours(1))
            .and_then(|later| tz.from_local_datetime(&later).earliest())
            .map(|dt| dt.timestamp_millis() - HOUR_MS)
            .unwrap_or_else(|| at.and_utc().timestamp_millis()),
    }
}

/// Local wall-clock time of an instant. `None` only for instants chrono cannot represent.
pub fn local_datetime(tz: &Tz, t: Ms) -> Option<NaiveDateTime> {
    DateTime::from_timestamp_millis(t).map(|utc| utc.with_timezone(tz).naive_local())
}

pub fn day_start_ms(tz: &Tz, day: NaiveDate) -> Ms {
    local_ms(tz, day.and_time(NaiveTime::MIN))
}

pub fn day_end_ms(tz: &Tz, day: NaiveDate) -> Ms {
    match day.checked_add_days(Days::new(1)) {
        Some(next) => day_start_ms(tz, next),
        None => day_start_ms(tz, day) + DAY_MS,
    }
}

/// Wall-clock time of day in seconds since midnight, `0..=86_400`.
/// Unlike `NaiveTime`, `24:00` (end of day) is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DayTime(u32);

impl DayTime {
    pub const MIDNIGHT: DayTime = DayTime(0);
    pub const END_OF_DAY: DayTime = DayTime(86_400);

    pub const fn hm(hour: u32, minute: u32) -> Self {
        let secs = hour * 3_600 + minute * 60;
        Self(if secs > 86_400 { 86_400 } else { secs })
    }

    pub fn from_time(t: NaiveTime) -> Self {
        Self(t.num_seconds_from_midnight())
    }

    pub fn seconds(&self) -> u32 {
        self.0
    }

    /// This time on `day` in `tz`. `24:00` is the start of the following day.
    pub fn on(&self, tz: &Tz, day: NaiveDate) -> Ms {
        if *self == Self::END_OF_DAY {
            return day_end_ms(tz, day);
        }
        match NaiveTime::from_num_seconds_from_midnight_opt(self.0, 0) {
            Some(t) => local_ms(tz, day.and_time(t)),
            None => day_end_ms(tz, day),
        }
    }
}

impl std::fmt::Display for DayTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 3_600, (self.0 % 3_600) / 60)
    }
}

// ── Calendar types ───────────────────────────────────────────────

/// ISO weekday number (1 = Monday … 7 = Sunday).
pub fn weekday_from_iso(n: u8) -> Result<Weekday, ModelError> {
    match n {
        1 => Ok(Weekday::Mon),
        2 => Ok(Weekday::Tue),
        3 => Ok(Weekday::Wed),
        4 => Ok(Weekday::Thu),
        5 => Ok(Weekday::Fri),
        6 => Ok(Weekday::Sat),
        7 => Ok(Weekday::Sun),
        other => Err(ModelError::InvalidWeekday(other)),
    }
}

/// Inclusive range of calendar dates. Always `from <= to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawDateRange", into = "RawDateRange")]
pub struct DateRange {
    from: NaiveDate,
    to: NaiveDate,
}

#[derive(Serialize, Deserialize)]
struct RawDateRange {
    from: NaiveDate,
    to: NaiveDate,
}

impl TryFrom<RawDateRange> for DateRange {
    type Error = ModelError;

    fn try_from(raw: RawDateRange) -> Result<Self, Self::Error> {
        DateRange::new(raw.from, raw.to)
    }
}

impl From<DateRange> for RawDateRange {
    fn from(range: DateRange) -> Self {
        RawDateRange { from: range.from, to: range.to }
    }
}

impl DateRange {
    pub fn new(from: NaiveDate, to: NaiveDate) -> Result<Self, ModelError> {
        if from > to {
            return Err(ModelError::InvalidDateRange { from, to });
        }
        Ok(Self { from, to })
    }

    /// `weeks` whole weeks starting on the Monday of `date`'s ISO week.
    /// `DateOverflow` when either end falls outside chrono's calendar.
    pub fn weeks_from(date: NaiveDate, weeks: u32) -> Result<Self, ModelError> {
        let overflow = || ModelError::DateOverflow { date, weeks };
        let monday = date
            .checked_sub_days(Days::new(u64::from(date.weekday().num_days_from_monday())))
            .ok_or_else(overflow)?;
        let to = monday
            .checked_add_days(Days::new(u64::from(weeks.max(1)) * 7 - 1))
            .ok_or_else(overflow)?;
        Ok(Self { from: monday, to })
    }

    pub fn from(&self) -> NaiveDate {
        self.from
    }

    pub fn to(&self) -> NaiveDate {
        self.to
    }

    pub fn intersects(&self, other: &DateRange) -> bool {
        self.from <= other.to && other.from <= self.to
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }

    pub fn num_days(&self) -> i64 {
        (self.to - self.from).num_days() + 1
    }

    pub fn days(&self) -> impl Iterator<Item = NaiveDate> + '_ {
        self.from.iter_days().take_while(move |d| *d <= self.to)
    }

    /// `[from 00:00, to + 1 day 00:00)` in `tz`.
    pub fn to_span(&self, tz: &Tz) -> Result<Span, ModelError> {
        Span::new(day_start_ms(tz, self.from), day_end_ms(tz, self.to))
    }
}

/// One opening window on one weekday. Always `from < to`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawBoundary", into = "RawBoundary")]
pub struct Boundary {
    weekday: Weekday,
    from: NaiveTime,
    to: NaiveTime,
}

#[derive(Serialize, Deserialize)]
struct RawBoundary {
    weekday: Weekday,
    from: NaiveTime,
    to: NaiveTime,
}

impl TryFrom<RawBoundary> for Boundary {
    type Error = ModelError;

    fn try_from(raw: RawBoundary) -> Result<Self, Self::Error> {
        Boundary::on_weekday(raw.weekday, raw.from, raw.to)
    }
}

impl From<Boundary> for RawBoundary {
    fn from(b: Boundary) -> Self {
        RawBoundary {
            weekday: b.weekday,
            from: b.from,
            to: b.to,
        }
    }
}

impl Boundary {
    pub fn new(iso_weekday: u8, from: NaiveTime, to: NaiveTime) -> Result<Self, ModelError> {
        Self::on_weekday(weekday_from_iso(iso_weekday)?, from, to)
    }

    pub fn on_weekday(weekday: Weekday, from: NaiveTime, to: NaiveTime) -> Result<Self, ModelError> {
        if from >= to {
            return Err(ModelError::InvalidBoundary { from, to });
        }
        Ok(Self { weekday, from, to })
    }

    pub fn weekday(&self) -> Weekday {
        self.weekday
    }

    pub fn from(&self) -> DayTime {
        DayTime::from_time(self.from)
    }

    pub fn to(&self) -> DayTime {
        DayTime::from_time(self.to)
    }
}

/// Recurring weekly opening hours valid for a fixed date range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Season {
    pub id: Ulid,
    pub range: DateRange,
    pub active: bool,
    pub boundaries: Vec<Boundary>,
}

impl Season {
    pub fn new(
        id: Ulid,
        from: NaiveDate,
        to: NaiveDate,
        active: bool,
        boundaries: Vec<Boundary>,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            id,
            range: DateRange::new(from, to)?,
            active,
            boundaries,
        })
    }

    pub fn applies_to(&self, range: &DateRange) -> bool {
        self.active && self.range.intersects(range)
    }
}

// ── Events ───────────────────────────────────────────────────────

/// What an existing calendar entry represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Booking,
    Allocation,
    Event,
    /// Synthetic out-of-hours or past-time shading, not a reservation.
    Closed,
}

impl EventKind {
    pub fn is_reservation(&self) -> bool {
        matches!(self, EventKind::Booking | EventKind::Allocation | EventKind::Event)
    }
}

/// An entry already on the calendar. An empty `resource_ids` list means the
/// entry covers every resource in the building (used for `Closed`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExistingEvent {
    pub id: Ulid,
    pub resource_ids: Vec<Ulid>,
    pub span: Span,
    pub kind: EventKind,
    pub title: Option<String>,
}

impl ExistingEvent {
    pub fn is_building_wide(&self) -> bool {
        self.resource_ids.is_empty()
    }

    pub fn closed(id: Ulid, span: Span) -> Self {
        Self {
            id,
            resource_ids: Vec::new(),
            span,
            kind: EventKind::Closed,
            title: None,
        }
    }
}

// ── Policy ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceBookingPolicy {
    pub resource_id: Ulid,
    pub name: Option<String>,
    pub deny_if_booked: bool,
    /// Once this instant has passed the resource behaves as `deny_if_booked`.
    pub direct_booking_cutoff: Option<Ms>,
}

impl ResourceBookingPolicy {
    pub fn new(resource_id: Ulid) -> Self {
        Self {
            resource_id,
            name: None,
            deny_if_booked: false,
            direct_booking_cutoff: None,
        }
    }

    pub fn denies_if_booked(&self, now: Ms) -> bool {
        self.deny_if_booked || self.direct_booking_cutoff.is_some_and(|cutoff| cutoff <= now)
    }

    pub fn display_name(&self) -> String {
        self.name.clone().unwrap_or_else(|| self.resource_id.to_string())
    }
}

/// Policies keyed by resource. Resources without an entry never deny on booking.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: HashMap<Ulid, ResourceBookingPolicy>,
}

impl PolicySet {
    pub fn new(policies: impl IntoIterator<Item = ResourceBookingPolicy>) -> Self {
        Self {
            policies: policies.into_iter().map(|p| (p.resource_id, p)).collect(),
        }
    }

    pub fn get(&self, resource_id: &Ulid) -> Option<&ResourceBookingPolicy> {
        self.policies.get(resource_id)
    }

    pub fn denies_if_booked(&self, resource_id: &Ulid, now: Ms) -> bool {
        self.get(resource_id).is_some_and(|p| p.denies_if_booked(now))
    }

    pub fn display_name(&self, resource_id: &Ulid) -> String {
        self.get(resource_id)
            .map_or_else(|| resource_id.to_string(), ResourceBookingPolicy::display_name)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Output of the external deactivation logic for one building.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deactivation {
    pub calendar: bool,
    /// `None` = deactivated outright, `Some(window)` = only within the window.
    resources: HashMap<Ulid, Option<Span>>,
}

impl Deactivation {
    pub fn calendar_deactivated() -> Self {
        Self {
            calendar: true,
            resources: HashMap::new(),
        }
    }

    pub fn deactivate_resource(&mut self, resource_id: Ulid, window: Option<Span>) {
        self.resources.insert(resource_id, window);
    }

    pub fn resource_deactivated(&self, resource_id: &Ulid, span: &Span) -> bool {
        match self.resources.get(resource_id) {
            Some(None) => true,
            Some(Some(window)) => window.overlaps(span),
            None => false,
        }
    }
}

// ── Resolver input / output ──────────────────────────────────────

/// A proposed selection, drag or resize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateSelection {
    resource_ids: Vec<Ulid>,
    span: Span,
    exclude_event_id: Option<Ulid>,
}

impl CandidateSelection {
    pub fn new(
        resource_ids: impl IntoIterator<Item = Ulid>,
        span: Span,
        exclude_event_id: Option<Ulid>,
    ) -> Result<Self, ModelError> {
        let mut ids: Vec<Ulid> = Vec::new();
        for id in resource_ids {
            if !ids.contains(&id) {
                ids.push(id);
            }
        }
        if ids.is_empty() {
            return Err(ModelError::EmptyResourceSet);
        }
        Ok(Self {
            resource_ids: ids,
            span,
            exclude_event_id,
        })
    }

    pub fn resource_ids(&self) -> &[Ulid] {
        &self.resource_ids
    }

    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn exclude_event_id(&self) -> Option<Ulid> {
        self.exclude_event_id
    }
}

/// Why a candidate was denied. Message text is the caller's concern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum ConflictReason {
    PastStart,
    CalendarDeactivated,
    ResourceApplicationDeactivated { resource_id: Ulid },
    ClosedHours,
    DenyIfBookedOverlap {
        event_title: Option<String>,
        resource_names: Vec<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConflictDecision {
    allowed: bool,
    reason: Option<ConflictReason>,
}

impl ConflictDecision {
    pub fn allow() -> Self {
        Self { allowed: true, reason: None }
    }

    pub fn deny(reason: ConflictReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }

    pub fn reason(&self) -> Option<&ConflictReason> {
        self.reason.as_ref()
    }
}

// ── Errors ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidInterval { start: Ms, end: Ms },
    InvalidBoundary { from: NaiveTime, to: NaiveTime },
    InvalidWeekday(u8),
    InvalidDateRange { from: NaiveDate, to: NaiveDate },
    DateOverflow { date: NaiveDate, weeks: u32 },
    EmptyResourceSet,
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelError::InvalidInterval { start, end } => {
                write!(f, "invalid interval [{start}, {end}): start must be before end")
            }
            ModelError::InvalidBoundary { from, to } => {
                write!(f, "invalid boundary {from}-{to}: from must be before to")
            }
            ModelError::InvalidWeekday(n) => write!(f, "invalid weekday {n}: expected 1-7"),
            ModelError::InvalidDateRange { from, to } => {
                write!(f, "invalid date range {from}..{to}")
            }
            ModelError::DateOverflow { date, weeks } => {
                write!(f, "{weeks} weeks from {date} is outside the supported calendar")
            }
            ModelError::EmptyResourceSet => write!(f, "selection has no resources"),
        }
    }
}

impl std::error::Error for ModelError {}
