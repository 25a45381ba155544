use chrono::{Datelike, NaiveDate, Weekday};
use chrono_tz::Tz;

use crate::model::*;

/// Closing at or after this time counts as open until the end of the day.
pub const NEAR_MIDNIGHT: DayTime = DayTime::hm(23, 45);

/// Opening hours used for organizations that have no seasons at all.
pub const ORGANIZATION_OPEN: DayTime = DayTime::hm(8, 0);
pub const ORGANIZATION_CLOSE: DayTime = DayTime::hm(23, 0);

/// Earliest opening and latest closing across a date range; sizes the visible grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VisibleHours {
    pub min: DayTime,
    pub max: DayTime,
}

impl VisibleHours {
    pub const FULL_DAY: VisibleHours = VisibleHours {
        min: DayTime::MIDNIGHT,
        max: DayTime::END_OF_DAY,
    };
}

/// Per-weekday opening windows derived from the seasons applicable to a date range.
#[derive(Debug, Clone)]
pub struct BoundaryCalendar {
    range: DateRange,
    seasons_configured: bool,
    /// Indexed by `Weekday::num_days_from_monday`, each sorted by `from`.
    by_weekday: [Vec<Boundary>; 7],
}

impl BoundaryCalendar {
    pub fn build(seasons: &[Season], range: DateRange) -> Self {
        let mut by_weekday: [Vec<Boundary>; 7] = Default::default();
        for season in seasons.iter().filter(|s| s.applies_to(&range)) {
            for boundary in &season.boundaries {
                by_weekday[boundary.weekday().num_days_from_monday() as usize].push(*boundary);
            }
        }
        for day in &mut by_weekday {
            day.sort_by_key(|b| (b.from(), b.to()));
        }
        Self {
            range,
            seasons_configured: !seasons.is_empty(),
            by_weekday,
        }
    }

    pub fn range(&self) -> &DateRange {
        &self.range
    }

    pub fn seasons_configured(&self) -> bool {
        self.seasons_configured
    }

    /// Boundaries of every applicable season on `weekday`, ascending by `from`.
    pub fn for_weekday(&self, weekday: Weekday) -> &[Boundary] {
        &self.by_weekday[weekday.num_days_from_monday() as usize]
    }

    pub fn has_boundaries(&self) -> bool {
        self.by_weekday.iter().any(|d| !d.is_empty())
    }

    /// Earliest `from` and latest `to` over all applicable boundaries, widened by
    /// any non-closed event in range that runs outside them.
    pub fn visible_hours(&self, events: &[ExistingEvent], tz: &Tz, organization: bool) -> VisibleHours {
        let mut hours: Option<VisibleHours> = None;
        for boundary in self.by_weekday.iter().flatten() {
            hours = Some(match hours {
                None => VisibleHours { min: boundary.from(), max: boundary.to() },
                Some(h) => VisibleHours {
                    min: h.min.min(boundary.from()),
                    max: h.max.max(boundary.to()),
                },
            });
        }

        let mut hours = match hours {
            Some(h) => h,
            None if organization && !self.seasons_configured => VisibleHours {
                min: ORGANIZATION_OPEN,
                max: ORGANIZATION_CLOSE,
            },
            None => return VisibleHours::FULL_DAY,
        };

        if let Ok(window) = self.range.to_span(tz) {
            for event in events {
                if event.kind == EventKind::Closed || !event.span.overlaps(&window) {
                    continue;
                }
                let (start_tod, end_tod) = event_times_of_day(&event.span, tz);
                hours.min = hours.min.min(start_tod);
                hours.max = hours.max.max(end_tod);
            }
        }

        if hours.max >= NEAR_MIDNIGHT {
            hours.max = DayTime::END_OF_DAY;
        }
        hours
    }

    /// Out-of-hours spans on `day`: before the first opening and after the last
    /// closing. Days without boundaries produce nothing.
    pub fn closed_spans_on(&self, day: NaiveDate, tz: &Tz) -> Vec<Span> {
        let boundaries = self.for_weekday(day.weekday());
        let Some(first) = boundaries.first() else {
            return Vec::new();
        };
        let last_to = boundaries
            .iter()
            .map(Boundary::to)
            .max()
            .unwrap_or_else(|| first.to());

        let mut spans = Vec::with_capacity(2);
        if first.from() != DayTime::MIDNIGHT
            && let Ok(before) = Span::new(day_start_ms(tz, day), first.from().on(tz, day))
        {
            spans.push(before);
        }
        if last_to < NEAR_MIDNIGHT
            && let Ok(after) = Span::new(last_to.on(tz, day), day_end_ms(tz, day))
        {
            spans.push(after);
        }
        spans
    }
}

/// Local start and end time of day. An event crossing midnight covers the
/// whole day on both sides.
fn event_times_of_day(span: &Span, tz: &Tz) -> (DayTime, DayTime) {
    let (Some(start), Some(end)) = (local_datetime(tz, span.start()), local_datetime(tz, span.end())) else {
        return (DayTime::MIDNIGHT, DayTime::END_OF_DAY);
    };
    let start_tod = DayTime::from_time(start.time());
    let end_tod = DayTime::from_time(end.time());
    let days_apart = (end.date() - start.date()).num_days();
    match days_apart {
        0 => (start_tod, end_tod),
        1 if end_tod == DayTime::MIDNIGHT => (start_tod, DayTime::END_OF_DAY),
        _ => (DayTime::MIDNIGHT, DayTime::END_OF_DAY),
    }
}
