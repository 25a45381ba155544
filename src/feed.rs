//! Booking backend JSON payloads → validated model types.
//!
//! The backend speaks in local wall-clock strings (`from_`/`to_`), PHP-style
//! 0/1 flags and unix-second timestamps; everything is normalized here so the
//! engine only ever sees `Ms` and checked constructors.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer};
use ulid::Ulid;

use crate::model::*;

#[derive(Debug)]
pub enum FeedError {
    Json(serde_json::Error),
    Model(ModelError),
    Time(String),
}

impl std::fmt::Display for FeedError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedError::Json(e) => write!(f, "malformed payload: {e}"),
            FeedError::Model(e) => write!(f, "invalid payload: {e}"),
            FeedError::Time(s) => write!(f, "unparsable time: {s:?}"),
        }
    }
}

impl std::error::Error for FeedError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FeedError::Json(e) => Some(e),
            FeedError::Model(e) => Some(e),
            FeedError::Time(_) => None,
        }
    }
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Json(e)
    }
}

impl From<ModelError> for FeedError {
    fn from(e: ModelError) -> Self {
        FeedError::Model(e)
    }
}

// ── Payload shapes ───────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SeasonPayload {
    id: Ulid,
    from_: NaiveDate,
    to_: NaiveDate,
    #[serde(deserialize_with = "flag")]
    active: bool,
    #[serde(default)]
    boundaries: Vec<BoundaryPayload>,
}

#[derive(Debug, Deserialize)]
struct BoundaryPayload {
    wday: u8,
    from_: String,
    to_: String,
}

#[derive(Debug, Deserialize)]
struct ResourcePayload {
    id: Ulid,
    #[serde(default)]
    name: Option<String>,
    #[serde(default, deserialize_with = "flag")]
    deny_application_if_booked: bool,
    #[serde(default, deserialize_with = "unix_seconds")]
    direct_booking: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct EventPayload {
    id: Ulid,
    #[serde(rename = "type")]
    kind: EventKind,
    from_: String,
    to_: String,
    #[serde(default)]
    resources: Vec<Ulid>,
    #[serde(default)]
    name: Option<String>,
}

/// PHP backends send booleans as `true`, `1` or `"1"`.
fn flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Int(i64),
        Str(String),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Int(n) => n != 0,
        Flag::Str(s) => !matches!(s.trim(), "" | "0" | "false"),
    })
}

/// Unix seconds as a number, a numeric string, `null` or `""`.
fn unix_seconds<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Seconds {
        Int(i64),
        Str(String),
    }

    match Option::<Seconds>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Seconds::Int(n)) => Ok(Some(n)),
        Some(Seconds::Str(s)) if s.trim().is_empty() => Ok(None),
        Some(Seconds::Str(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("invalid unix timestamp: {s:?}"))),
    }
}

fn parse_time(s: &str) -> Result<NaiveTime, FeedError> {
    let s = s.trim();
    // 24:00 is not a NaiveTime; the last second of the day closes just as late.
    if s == "24:00" || s == "24:00:00" {
        return NaiveTime::from_hms_opt(23, 59, 59).ok_or_else(|| FeedError::Time(s.to_string()));
    }
    NaiveTime::parse_from_str(s, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(s, "%H:%M"))
        .map_err(|_| FeedError::Time(s.to_string()))
}

fn parse_local_datetime(s: &str) -> Result<NaiveDateTime, FeedError> {
    const FORMATS: [&str; 4] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M"];
    let s = s.trim();
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .ok_or_else(|| FeedError::Time(s.to_string()))
}

// ── Parsers ──────────────────────────────────────────────────────

pub fn parse_seasons(json: &str) -> Result<Vec<Season>, FeedError> {
    let payloads: Vec<SeasonPayload> = serde_json::from_str(json)?;
    payloads
        .into_iter()
        .map(|p| -> Result<Season, FeedError> {
            let boundaries = p
                .boundaries
                .iter()
                .map(|b| -> Result<Boundary, FeedError> {
                    Ok(Boundary::new(b.wday, parse_time(&b.from_)?, parse_time(&b.to_)?)?)
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Season::new(p.id, p.from_, p.to_, p.active, boundaries)?)
        })
        .collect()
}

pub fn parse_policies(json: &str) -> Result<Vec<ResourceBookingPolicy>, FeedError> {
    let payloads: Vec<ResourcePayload> = serde_json::from_str(json)?;
    Ok(payloads
        .into_iter()
        .map(|p| ResourceBookingPolicy {
            resource_id: p.id,
            name: p.name,
            deny_if_booked: p.deny_application_if_booked,
            direct_booking_cutoff: p.direct_booking.map(|secs| secs.saturating_mul(1_000)),
        })
        .collect())
}

/// Events carry local wall-clock times; `tz` is the booking context's zone.
pub fn parse_events(json: &str, tz: &Tz) -> Result<Vec<ExistingEvent>, FeedError> {
    let payloads: Vec<EventPayload> = serde_json::from_str(json)?;
    payloads
        .into_iter()
        .map(|p| -> Result<ExistingEvent, FeedError> {
            let start = local_ms(tz, parse_local_datetime(&p.from_)?);
            let end = local_ms(tz, parse_local_datetime(&p.to_)?);
            Ok(ExistingEvent {
                id: p.id,
                resource_ids: p.resources,
                span: Span::new(start, end)?,
                kind: p.kind,
                title: p.name,
            })
        })
        .collect()
}
