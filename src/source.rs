use async_trait::async_trait;
use chrono_tz::Tz;
use ulid::Ulid;

use crate::feed::{self, FeedError};
use crate::model::*;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceError(pub String);

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for SourceError {}

impl From<FeedError> for SourceError {
    fn from(e: FeedError) -> Self {
        SourceError(e.to_string())
    }
}

/// Where a booking context's inputs come from (booking configuration,
/// calendar and resource backends, deactivation rules).
#[async_trait]
pub trait CalendarSource: Send + Sync {
    async fn seasons(&self, building_id: Ulid) -> Result<Vec<Season>, SourceError>;
    async fn events(&self, building_id: Ulid, window: Span) -> Result<Vec<ExistingEvent>, SourceError>;
    async fn policies(&self, building_id: Ulid) -> Result<Vec<ResourceBookingPolicy>, SourceError>;
    async fn deactivation(&self, building_id: Ulid) -> Result<Deactivation, SourceError>;
}

/// A source over backend payloads that were already fetched, e.g. a cached
/// response or a fixture. Payloads are parsed on every call.
#[derive(Debug, Clone)]
pub struct JsonSource {
    pub tz: Tz,
    pub seasons: String,
    pub events: String,
    pub resources: String,
    pub deactivation: Deactivation,
}

impl JsonSource {
    pub fn new(tz: Tz) -> Self {
        Self {
            tz,
            seasons: "[]".into(),
            events: "[]".into(),
            resources: "[]".into(),
            deactivation: Deactivation::default(),
        }
    }
}

#[async_trait]
impl CalendarSource for JsonSource {
    async fn seasons(&self, _building_id: Ulid) -> Result<Vec<Season>, SourceError> {
        Ok(feed::parse_seasons(&self.seasons)?)
    }

    async fn events(&self, _building_id: Ulid, window: Span) -> Result<Vec<ExistingEvent>, SourceError> {
        let mut events = feed::parse_events(&self.events, &self.tz)?;
        events.retain(|e| e.span.overlaps(&window));
        Ok(events)
    }

    async fn policies(&self, _building_id: Ulid) -> Result<Vec<ResourceBookingPolicy>, SourceError> {
        Ok(feed::parse_policies(&self.resources)?)
    }

    async fn deactivation(&self, _building_id: Ulid) -> Result<Deactivation, SourceError> {
        Ok(self.deactivation.clone())
    }
}
