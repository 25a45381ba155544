use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use chrono_tz::Tz;
use tokio::sync::broadcast;
use ulid::Ulid;

use slotgate::config::EngineConfig;
use slotgate::engine::{Engine, EngineError};
use slotgate::model::*;
use slotgate::notify::{Change, NotifyHub, SnapshotChanged};
use slotgate::source::JsonSource;

// ── Test infrastructure ──────────────────────────────────────

const TZ: Tz = chrono_tz::Europe::Oslo;

fn start_engine() -> Arc<Engine> {
    slotgate::observability::init_tracing();
    Arc::new(Engine::new(EngineConfig::default(), Arc::new(NotifyHub::new())))
}

fn window_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
}

fn local(s: &str) -> Ms {
    local_ms(&TZ, chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap())
}

async fn next(rx: &mut broadcast::Receiver<SnapshotChanged>) -> SnapshotChanged {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for notification")
        .expect("channel closed")
}

fn hall_source(hall: Ulid, stage: Ulid) -> JsonSource {
    let mut source = JsonSource::new(TZ);
    source.seasons = format!(
        r#"[{{"id":"{}","from_":"2024-01-01","to_":"2024-12-31","active":true,
             "boundaries":[{{"wday":1,"from_":"08:00:00","to_":"22:00:00"}},
                           {{"wday":2,"from_":"08:00:00","to_":"22:00:00"}}]}}]"#,
        Ulid::new()
    );
    source.events = format!(
        r#"[{{"id":"{}","type":"booking","from_":"2024-06-11 18:00:00","to_":"2024-06-11 20:00:00",
             "resources":["{hall}","{stage}"],"name":"Concert"}}]"#,
        Ulid::new()
    );
    source.resources = format!(
        r#"[{{"id":"{hall}","name":"Hall","deny_application_if_booked":0,"direct_booking":null}},
            {{"id":"{stage}","name":"Stage","deny_application_if_booked":1,"direct_booking":null}}]"#
    );
    source
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn refresh_then_check_through_public_api() {
    let engine = start_engine();
    let building = Ulid::new();
    let (hall, stage) = (Ulid::new(), Ulid::new());
    let now = local("2024-06-10 07:00");

    engine
        .open_context(building, None, false, window_start(), now)
        .unwrap();
    engine.refresh(building, &hall_source(hall, stage), now).await.unwrap();

    let during_concert = Span::new(local("2024-06-11 19:00"), local("2024-06-11 21:00")).unwrap();

    // Hall alone has no deny flag: the overlap is tolerated.
    let hall_only = CandidateSelection::new([hall], during_concert, None).unwrap();
    assert!(engine.check_at(building, &hall_only, now).unwrap().is_allowed());

    // Adding the stage brings its deny flag into the selection.
    let both = CandidateSelection::new([hall, stage], during_concert, None).unwrap();
    let decision = engine.check_at(building, &both, now).unwrap();
    assert_eq!(
        decision.reason(),
        Some(&ConflictReason::DenyIfBookedOverlap {
            event_title: Some("Concert".into()),
            resource_names: vec!["Stage".into()],
        })
    );

    // Past 22:00 Oslo time the building is closed.
    let late = Span::new(local("2024-06-11 21:30"), local("2024-06-11 22:30")).unwrap();
    let decision = engine
        .check_at(building, &CandidateSelection::new([hall], late, None).unwrap(), now)
        .unwrap();
    assert_eq!(decision.reason(), Some(&ConflictReason::ClosedHours));

    // Before now is always rejected first.
    let earlier = Span::new(local("2024-06-10 06:00"), local("2024-06-10 09:00")).unwrap();
    let decision = engine
        .check_at(building, &CandidateSelection::new([hall], earlier, None).unwrap(), now)
        .unwrap();
    assert_eq!(decision.reason(), Some(&ConflictReason::PastStart));
}

#[tokio::test]
async fn subscribers_follow_snapshot_versions() {
    let engine = start_engine();
    let building = Ulid::new();
    let mut rx = engine.notify.subscribe(building);
    let now = local("2024-06-10 07:00");

    engine
        .open_context(building, Some(TZ), false, window_start(), now)
        .unwrap();
    engine
        .refresh(building, &hall_source(Ulid::new(), Ulid::new()), now)
        .await
        .unwrap();
    engine.set_deactivation(building, Deactivation::calendar_deactivated()).unwrap();
    engine.close_context(&building).unwrap();

    let changes = [
        next(&mut rx).await,
        next(&mut rx).await,
        next(&mut rx).await,
        next(&mut rx).await,
    ];
    let kinds: Vec<Change> = changes.iter().map(|c| c.change).collect();
    assert_eq!(
        kinds,
        vec![Change::Opened, Change::Refreshed, Change::Deactivation, Change::Closed]
    );
    let versions: Vec<u64> = changes.iter().map(|c| c.version).collect();
    assert_eq!(versions, vec![0, 1, 2, 3]);
    assert!(changes.iter().all(|c| c.building_id == building));
}

#[tokio::test]
async fn concurrent_checks_see_whole_snapshots() {
    let engine = start_engine();
    let building = Ulid::new();
    let resource = Ulid::new();
    let now = local("2024-06-10 00:00");
    engine
        .open_context(building, Some(TZ), false, window_start(), now)
        .unwrap();
    let mut policy = ResourceBookingPolicy::new(resource);
    policy.deny_if_booked = true;
    engine.replace_policies(building, vec![policy]).unwrap();

    let slot = Span::new(local("2024-06-12 10:00"), local("2024-06-12 11:00")).unwrap();
    let booked = vec![ExistingEvent {
        id: Ulid::new(),
        resource_ids: vec![resource],
        span: slot,
        kind: EventKind::Allocation,
        title: None,
    }];

    let writer = {
        let engine = engine.clone();
        tokio::spawn(async move {
            for i in 0..200 {
                let events = if i % 2 == 0 { booked.clone() } else { Vec::new() };
                engine.replace_events(building, events).unwrap();
                tokio::task::yield_now().await;
            }
        })
    };

    let mut readers = Vec::new();
    for _ in 0..4 {
        let engine = engine.clone();
        readers.push(tokio::spawn(async move {
            let candidate = CandidateSelection::new([resource], slot, None).unwrap();
            for _ in 0..500 {
                let ctx = engine.context(&building).unwrap();
                let decision = ctx.check(&candidate, now);
                // Each snapshot either holds the booking or it does not.
                assert_eq!(decision.is_allowed(), ctx.events().is_empty());
                tokio::task::yield_now().await;
            }
        }));
    }

    writer.await.unwrap();
    for r in readers {
        r.await.unwrap();
    }
}

#[tokio::test]
async fn closed_context_rejects_further_work() {
    let engine = start_engine();
    let building = Ulid::new();
    engine
        .open_context(building, Some(TZ), false, window_start(), 0)
        .unwrap();
    engine.close_context(&building).unwrap();

    let result = engine.refresh(building, &JsonSource::new(TZ), 0).await;
    assert!(matches!(result, Err(EngineError::NotFound(id)) if id == building));
}
