use tracing_subscriber::EnvFilter;

use crate::model::ConflictReason;

// ── RED metrics (request-driven) ────────────────────────────────

/// Counter: conflict checks decided. Labels: reason (`allowed` when permitted).
pub const DECISIONS_TOTAL: &str = "slotgate_decisions_total";

/// Histogram: conflict check latency in seconds.
pub const CHECK_DURATION_SECONDS: &str = "slotgate_check_duration_seconds";

// ── USE metrics (resource utilization) ──────────────────────────

/// Counter: snapshots installed. Labels: change.
pub const SNAPSHOT_REBUILDS_TOTAL: &str = "slotgate_snapshot_rebuilds_total";

/// Gauge: open booking contexts.
pub const CONTEXTS_ACTIVE: &str = "slotgate_contexts_active";

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`).
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Short label for a decision's reason, for metrics.
pub fn reason_label(reason: Option<&ConflictReason>) -> &'static str {
    match reason {
        None => "allowed",
        Some(ConflictReason::PastStart) => "past_start",
        Some(ConflictReason::CalendarDeactivated) => "calendar_deactivated",
        Some(ConflictReason::ResourceApplicationDeactivated { .. }) => "resource_application_deactivated",
        Some(ConflictReason::ClosedHours) => "closed_hours",
        Some(ConflictReason::DenyIfBookedOverlap { .. }) => "deny_if_booked_overlap",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_match_serialized_reason_tags() {
        let reasons = [
            ConflictReason::PastStart,
            ConflictReason::CalendarDeactivated,
            ConflictReason::ResourceApplicationDeactivated { resource_id: ulid::Ulid::new() },
            ConflictReason::ClosedHours,
            ConflictReason::DenyIfBookedOverlap { event_title: None, resource_names: vec![] },
        ];
        for reason in reasons {
            let json = serde_json::to_value(&reason).unwrap();
            assert_eq!(json["reason"], reason_label(Some(&reason)));
        }
        assert_eq!(reason_label(None), "allowed");
    }

    #[test]
    fn init_tracing_is_idempotent() {
        init_tracing();
        init_tracing();
    }
}
