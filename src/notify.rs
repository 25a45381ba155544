use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;
use ulid::Ulid;

const CHANNEL_CAPACITY: usize = 256;

/// Which input of a booking context was replaced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Change {
    Opened,
    Seasons,
    Window,
    Events,
    Policies,
    Deactivation,
    Refreshed,
    Closed,
}

impl Change {
    pub fn label(&self) -> &'static str {
        match self {
            Change::Opened => "opened",
            Change::Seasons => "seasons",
            Change::Window => "window",
            Change::Events => "events",
            Change::Policies => "policies",
            Change::Deactivation => "deactivation",
            Change::Refreshed => "refreshed",
            Change::Closed => "closed",
        }
    }
}

/// Sent after a new snapshot is installed; earlier decisions for the building
/// may be stale and should be re-checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SnapshotChanged {
    pub building_id: Ulid,
    pub version: u64,
    pub change: Change,
}

/// Broadcast hub for snapshot changes per building.
pub struct NotifyHub {
    channels: DashMap<Ulid, broadcast::Sender<SnapshotChanged>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to changes for a building. Creates the channel if needed.
    pub fn subscribe(&self, building_id: Ulid) -> broadcast::Receiver<SnapshotChanged> {
        let sender = self
            .channels
            .entry(building_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    /// Send a notification. No-op if nobody is listening.
    pub fn send(&self, change: SnapshotChanged) {
        if let Some(sender) = self.channels.get(&change.building_id) {
            let _ = sender.send(change);
        }
    }

    /// Remove a channel (e.g. when the context is closed).
    pub fn remove(&self, building_id: &Ulid) {
        self.channels.remove(building_id);
    }
}
