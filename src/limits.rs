//! Hard caps applied at the engine boundary.

pub const MAX_CONTEXTS: usize = 10_000;
pub const MAX_EVENTS_PER_CONTEXT: usize = 200_000;
pub const MAX_SEASONS_PER_CONTEXT: usize = 1_000;
pub const MAX_POLICIES_PER_CONTEXT: usize = 10_000;
pub const MAX_RESOURCES_PER_SELECTION: usize = 512;
/// Longest visible window, in days.
pub const MAX_WINDOW_DAYS: i64 = 371;
