use chrono_tz::Tz;

use crate::limits::{MAX_CONTEXTS, MAX_EVENTS_PER_CONTEXT, MAX_WINDOW_DAYS};

/// Longest window `window_weeks` may describe.
const MAX_WINDOW_WEEKS: u32 = (MAX_WINDOW_DAYS / 7) as u32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Zone for contexts opened without an explicit one.
    pub default_timezone: Tz,
    /// Length of the visible window in weeks.
    pub window_weeks: u32,
    pub max_events_per_context: usize,
    pub max_contexts: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_timezone: chrono_tz::Europe::Oslo,
            window_weeks: 4,
            max_events_per_context: MAX_EVENTS_PER_CONTEXT,
            max_contexts: MAX_CONTEXTS,
        }
    }
}

impl EngineConfig {
    /// Reads `SLOTGATE_TIMEZONE`, `SLOTGATE_WINDOW_WEEKS`, `SLOTGATE_MAX_EVENTS`
    /// and `SLOTGATE_MAX_CONTEXTS`. Missing or unparsable values keep their
    /// defaults; numbers are capped at the hard limits.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let default_timezone = lookup("SLOTGATE_TIMEZONE")
            .and_then(|s| s.parse::<Tz>().ok())
            .unwrap_or(defaults.default_timezone);
        let window_weeks = lookup("SLOTGATE_WINDOW_WEEKS")
            .and_then(|s| s.parse().ok())
            .filter(|w| *w > 0)
            .map(|w: u32| w.min(MAX_WINDOW_WEEKS))
            .unwrap_or(defaults.window_weeks);
        let max_events_per_context = lookup("SLOTGATE_MAX_EVENTS")
            .and_then(|s| s.parse().ok())
            .map(|n: usize| n.min(MAX_EVENTS_PER_CONTEXT))
            .unwrap_or(defaults.max_events_per_context);
        let max_contexts = lookup("SLOTGATE_MAX_CONTEXTS")
            .and_then(|s| s.parse().ok())
            .map(|n: usize| n.min(MAX_CONTEXTS))
            .unwrap_or(defaults.max_contexts);
        Self {
            default_timezone,
            window_weeks,
            max_events_per_context,
            max_contexts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_without_env() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SLOTGATE_TIMEZONE", "UTC"),
            ("SLOTGATE_WINDOW_WEEKS", "6"),
            ("SLOTGATE_MAX_EVENTS", "500"),
            ("SLOTGATE_MAX_CONTEXTS", "20"),
        ]));
        assert_eq!(config.default_timezone, Tz::UTC);
        assert_eq!(config.window_weeks, 6);
        assert_eq!(config.max_events_per_context, 500);
        assert_eq!(config.max_contexts, 20);
    }

    #[test]
    fn bad_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("SLOTGATE_TIMEZONE", "Mars/Olympus"),
            ("SLOTGATE_WINDOW_WEEKS", "0"),
            ("SLOTGATE_MAX_EVENTS", "lots"),
        ]));
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn max_events_is_capped() {
        let config = EngineConfig::from_lookup(lookup(&[("SLOTGATE_MAX_EVENTS", "999999999")]));
        assert_eq!(config.max_events_per_context, MAX_EVENTS_PER_CONTEXT);
    }

    #[test]
    fn window_weeks_is_capped_to_window_limit() {
        let config = EngineConfig::from_lookup(lookup(&[("SLOTGATE_WINDOW_WEEKS", "4294967295")]));
        assert_eq!(config.window_weeks, 53);
        assert!(i64::from(config.window_weeks) * 7 <= MAX_WINDOW_DAYS);
    }
}
