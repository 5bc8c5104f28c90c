use std::path::PathBuf;
use std::time::Duration;

use crate::limits::{DEFAULT_MAX_GUEST_STAY_DAYS, DEFAULT_PAST_GUEST_WINDOW_DAYS};

/// Business rules that vary per deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    /// Open-ended guest visits older than this many days are reported as past.
    pub past_guest_window_days: u32,
    /// Longest allowed gap between a guest's visit and checkout dates.
    pub max_guest_stay_days: u32,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            past_guest_window_days: DEFAULT_PAST_GUEST_WINDOW_DAYS,
            max_guest_stay_days: DEFAULT_MAX_GUEST_STAY_DAYS,
        }
    }
}

/// Process configuration, read from `ROOMLEDGER_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    /// Compact once this many units were appended since the last compaction.
    pub compact_threshold: u64,
    pub compact_interval: Duration,
    pub metrics_port: Option<u16>,
    pub policy: Policy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            compact_threshold: 1000,
            compact_interval: Duration::from_secs(30),
            metrics_port: None,
            policy: Policy::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset or unparsable values keep their default.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|s| s.trim().parse::<u64>().ok());

        Self {
            data_dir: lookup("ROOMLEDGER_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.data_dir),
            compact_threshold: parsed("ROOMLEDGER_COMPACT_THRESHOLD")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.compact_threshold),
            compact_interval: parsed("ROOMLEDGER_COMPACT_INTERVAL_SECS")
                .filter(|n| *n > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.compact_interval),
            metrics_port: lookup("ROOMLEDGER_METRICS_PORT").and_then(|s| s.trim().parse().ok()),
            policy: Policy {
                past_guest_window_days: parsed("ROOMLEDGER_PAST_GUEST_WINDOW_DAYS")
                    .and_then(|n| u32::try_from(n).ok())
                    .unwrap_or(defaults.policy.past_guest_window_days),
                max_guest_stay_days: parsed("ROOMLEDGER_MAX_GUEST_STAY_DAYS")
                    .and_then(|n| u32::try_from(n).ok())
                    .filter(|n| *n > 0)
                    .unwrap_or(defaults.policy.max_guest_stay_days),
            },
        }
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("roomledger.wal")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config_from(&[]);
        assert_eq!(config, Config::default());
        assert_eq!(config.policy.past_guest_window_days, 7);
        assert_eq!(config.policy.max_guest_stay_days, 30);
        assert_eq!(config.wal_path(), PathBuf::from("./data/roomledger.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = config_from(&[
            ("ROOMLEDGER_DATA_DIR", "/var/lib/rooms"),
            ("ROOMLEDGER_COMPACT_THRESHOLD", "50"),
            ("ROOMLEDGER_COMPACT_INTERVAL_SECS", "5"),
            ("ROOMLEDGER_METRICS_PORT", "9100"),
            ("ROOMLEDGER_PAST_GUEST_WINDOW_DAYS", "14"),
            ("ROOMLEDGER_MAX_GUEST_STAY_DAYS", "60"),
        ]);
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/rooms"));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.compact_interval, Duration::from_secs(5));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.policy.past_guest_window_days, 14);
        assert_eq!(config.policy.max_guest_stay_days, 60);
    }

    #[test]
    fn garbage_falls_back_to_defaults() {
        let config = config_from(&[
            ("ROOMLEDGER_COMPACT_THRESHOLD", "lots"),
            ("ROOMLEDGER_METRICS_PORT", "99999"),
            ("ROOMLEDGER_MAX_GUEST_STAY_DAYS", "0"),
        ]);
        assert_eq!(config.compact_threshold, 1000);
        assert_eq!(config.metrics_port, None);
        assert_eq!(config.policy.max_guest_stay_days, 30);
    }

    #[test]
    fn zero_past_window_is_allowed() {
        let config = config_from(&[("ROOMLEDGER_PAST_GUEST_WINDOW_DAYS", "0")]);
        assert_eq!(config.policy.past_guest_window_days, 0);
    }
}
