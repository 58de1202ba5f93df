use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Rules the aggregate applies while validating.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulingPolicy {
    /// Permit the same activity more than once in one appointment ("two units of a service").
    pub allow_duplicate_activities: bool,
}

/// Settings for the reference [`Scheduler`](crate::engine::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub wal_path: PathBuf,
    /// Compact the WAL once this many appends accumulate.
    pub compact_threshold: u64,
    pub policy: SchedulingPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            wal_path: PathBuf::from("./data/appointments.wal"),
            compact_threshold: 1000,
            policy: SchedulingPolicy::default(),
        }
    }
}

impl SchedulerConfig {
    pub fn with_wal_path(wal_path: impl Into<PathBuf>) -> Self {
        Self {
            wal_path: wal_path.into(),
            ..Self::default()
        }
    }

    /// Read `APPOINTMENTS_*` variables, falling back to defaults for unset or unparsable ones.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let wal_path = var("APPOINTMENTS_WAL_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.wal_path);
        let compact_threshold: u64 = var("APPOINTMENTS_COMPACT_THRESHOLD")
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.compact_threshold);
        let allow_duplicate_activities = var("APPOINTMENTS_ALLOW_DUPLICATE_ACTIVITIES")
            .and_then(|s| parse_bool(&s))
            .unwrap_or(defaults.policy.allow_duplicate_activities);

        Self {
            wal_path,
            compact_threshold,
            policy: SchedulingPolicy {
                allow_duplicate_activities,
            },
        }
    }
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
