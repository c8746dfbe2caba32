//! Per-recipient alert preferences

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a recipient's alerts are filtered by name.
///
/// Stored as a plain string. Anything that is not one of the known modes is
/// kept verbatim as `Unknown` and filters fail-open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FilterMode {
    Blacklist,
    Whitelist,
    Smart,
    Unknown(String),
}

impl FilterMode {
    /// Next mode in the settings-menu cycle. Unknown modes restart at blacklist.
    pub fn next(&self) -> FilterMode {
        match self {
            FilterMode::Blacklist => FilterMode::Whitelist,
            FilterMode::Whitelist => FilterMode::Smart,
            FilterMode::Smart | FilterMode::Unknown(_) => FilterMode::Blacklist,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FilterMode::Blacklist => "blacklist",
            FilterMode::Whitelist => "whitelist",
            FilterMode::Smart => "smart",
            FilterMode::Unknown(raw) => raw,
        }
    }
}

impl From<String> for FilterMode {
    fn from(raw: String) -> Self {
        match raw.as_str() {
            "blacklist" => FilterMode::Blacklist,
            "whitelist" => FilterMode::Whitelist,
            "smart" => FilterMode::Smart,
            _ => FilterMode::Unknown(raw),
        }
    }
}

impl From<FilterMode> for String {
    fn from(mode: FilterMode) -> Self {
        mode.as_str().to_string()
    }
}

impl fmt::Display for FilterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time-of-day range during which alerts are dropped at send time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuietHours {
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl QuietHours {
    pub fn new(start: NaiveTime, end: NaiveTime) -> Self {
        Self { start, end }
    }

    /// Both ends are inclusive. `start >= end` wraps past midnight, so an
    /// equal start and end covers the whole day.
    pub fn contains(&self, t: NaiveTime) -> bool {
        if self.start < self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }

    /// Parses `HH:MM-HH:MM`.
    pub fn parse_range(s: &str) -> Option<QuietHours> {
        let (start, end) = s.split_once('-')?;
        Some(QuietHours::new(parse_hhmm(start)?, parse_hhmm(end)?))
    }
}

pub fn parse_hhmm(s: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M").ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecipientConfig {
    pub mode: FilterMode,
    #[serde(rename = "group_notifications")]
    pub batching: bool,
    /// Debounce window in seconds.
    #[serde(rename = "group_interval")]
    pub batch_window_secs: u64,
    pub quiet_hours_enabled: bool,
    #[serde(with = "hhmm")]
    pub quiet_hours_start: NaiveTime,
    #[serde(with = "hhmm")]
    pub quiet_hours_end: NaiveTime,
    pub ignore_system: bool,
    pub min_cpu_percent: f64,
    pub min_memory_mb: f64,
    pub track_stats: bool,
    pub last_message_id: Option<i64>,
    pub update_single_message: bool,
}

impl Default for RecipientConfig {
    fn default() -> Self {
        RecipientConfig {
            mode: FilterMode::Blacklist,
            batching: true,
            batch_window_secs: 30,
            quiet_hours_enabled: false,
            quiet_hours_start: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            quiet_hours_end: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            ignore_system: true,
            min_cpu_percent: 0.0,
            min_memory_mb: 0.0,
            track_stats: true,
            last_message_id: None,
            update_single_message: false,
        }
    }
}

impl RecipientConfig {
    pub fn quiet_hours(&self) -> Option<QuietHours> {
        self.quiet_hours_enabled
            .then(|| QuietHours::new(self.quiet_hours_start, self.quiet_hours_end))
    }

    pub fn is_quiet_at(&self, t: NaiveTime) -> bool {
        self.quiet_hours().is_some_and(|q| q.contains(t))
    }
}

/// `HH:MM` (de)serialization for `NaiveTime`.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(t: &NaiveTime, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&t.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<NaiveTime, D::Error> {
        let raw = String::deserialize(d)?;
        super::parse_hhmm(&raw).ok_or_else(|| de::Error::custom(format!("invalid time {raw:?}")))
    }
}
