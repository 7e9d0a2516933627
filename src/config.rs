use std::path::PathBuf;
use std::str::FromStr;

use chrono::NaiveTime;

use crate::model::{MINUTE_MS, Ms};

/// Upper bound for every minute-valued scheduler setting.
const MAX_SETTING_MS: Ms = 24 * 60 * MINUTE_MS;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Malformed { key: &'static str, value: String },
    #[error("invalid scheduler config: {0}")]
    Invalid(&'static str),
}

/// Scheduling constants, injected into the engine at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchedulerConfig {
    /// Required gap on each side of an active booking.
    pub buffer_ms: Ms,
    pub min_duration_ms: Ms,
    pub max_duration_ms: Ms,
    /// Business hours, applied to a calendar date in UTC.
    pub opening: NaiveTime,
    pub closing: NaiveTime,
    /// Granularity of candidate start times.
    pub slot_step_ms: Ms,
    pub default_slot_minutes: i64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            buffer_ms: 10 * MINUTE_MS,
            min_duration_ms: 15 * MINUTE_MS,
            max_duration_ms: 120 * MINUTE_MS,
            opening: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            closing: NaiveTime::from_hms_opt(18, 0, 0).unwrap_or(NaiveTime::MIN),
            slot_step_ms: 15 * MINUTE_MS,
            default_slot_minutes: 30,
        }
    }
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Missing keys keep their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let d = Self::default();
        let minutes = |key: &'static str, default: Ms| -> Result<Ms, ConfigError> {
            let value: Ms = parse_or(&lookup, key, default / MINUTE_MS)?;
            value.checked_mul(MINUTE_MS).ok_or_else(|| ConfigError::Malformed {
                key,
                value: value.to_string(),
            })
        };
        let config = Self {
            buffer_ms: minutes("SLOTD_BUFFER_MINUTES", d.buffer_ms)?,
            min_duration_ms: minutes("SLOTD_MIN_DURATION_MINUTES", d.min_duration_ms)?,
            max_duration_ms: minutes("SLOTD_MAX_DURATION_MINUTES", d.max_duration_ms)?,
            opening: parse_time_or(&lookup, "SLOTD_OPENING", d.opening)?,
            closing: parse_time_or(&lookup, "SLOTD_CLOSING", d.closing)?,
            slot_step_ms: minutes("SLOTD_SLOT_STEP_MINUTES", d.slot_step_ms)?,
            default_slot_minutes: parse_or(&lookup, "SLOTD_DEFAULT_SLOT_MINUTES", d.default_slot_minutes)?,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.buffer_ms < 0 {
            return Err(ConfigError::Invalid("buffer must not be negative"));
        }
        if self.buffer_ms > MAX_SETTING_MS
            || self.max_duration_ms > MAX_SETTING_MS
            || self.slot_step_ms > MAX_SETTING_MS
            || self.default_slot_minutes.saturating_mul(MINUTE_MS) > MAX_SETTING_MS
        {
            return Err(ConfigError::Invalid("durations must not exceed one day"));
        }
        if self.min_duration_ms <= 0 {
            return Err(ConfigError::Invalid("minimum duration must be positive"));
        }
        if self.min_duration_ms > self.max_duration_ms {
            return Err(ConfigError::Invalid("minimum duration exceeds maximum"));
        }
        if self.slot_step_ms <= 0 {
            return Err(ConfigError::Invalid("slot step must be positive"));
        }
        if self.default_slot_minutes <= 0 {
            return Err(ConfigError::Invalid("default slot duration must be positive"));
        }
        if self.closing <= self.opening {
            return Err(ConfigError::Invalid("closing time must be after opening time"));
        }
        Ok(())
    }
}

/// Process-level settings for the `slotd` binary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub max_connections: usize,
    pub compact_threshold: u64,
    pub metrics_port: Option<u16>,
    pub seed_resources: Vec<String>,
}

impl ServerConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let metrics_port = match lookup("SLOTD_METRICS_PORT") {
            Some(v) => Some(v.trim().parse().map_err(|_| ConfigError::Malformed {
                key: "SLOTD_METRICS_PORT",
                value: v.clone(),
            })?),
            None => None,
        };
        let seed_resources = lookup("SLOTD_SEED_RESOURCES")
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            bind: lookup("SLOTD_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_or(&lookup, "SLOTD_PORT", 7070)?,
            data_dir: PathBuf::from(lookup("SLOTD_DATA_DIR").unwrap_or_else(|| "./data".into())),
            max_connections: parse_or(&lookup, "SLOTD_MAX_CONNECTIONS", 256)?,
            compact_threshold: parse_or(&lookup, "SLOTD_COMPACT_THRESHOLD", 1000)?,
            metrics_port,
            seed_resources,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::Malformed { key, value: v }),
        None => Ok(default),
    }
}

fn parse_time_or(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: NaiveTime,
) -> Result<NaiveTime, ConfigError> {
    match lookup(key) {
        Some(v) => NaiveTime::parse_from_str(v.trim(), "%H:%M")
            .map_err(|_| ConfigError::Malformed { key, value: v }),
        None => Ok(default),
    }
}
