use std::env;
use std::str::FromStr;

use time::macros::format_description;
use time::{Duration, UtcOffset};

use crate::access::PermissionMatrix;
use crate::compliance::ThresholdPolicy;
use crate::errors::ConfigError;

pub const UTC_OFFSET: &str = "TRAINING_UTC_OFFSET";
pub const SESSION_MINUTES: &str = "TRAINING_SESSION_MINUTES";
pub const PERMISSIONS: &str = "TRAINING_PERMISSIONS";
pub const FULLY_COMPLIANT_RATE: &str = "TRAINING_FULLY_COMPLIANT_RATE";
pub const PARTIALLY_COMPLIANT_RATE: &str = "TRAINING_PARTIALLY_COMPLIANT_RATE";

/// Returns the value of the named environment variable, if it is set.
pub fn get_variable(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// How event dates map onto instants.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Schedule {
    /// Offset of the wall-clock dates and times entered for events.
    pub utc_offset: UtcOffset,

    /// How long after its start an event counts as completed.
    pub session_length: Duration,
}

impl Default for Schedule {
    fn default() -> Self {
        Schedule {
            utc_offset: UtcOffset::UTC,
            session_length: Duration::minutes(480),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    pub schedule: Schedule,
    pub permissions: PermissionMatrix,
    pub compliance: ThresholdPolicy,
}

impl Config {
    /// Reads the configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Config::from_lookup(get_variable)
    }

    /// Reads the configuration through `lookup`, falling back to defaults
    /// for anything it does not return.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let utc_offset = match lookup(UTC_OFFSET) {
            Some(raw) => parse_offset(&raw)?,
            None => defaults.schedule.utc_offset,
        };

        let session_length = match lookup(SESSION_MINUTES) {
            Some(raw) => {
                let minutes: u32 = parse(SESSION_MINUTES, &raw)?;
                Duration::minutes(i64::from(minutes))
            }
            None => defaults.schedule.session_length,
        };

        let permissions = match lookup(PERMISSIONS) {
            Some(raw) => serde_json::from_str(&raw).map_err(|source| ConfigError::Permissions {
                name: PERMISSIONS,
                source,
            })?,
            None => defaults.permissions,
        };

        let fully = match lookup(FULLY_COMPLIANT_RATE) {
            Some(raw) => parse(FULLY_COMPLIANT_RATE, &raw)?,
            None => defaults.compliance.fully,
        };
        let partially = match lookup(PARTIALLY_COMPLIANT_RATE) {
            Some(raw) => parse(PARTIALLY_COMPLIANT_RATE, &raw)?,
            None => defaults.compliance.partially,
        };
        let compliance = ThresholdPolicy::new(fully, partially).ok_or_else(|| ConfigError::InvalidValue {
            name: FULLY_COMPLIANT_RATE,
            value: format!("{} / {}", fully, partially),
            reason: "rates must satisfy 0 <= partially <= fully <= 1".to_owned(),
        })?;

        Ok(Config {
            schedule: Schedule {
                utc_offset,
                session_length,
            },
            permissions,
            compliance,
        })
    }
}

fn parse<T>(name: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        name,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}

fn parse_offset(raw: &str) -> Result<UtcOffset, ConfigError> {
    UtcOffset::parse(
        raw.trim(),
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|e| ConfigError::InvalidValue {
        name: UTC_OFFSET,
        value: raw.to_owned(),
        reason: e.to_string(),
    })
}
