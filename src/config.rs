use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::model::UserId;
use crate::reminder::ReminderPolicy;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Invalid { var: &'static str, value: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Invalid { var, value } => write!(f, "invalid value for {var}: {value:?}"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Daemon settings, read from `WEEKSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub data_dir: PathBuf,
    pub operator_id: Option<UserId>,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub session_ttl: Duration,
    pub reminder_period: Duration,
    pub reminder_policy: ReminderPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            operator_id: None,
            metrics_port: None,
            compact_threshold: 1000,
            session_ttl: Duration::from_secs(3600),
            reminder_period: Duration::from_secs(60),
            reminder_policy: ReminderPolicy::Window,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset variables take their defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let reminder_policy = match lookup("WEEKSLOT_REMINDER_POLICY") {
            Some(value) => ReminderPolicy::parse(&value).ok_or(ConfigError::Invalid {
                var: "WEEKSLOT_REMINDER_POLICY",
                value,
            })?,
            None => defaults.reminder_policy,
        };
        Ok(Self {
            data_dir: lookup("WEEKSLOT_DATA_DIR").map_or(defaults.data_dir, PathBuf::from),
            operator_id: parsed(&lookup, "WEEKSLOT_OPERATOR_ID")?,
            metrics_port: parsed(&lookup, "WEEKSLOT_METRICS_PORT")?,
            compact_threshold: parsed(&lookup, "WEEKSLOT_COMPACT_THRESHOLD")?
                .unwrap_or(defaults.compact_threshold),
            session_ttl: parsed(&lookup, "WEEKSLOT_SESSION_TTL_SECS")?
                .map_or(defaults.session_ttl, Duration::from_secs),
            reminder_period: positive_secs(&lookup, "WEEKSLOT_REMINDER_PERIOD_SECS")?
                .unwrap_or(defaults.reminder_period),
            reminder_policy,
        })
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join("appointments.wal")
    }
}

fn parsed<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError> {
    match lookup(var) {
        None => Ok(None),
        Some(value) => match value.trim().parse() {
            Ok(v) => Ok(Some(v)),
            Err(_) => Err(ConfigError::Invalid { var, value }),
        },
    }
}

/// A period in seconds; zero would make `tokio::time::interval` panic.
fn positive_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<Duration>, ConfigError> {
    match parsed::<u64>(lookup, var)? {
        Some(0) => Err(ConfigError::Invalid { var, value: "0".into() }),
        secs => Ok(secs.map(Duration::from_secs)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn from(pairs: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Config::from_lookup(|var| vars.get(var).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(from(&[]).unwrap(), Config::default());
        assert_eq!(Config::default().wal_path(), PathBuf::from("./data/appointments.wal"));
    }

    #[test]
    fn reads_every_variable() {
        let config = from(&[
            ("WEEKSLOT_DATA_DIR", "/var/lib/weekslot"),
            ("WEEKSLOT_OPERATOR_ID", "123456789"),
            ("WEEKSLOT_METRICS_PORT", "9100"),
            ("WEEKSLOT_COMPACT_THRESHOLD", "50"),
            ("WEEKSLOT_SESSION_TTL_SECS", "120"),
            ("WEEKSLOT_REMINDER_PERIOD_SECS", "30"),
            ("WEEKSLOT_REMINDER_POLICY", "until-due"),
        ])
        .unwrap();
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/weekslot"));
        assert_eq!(config.operator_id, Some(123456789));
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.compact_threshold, 50);
        assert_eq!(config.session_ttl, Duration::from_secs(120));
        assert_eq!(config.reminder_period, Duration::from_secs(30));
        assert_eq!(config.reminder_policy, ReminderPolicy::UntilDue);
    }

    #[test]
    fn malformed_values_rejected() {
        let err = from(&[("WEEKSLOT_OPERATOR_ID", "admin")]).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid { var: "WEEKSLOT_OPERATOR_ID", value: "admin".into() }
        );
        assert!(from(&[("WEEKSLOT_METRICS_PORT", "70000")]).is_err());
        assert!(from(&[("WEEKSLOT_REMINDER_POLICY", "hourly")]).is_err());
        assert!(from(&[("WEEKSLOT_REMINDER_PERIOD_SECS", "0")]).is_err());
    }
}
