//! Runtime configuration.
//!
//! Loaded with the `config` crate from an optional TOML file followed by
//! `SLOTKEEPER__<SECTION>__<KEY>` environment variables. Every key has a
//! default, so an empty configuration is valid.

use crate::error::{BookingError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub booking: BookingSettings,
    #[serde(default)]
    pub sweeper: SweeperSettings,
    #[serde(default)]
    pub notifications: NotificationSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Ledger storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSettings {
    /// RocksDB directory. In-memory storage when unset.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// How long a unit of work waits for one row lock.
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

/// Reservation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingSettings {
    /// Upper bound for one create/cancel call, lock waits included.
    #[serde(default = "default_operation_timeout_ms")]
    pub operation_timeout_ms: u64,
}

/// Expiry sweeper settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SweeperSettings {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Interval in seconds between sweeps.
    #[serde(default = "default_sweep_interval")]
    pub interval_seconds: u64,
    /// Upper bound of the random delay added to every interval.
    #[serde(default = "default_sweep_jitter")]
    pub jitter_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettings {
    /// Notifications buffered before new ones are dropped.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

/// Logging and tracing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info"`.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl Settings {
    /// Merges the optional file at `path` with `SLOTKEEPER__` environment variables.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(true));
        }
        let config = builder
            .add_source(
                config::Environment::with_prefix("SLOTKEEPER")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| BookingError::Config(format!("failed to build config: {e}")))?;

        config
            .try_deserialize()
            .map_err(|e| BookingError::Config(format!("failed to deserialize config: {e}")))
    }
}

impl StoreSettings {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl BookingSettings {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }
}

impl SweeperSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn jitter(&self) -> Duration {
        Duration::from_secs(self.jitter_seconds)
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: None,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl Default for BookingSettings {
    fn default() -> Self {
        Self {
            operation_timeout_ms: default_operation_timeout_ms(),
        }
    }
}

impl Default for SweeperSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: default_sweep_interval(),
            jitter_seconds: default_sweep_jitter(),
        }
    }
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_lock_timeout_ms() -> u64 {
    2_000
}

fn default_operation_timeout_ms() -> u64 {
    5_000
}

fn default_sweep_interval() -> u64 {
    3_600
}

fn default_sweep_jitter() -> u64 {
    60
}

fn default_queue_capacity() -> usize {
    100
}

fn default_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_without_sources() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.store.lock_timeout(), Duration::from_secs(2));
        assert_eq!(settings.sweeper.interval(), Duration::from_secs(3_600));
        assert!(settings.sweeper.enabled);
        assert_eq!(settings.notifications.queue_capacity, 100);
        assert_eq!(settings.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[sweeper]\ninterval_seconds = 30\nenabled = false\n\n[logging]\nformat = \"json\""
        )
        .unwrap();

        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.sweeper.interval(), Duration::from_secs(30));
        assert!(!settings.sweeper.enabled);
        assert_eq!(settings.sweeper.jitter(), Duration::from_secs(60));
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.booking.operation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = Settings::load(Some(Path::new("/nonexistent/slotkeeper.toml")));
        assert!(matches!(result, Err(BookingError::Config(_))));
    }
}
