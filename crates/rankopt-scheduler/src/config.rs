//! Scheduler configuration.
//!
//! Trigger mode, cadence, and the per-cycle concurrency limits. Built from
//! the `[scheduler]` section of the layered settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use rankopt_types::{SchedulerSettings, TriggerMode};

use crate::jitter::JitterConfig;
use crate::SchedulerError;

/// Configuration for the scheduler service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default)]
    pub trigger: TriggerMode,

    /// Seconds between cycles in interval mode
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 6-field cron expression used in cron mode
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone for cron mode. Defaults to "UTC".
    #[serde(default = "default_timezone")]
    pub default_timezone: String,

    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,

    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,

    #[serde(default)]
    pub jitter_secs: u64,

    /// Budget for a pass's lookup and generation calls; 0 disables it
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,

    /// How long shutdown waits for an in-flight cycle.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

fn default_interval_secs() -> u64 {
    4 * 60 * 60
}

fn default_cron() -> String {
    "0 0 */4 * * *".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_run_on_start() -> bool {
    true
}

fn default_max_concurrent_passes() -> usize {
    8
}

fn default_pass_timeout_secs() -> u64 {
    300
}

fn default_shutdown_timeout() -> u64 {
    30
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            trigger: TriggerMode::default(),
            interval_secs: default_interval_secs(),
            cron: default_cron(),
            default_timezone: default_timezone(),
            run_on_start: default_run_on_start(),
            max_concurrent_passes: default_max_concurrent_passes(),
            jitter_secs: 0,
            pass_timeout_secs: default_pass_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

impl From<&SchedulerSettings> for SchedulerConfig {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            trigger: settings.trigger,
            interval_secs: settings.interval_secs,
            cron: settings.cron.clone(),
            default_timezone: settings.timezone.clone(),
            run_on_start: settings.run_on_start,
            max_concurrent_passes: settings.max_concurrent_passes,
            jitter_secs: settings.jitter_secs,
            pass_timeout_secs: settings.pass_timeout_secs,
            shutdown_timeout_secs: settings.shutdown_timeout_secs,
        }
    }
}

impl SchedulerConfig {
    /// Parse the configured timezone string into a chrono_tz::Tz.
    ///
    /// # Errors
    ///
    /// Returns `SchedulerError::InvalidTimezone` if the timezone string
    /// is not a valid IANA timezone identifier.
    pub fn parse_timezone(&self) -> Result<chrono_tz::Tz, SchedulerError> {
        self.default_timezone
            .parse::<chrono_tz::Tz>()
            .map_err(|_| SchedulerError::InvalidTimezone(self.default_timezone.clone()))
    }

    /// Check the settings the selected trigger mode depends on.
    pub fn validate(&self) -> Result<(), SchedulerError> {
        self.parse_timezone()?;
        if self.max_concurrent_passes == 0 {
            return Err(SchedulerError::InvalidConfig(
                "max_concurrent_passes must be > 0".to_string(),
            ));
        }
        if self.trigger == TriggerMode::Interval && self.interval_secs == 0 {
            return Err(SchedulerError::InvalidConfig(
                "interval_secs must be > 0 in interval mode".to_string(),
            ));
        }
        Ok(())
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn pass_timeout(&self) -> Option<Duration> {
        (self.pass_timeout_secs > 0).then(|| Duration::from_secs(self.pass_timeout_secs))
    }

    pub fn jitter(&self) -> JitterConfig {
        JitterConfig::new(self.jitter_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.trigger, TriggerMode::Interval);
        assert_eq!(config.interval(), Duration::from_secs(14_400));
        assert_eq!(config.default_timezone, "UTC");
        assert_eq!(config.shutdown_timeout_secs, 30);
        assert_eq!(config.pass_timeout(), Some(Duration::from_secs(300)));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_settings() {
        let settings = SchedulerSettings {
            trigger: TriggerMode::Cron,
            timezone: "Europe/London".to_string(),
            pass_timeout_secs: 0,
            jitter_secs: 15,
            ..Default::default()
        };
        let config = SchedulerConfig::from(&settings);
        assert_eq!(config.trigger, TriggerMode::Cron);
        assert_eq!(config.parse_timezone().unwrap().name(), "Europe/London");
        assert_eq!(config.pass_timeout(), None);
        assert!(config.jitter().is_enabled());
    }

    #[test]
    fn test_parse_invalid_timezone() {
        let config = SchedulerConfig {
            default_timezone: "Invalid/Zone".to_string(),
            ..Default::default()
        };
        match config.parse_timezone() {
            Err(SchedulerError::InvalidTimezone(tz)) => assert_eq!(tz, "Invalid/Zone"),
            _ => panic!("Expected InvalidTimezone error"),
        }
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = SchedulerConfig {
            max_concurrent_passes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SchedulerError::InvalidConfig(_))));

        let config = SchedulerConfig {
            interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = SchedulerConfig {
            trigger: TriggerMode::Manual,
            interval_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_serde_defaults() {
        let parsed: SchedulerConfig = serde_json::from_str(r#"{"trigger":"manual"}"#).unwrap();
        assert_eq!(parsed.trigger, TriggerMode::Manual);
        assert_eq!(parsed.max_concurrent_passes, 8);
        assert_eq!(parsed.cron, "0 0 */4 * * *");
    }
}
