//! Configuration loading for rankopt.
//!
//! Layered config: defaults -> config file -> env vars -> CLI flags.
//! The default config file lives at `~/.config/rankopt/config.toml`.

use config::{Config, Environment, File};
use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::RankoptError;

/// How scheduling cycles are triggered.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TriggerMode {
    /// Fixed interval between cycles (default)
    #[default]
    Interval,
    /// Cron expression evaluated in `timezone`
    Cron,
    /// No timer; the embedder calls `trigger_now`
    Manual,
}

/// Decision policy knobs. Defaults reproduce the 5-attempt cap and the
/// 24h cooldown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicySettings {
    /// Optimizations allowed per entity before the policy stops proposing more
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Minimum hours between two optimizations of the same entity
    #[serde(default = "default_cooldown_hours")]
    pub cooldown_hours: u32,
}

fn default_max_attempts() -> u32 {
    5
}

fn default_cooldown_hours() -> u32 {
    24
}

impl Default for PolicySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            cooldown_hours: default_cooldown_hours(),
        }
    }
}

impl PolicySettings {
    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.max_attempts == 0 {
            return Err("max_attempts must be > 0".to_string());
        }
        Ok(())
    }
}

/// Scheduler trigger and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerSettings {
    #[serde(default)]
    pub trigger: TriggerMode,

    /// Seconds between cycles in interval mode (default: 4 hours)
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,

    /// 6-field cron expression used in cron mode
    #[serde(default = "default_cron")]
    pub cron: String,

    /// IANA timezone for cron mode
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Run one cycle immediately after start
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,

    /// Maximum passes executing at once within one cycle
    #[serde(default = "default_max_concurrent_passes")]
    pub max_concurrent_passes: usize,

    /// Max random delay before each pass, in seconds (0 = none)
    #[serde(default)]
    pub jitter_secs: u64,

    /// Time budget, in seconds, for a pass's rank lookup and metadata
    /// generation (0 = unbounded). Apply and commit are never cut off.
    #[serde(default = "default_pass_timeout_secs")]
    pub pass_timeout_secs: u64,

    /// Grace period for in-flight passes on shutdown
    #[serde(default = "default_shutdown_timeout_secs")]
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

fn default_shutdown_timeout_secs() -> u64 {
    30
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            trigger: TriggerMode::default(),
            interval_secs: default_interval_secs(),
            cron: default_cron(),
            timezone: default_timezone(),
            run_on_start: default_run_on_start(),
            max_concurrent_passes: default_max_concurrent_passes(),
            jitter_secs: 0,
            pass_timeout_secs: default_pass_timeout_secs(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

/// Main application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Path to RocksDB storage directory
    #[serde(default = "default_db_path")]
    pub db_path: String,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// How many search results the rank oracle inspects
    #[serde(default = "default_search_top_k")]
    pub search_top_k: u32,

    #[serde(default)]
    pub scheduler: SchedulerSettings,

    #[serde(default)]
    pub policy: PolicySettings,
}

fn default_db_path() -> String {
    ProjectDirs::from("", "", "rankopt")
        .map(|p| p.data_local_dir().join("db"))
        .unwrap_or_else(|| PathBuf::from("./data"))
        .to_string_lossy()
        .to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_search_top_k() -> u32 {
    50
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            log_level: default_log_level(),
            search_top_k: default_search_top_k(),
            scheduler: SchedulerSettings::default(),
            policy: PolicySettings::default(),
        }
    }
}

impl Settings {
    /// Load settings with layered precedence:
    /// 1. Built-in defaults
    /// 2. Config file (~/.config/rankopt/config.toml)
    /// 3. CLI-specified config file (optional)
    /// 4. Environment variables (RANKOPT_*, nested keys split on `__`)
    ///
    /// CLI flags should be applied by the caller after this returns.
    pub fn load(cli_config_path: Option<&str>) -> Result<Self, RankoptError> {
        let config_dir = ProjectDirs::from("", "", "rankopt")
            .map(|p| p.config_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let default_config_path = config_dir.join("config");

        let mut builder = Config::builder()
            .set_default("db_path", default_db_path())
            .map_err(|e| RankoptError::Config(e.to_string()))?
            .set_default("log_level", default_log_level())
            .map_err(|e| RankoptError::Config(e.to_string()))?
            .set_default("search_top_k", default_search_top_k() as i64)
            .map_err(|e| RankoptError::Config(e.to_string()))?
            .add_source(File::with_name(&default_config_path.to_string_lossy()).required(false));

        if let Some(path) = cli_config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        // RANKOPT_DB_PATH, RANKOPT_POLICY__MAX_ATTEMPTS, RANKOPT_SCHEDULER__TRIGGER, ...
        builder = builder.add_source(
            Environment::with_prefix("RANKOPT")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| RankoptError::Config(e.to_string()))?;

        let settings: Settings = config
            .try_deserialize()
            .map_err(|e| RankoptError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the scheduler cannot run with.
    pub fn validate(&self) -> Result<(), RankoptError> {
        self.policy.validate().map_err(RankoptError::Config)?;
        if self.search_top_k == 0 {
            return Err(RankoptError::Config("search_top_k must be > 0".to_string()));
        }
        if self.scheduler.trigger == TriggerMode::Interval && self.scheduler.interval_secs == 0 {
            return Err(RankoptError::Config(
                "scheduler.interval_secs must be > 0 in interval mode".to_string(),
            ));
        }
        if self.scheduler.max_concurrent_passes == 0 {
            return Err(RankoptError::Config(
                "scheduler.max_concurrent_passes must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Expand ~ in db_path to actual home directory
    pub fn expanded_db_path(&self) -> PathBuf {
        if let Some(rest) = self.db_path.strip_prefix("~/") {
            if let Some(dirs) = BaseDirs::new() {
                return dirs.home_dir().join(rest);
            }
        }
        PathBuf::from(&self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.search_top_k, 50);
        assert_eq!(settings.policy.max_attempts, 5);
        assert_eq!(settings.policy.cooldown_hours, 24);
        assert_eq!(settings.scheduler.trigger, TriggerMode::Interval);
        assert_eq!(settings.scheduler.interval_secs, 4 * 60 * 60);
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_load_with_defaults() {
        let settings = Settings::load(None).unwrap();
        assert_eq!(settings.search_top_k, 50);
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let mut settings = Settings::default();
        settings.policy.max_attempts = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.search_top_k = 0;
        assert!(settings.validate().is_err());

        let mut settings = Settings::default();
        settings.scheduler.interval_secs = 0;
        assert!(settings.validate().is_err());

        settings.scheduler.trigger = TriggerMode::Manual;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_expanded_db_path_without_tilde() {
        let settings = Settings {
            db_path: "/var/lib/rankopt".to_string(),
            ..Default::default()
        };
        assert_eq!(settings.expanded_db_path(), PathBuf::from("/var/lib/rankopt"));
    }

    #[test]
    fn test_partial_scheduler_section_uses_defaults() {
        let parsed: SchedulerSettings = serde_json::from_str(r#"{"trigger":"cron"}"#).unwrap();
        assert_eq!(parsed.trigger, TriggerMode::Cron);
        assert_eq!(parsed.cron, "0 0 */4 * * *");
        assert_eq!(parsed.max_concurrent_passes, 8);
    }
}
