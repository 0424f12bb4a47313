//! Runtime configuration, loaded from YAML or JSON.
//!
//! ```yaml
//! scheduler:
//!   rps: 4
//!   jitter: 0.2
//! backfill:
//!   pageSize: 200
//! overtime:
//!   otThresholdHours: 10
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use fieldwright_eval::OvertimeConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid JSON config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported config format for {0} (expected .yaml, .yml or .json)")]
    UnsupportedFormat(PathBuf),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SchedulerConfig {
    /// Dispatch ceiling in requests per second.
    pub rps: f64,
    /// Relative jitter applied to spacing and backoff (0.2 = ±20%).
    pub jitter: f64,
    /// Total attempts per task, the first included.
    pub max_attempts: u32,
    pub max_backoff_ms: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            rps: 4.0,
            jitter: 0.2,
            max_attempts: 5,
            max_backoff_ms: 30_000,
        }
    }
}

impl SchedulerConfig {
    pub fn base_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.rps).unwrap_or(Duration::ZERO)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BackfillConfig {
    pub page_size: u32,
    pub max_range_days: u32,
    /// Attempts per report page. Each one already includes the scheduler's
    /// own retries.
    pub page_retries: u32,
    /// Attempts per record patch, counted the same way.
    pub patch_retries: u32,
    pub retry_delay_ms: u64,
    /// How far before a record's start to look for the preceding record.
    pub lookback_hours: u32,
}

impl Default for BackfillConfig {
    fn default() -> Self {
        Self {
            page_size: 200,
            max_range_days: 366,
            page_retries: 3,
            patch_retries: 3,
            retry_delay_ms: 1000,
            lookback_hours: 24,
        }
    }
}

impl BackfillConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RuntimeConfig {
    pub scheduler: SchedulerConfig,
    pub backfill: BackfillConfig,
    pub overtime: OvertimeConfig,
}

impl RuntimeConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Format is chosen by extension.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let parse: fn(&str) -> Result<Self, ConfigError> = match ext.as_deref() {
            Some("yaml" | "yml") => Self::from_yaml_str,
            Some("json") => Self::from_json_str,
            _ => return Err(ConfigError::UnsupportedFormat(path.to_path_buf())),
        };
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        parse(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if !(s.rps.is_finite() && s.rps > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.rps must be positive, got {}",
                s.rps
            )));
        }
        if !(0.0..1.0).contains(&s.jitter) {
            return Err(ConfigError::Invalid(format!(
                "scheduler.jitter must be in [0, 1), got {}",
                s.jitter
            )));
        }
        if s.max_attempts == 0 {
            return Err(ConfigError::Invalid(
                "scheduler.maxAttempts must be at least 1".into(),
            ));
        }
        if self.backfill.page_size == 0 {
            return Err(ConfigError::Invalid(
                "backfill.pageSize must be at least 1".into(),
            ));
        }
        if self.backfill.page_retries == 0 || self.backfill.patch_retries == 0 {
            return Err(ConfigError::Invalid(
                "backfill.pageRetries and backfill.patchRetries must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
