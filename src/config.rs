//! Engine configuration
//!
//! Tunables for the performance window, the auto-tuner and the A/B test
//! manager. Values come from (in increasing precedence) built-in defaults,
//! an optional TOML file, and `AFFINITY__SECTION__KEY` environment variables.
//!
//! # Configuration File Format
//!
//! ```toml
//! [performance]
//! window_days = 7
//!
//! [tuning]
//! min_feedback = 10
//! issue_share_threshold = 0.3
//! weight_step = 0.1
//! weight_cap = 0.6
//! report_lookback_days = 30
//!
//! [ab_testing]
//! default_traffic_split = 0.5
//! default_min_sample_size = 100
//! significance_level = 0.05
//! significance_method = "heuristic"
//! ```

use crate::error::{AffinityError, Result};
use crate::optimization::significance::SignificanceMethod;
use crate::utils::MAX_WINDOW_DAYS;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AFFINITY";

/// Complete engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub performance: PerformanceSettings,

    #[serde(default)]
    pub tuning: TuningSettings,

    #[serde(default)]
    pub ab_testing: ABTestingSettings,
}

/// Performance evaluation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceSettings {
    /// Trailing window (days) used for the performance score
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

/// Auto-tuner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TuningSettings {
    /// Feedback records required in the window before auto-tuning runs
    #[serde(default = "default_min_feedback")]
    pub min_feedback: usize,

    /// Share of records the dominant negative tag must reach
    #[serde(default = "default_issue_share")]
    pub issue_share_threshold: f64,

    /// Amount added to the targeted dimension
    #[serde(default = "default_weight_step")]
    pub weight_step: f64,

    /// Upper bound for the targeted dimension before normalization
    #[serde(default = "default_weight_cap")]
    pub weight_cap: f64,

    /// How far back the optimization report lists adjustments
    #[serde(default = "default_report_lookback")]
    pub report_lookback_days: i64,
}

impl Default for TuningSettings {
    fn default() -> Self {
        Self {
            min_feedback: default_min_feedback(),
            issue_share_threshold: default_issue_share(),
            weight_step: default_weight_step(),
            weight_cap: default_weight_cap(),
            report_lookback_days: default_report_lookback(),
        }
    }
}

/// A/B testing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ABTestingSettings {
    #[serde(default = "default_traffic_split")]
    pub default_traffic_split: f64,

    #[serde(default = "default_min_sample_size")]
    pub default_min_sample_size: usize,

    /// p-value below which a difference counts as significant
    #[serde(default = "default_significance_level")]
    pub significance_level: f64,

    #[serde(default)]
    pub significance_method: SignificanceMethod,
}

impl Default for ABTestingSettings {
    fn default() -> Self {
        Self {
            default_traffic_split: default_traffic_split(),
            default_min_sample_size: default_min_sample_size(),
            significance_level: default_significance_level(),
            significance_method: SignificanceMethod::default(),
        }
    }
}

// Default value helpers
fn default_window_days() -> i64 {
    7
}

fn default_min_feedback() -> usize {
    10
}

fn default_issue_share() -> f64 {
    0.3
}

fn default_weight_step() -> f64 {
    0.1
}

fn default_weight_cap() -> f64 {
    0.6
}

fn default_report_lookback() -> i64 {
    30
}

fn default_traffic_split() -> f64 {
    0.5
}

fn default_min_sample_size() -> usize {
    100
}

fn default_significance_level() -> f64 {
    0.05
}

impl EngineConfig {
    /// Load configuration from an optional TOML file plus `AFFINITY__*`
    /// environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    pub(crate) fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if path.exists() {
                tracing::info!("Loading configuration from {:?}", path);
            } else {
                tracing::info!("Config file not found, using defaults: {:?}", path);
            }
            builder = builder.add_source(config::File::from(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(env_prefix)
                .prefix_separator("__")
                .separator("__"),
        );

        let config: EngineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the tuner or the A/B manager misbehave
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_WINDOW_DAYS).contains(&self.performance.window_days) {
            return Err(AffinityError::validation(format!(
                "performance.window_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        if !(1..=MAX_WINDOW_DAYS).contains(&self.tuning.report_lookback_days) {
            return Err(AffinityError::validation(format!(
                "tuning.report_lookback_days must be between 1 and {}",
                MAX_WINDOW_DAYS
            )));
        }
        if !(0.0..=1.0).contains(&self.tuning.issue_share_threshold) {
            return Err(AffinityError::validation(
                "tuning.issue_share_threshold must be between 0 and 1",
            ));
        }
        if self.tuning.weight_step <= 0.0 || self.tuning.weight_step > 1.0 {
            return Err(AffinityError::validation(
                "tuning.weight_step must be in (0, 1]",
            ));
        }
        if self.tuning.weight_cap <= 0.0 || self.tuning.weight_cap > 1.0 {
            return Err(AffinityError::validation(
                "tuning.weight_cap must be in (0, 1]",
            ));
        }
        let split = self.ab_testing.default_traffic_split;
        if split <= 0.0 || split >= 1.0 {
            return Err(AffinityError::validation(
                "ab_testing.default_traffic_split must be in (0, 1)",
            ));
        }
        if self.ab_testing.default_min_sample_size == 0 {
            return Err(AffinityError::validation(
                "ab_testing.default_min_sample_size must be at least 1",
            ));
        }
        let alpha = self.ab_testing.significance_level;
        if alpha <= 0.0 || alpha >= 1.0 {
            return Err(AffinityError::validation(
                "ab_testing.significance_level must be in (0, 1)",
            ));
        }
        Ok(())
    }

    /// Get default config path
    pub fn default_path() -> PathBuf {
        PathBuf::from("affinity.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();

        assert_eq!(config.performance.window_days, 7);
        assert_eq!(config.tuning.min_feedback, 10);
        assert_eq!(config.tuning.issue_share_threshold, 0.3);
        assert_eq!(config.tuning.weight_step, 0.1);
        assert_eq!(config.tuning.weight_cap, 0.6);
        assert_eq!(config.ab_testing.default_traffic_split, 0.5);
        assert_eq!(config.ab_testing.default_min_sample_size, 100);
        assert_eq!(config.ab_testing.significance_level, 0.05);
        assert_eq!(
            config.ab_testing.significance_method,
            SignificanceMethod::Heuristic
        );
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("affinity.toml");
        std::fs::write(
            &config_path,
            r#"
[tuning]
min_feedback = 20

[ab_testing]
default_min_sample_size = 30
significance_method = "welch"
"#,
        )
        .unwrap();

        let config =
            EngineConfig::load_with_env_prefix(Some(&config_path), "AFFINITY_TEST_FILE").unwrap();

        assert_eq!(config.tuning.min_feedback, 20);
        assert_eq!(config.tuning.weight_cap, 0.6);
        assert_eq!(config.ab_testing.default_min_sample_size, 30);
        assert_eq!(
            config.ab_testing.significance_method,
            SignificanceMethod::Welch
        );
    }

    #[test]
    fn test_load_nonexistent_returns_default() {
        let config = EngineConfig::load_with_env_prefix(
            Some(Path::new("/nonexistent/affinity.toml")),
            "AFFINITY_TEST_MISSING",
        )
        .unwrap();
        assert_eq!(config.performance.window_days, 7);
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("AFFINITY_TEST_ENV__PERFORMANCE__WINDOW_DAYS", "14");
        let config = EngineConfig::load_with_env_prefix(None, "AFFINITY_TEST_ENV").unwrap();
        std::env::remove_var("AFFINITY_TEST_ENV__PERFORMANCE__WINDOW_DAYS");

        assert_eq!(config.performance.window_days, 14);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.ab_testing.default_traffic_split = 1.0;
        assert!(config.validate().unwrap_err().is_validation());

        let mut config = EngineConfig::default();
        config.tuning.weight_cap = 0.0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.performance.window_days = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.performance.window_days = 1_000_000_000;
        assert!(config.validate().unwrap_err().is_validation());

        let mut config = EngineConfig::default();
        config.tuning.report_lookback_days = MAX_WINDOW_DAYS + 1;
        assert!(config.validate().unwrap_err().is_validation());
    }
}
