//! Loop configuration.
//!
//! Every knob has a default; a TOML file may override any subset of them
//! and the CLI applies its flags on top.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::denylist::Denylist;
use crate::error::{RepairError, Result};

/// Minimum lint score (0-10) a candidate needs to pass the gate.
pub const DEFAULT_QUALITY_THRESHOLD: f64 = 7.0;

/// Default iteration budget per unit.
pub const DEFAULT_MAX_ITERATIONS: u32 = 10;

/// Configuration for one fixloop run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairConfig {
    /// Iteration budget per unit; a session aborts when it is spent.
    pub max_iterations: u32,

    /// Inclusive lint score threshold for a passing verdict.
    pub quality_threshold: f64,

    /// Candidate line count may not exceed `original * max_growth_ratio`.
    pub max_growth_ratio: f64,

    /// Timeout for one test run.
    pub test_timeout_secs: u64,

    /// Timeout for one lint run.
    pub lint_timeout_secs: u64,

    /// Timeout for one compiler syntax check of a candidate.
    pub syntax_timeout_secs: u64,

    /// Timeout for one proposer call.
    pub proposer_timeout_secs: u64,

    /// Failure messages in the failure report are cut to this many chars.
    pub max_failure_message_chars: usize,

    /// Size budget for analysis prompts; longer sources are trimmed.
    pub prompt_max_chars: usize,

    /// Number of units repaired concurrently.
    pub concurrency: usize,

    /// Dangerous primitives that must never be auto-applied.
    pub denylist: Denylist,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_iterations: DEFAULT_MAX_ITERATIONS,
            quality_threshold: DEFAULT_QUALITY_THRESHOLD,
            max_growth_ratio: 1.5,
            test_timeout_secs: 30,
            lint_timeout_secs: 30,
            syntax_timeout_secs: 10,
            proposer_timeout_secs: 120,
            max_failure_message_chars: 200,
            prompt_max_chars: 12_000,
            concurrency: 4,
            denylist: Denylist::default(),
        }
    }
}

impl RepairConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: RepairConfig = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject values the loop cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(RepairError::InvalidConfig(
                "max_iterations must be at least 1".to_string(),
            ));
        }
        if !(0.0..=10.0).contains(&self.quality_threshold) {
            return Err(RepairError::InvalidConfig(format!(
                "quality_threshold {} is outside [0, 10]",
                self.quality_threshold
            )));
        }
        if self.max_growth_ratio < 1.0 || !self.max_growth_ratio.is_finite() {
            return Err(RepairError::InvalidConfig(format!(
                "max_growth_ratio {} must be a finite value >= 1.0",
                self.max_growth_ratio
            )));
        }
        if self.test_timeout_secs == 0 || self.lint_timeout_secs == 0 || self.syntax_timeout_secs == 0 {
            return Err(RepairError::InvalidConfig(
                "tool timeouts must be non-zero".to_string(),
            ));
        }
        if self.proposer_timeout_secs == 0 {
            return Err(RepairError::InvalidConfig(
                "proposer_timeout_secs must be non-zero".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(RepairError::InvalidConfig(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn test_timeout(&self) -> Duration {
        Duration::from_secs(self.test_timeout_secs)
    }

    pub fn lint_timeout(&self) -> Duration {
        Duration::from_secs(self.lint_timeout_secs)
    }

    pub fn syntax_timeout(&self) -> Duration {
        Duration::from_secs(self.syntax_timeout_secs)
    }

    pub fn proposer_timeout(&self) -> Duration {
        Duration::from_secs(self.proposer_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = RepairConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_iterations, 10);
        assert_eq!(config.quality_threshold, 7.0);
        assert_eq!(config.max_growth_ratio, 1.5);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RepairConfig::from_toml_str("max_iterations = 3\nquality_threshold = 8.5\n")
            .expect("parse");
        assert_eq!(config.max_iterations, 3);
        assert_eq!(config.quality_threshold, 8.5);
        assert_eq!(config.test_timeout_secs, 30);
        assert_eq!(config.syntax_timeout_secs, 10);
        assert!(!config.denylist.calls.is_empty());
    }

    #[test]
    fn test_zero_iterations_rejected() {
        let err = RepairConfig::from_toml_str("max_iterations = 0").unwrap_err();
        assert!(matches!(err, RepairError::InvalidConfig(_)));
    }

    #[test]
    fn test_threshold_out_of_range_rejected() {
        let config = RepairConfig {
            quality_threshold: 11.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_syntax_timeout_rejected() {
        let err = RepairConfig::from_toml_str("syntax_timeout_secs = 0").unwrap_err();
        assert!(matches!(err, RepairError::InvalidConfig(_)));
    }

    #[test]
    fn test_shrinking_growth_ratio_rejected() {
        let config = RepairConfig {
            max_growth_ratio: 0.9,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_malformed_toml_is_config_parse_error() {
        let err = RepairConfig::from_toml_str("max_iterations = \"many\"").unwrap_err();
        assert!(matches!(err, RepairError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("fixloop.toml");
        std::fs::write(&path, "concurrency = 2\n[denylist]\ncalls = [\"eval\"]\nmodules = []\n")
            .expect("write");
        let config = RepairConfig::load(&path).expect("load");
        assert_eq!(config.concurrency, 2);
        assert_eq!(config.denylist.calls, vec!["eval".to_string()]);
        assert!(config.denylist.modules.is_empty());
    }
}
