//! Configuration management for drift analysis.
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! `DRIFT_`-prefixed environment variables (`__` separates sections, e.g.
//! `DRIFT_ANALYSIS__MIN_SAMPLES=20`).

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::{
    CorrelationMethod, DiscrepancyOptions, Granularity, ResolverOptions, ScalingMode,
    TieBreakPolicy, TrendOptions,
};
use crate::{Error, Result};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub analysis: AnalysisDefaults,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Defaults for analysis options when the caller does not override them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisDefaults {
    pub scaling: ScalingMode,
    pub correlation_method: CorrelationMethod,
    pub min_samples: usize,
    pub min_overlap_days: usize,
    pub pattern_threshold: f64,
    pub granularity: Granularity,
    pub tie_break: TieBreakPolicy,
    pub min_correlation: Option<f64>,
    pub include_unmatched: bool,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            scaling: ScalingMode::Raw,
            correlation_method: CorrelationMethod::Pearson,
            min_samples: 10,
            min_overlap_days: 5,
            pattern_threshold: 0.7,
            granularity: Granularity::Weekly,
            tie_break: TieBreakPolicy::Fifo,
            min_correlation: None,
            include_unmatched: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON log lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "drift=info,reconciler=info".to_string(),
            json: false,
        }
    }
}

impl Config {
    /// Load configuration from an optional TOML file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = config::Config::try_from(&Config::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            debug!(path = %path.display(), "Loading configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let settings = builder
            .add_source(
                config::Environment::with_prefix("DRIFT")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Config = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from environment variables only.
    pub fn from_env() -> Result<Self> {
        Self::load(None)
    }

    pub fn validate(&self) -> Result<()> {
        let threshold = self.analysis.pattern_threshold;
        if threshold <= 0.0 || threshold >= 1.0 {
            return Err(Error::Config {
                message: format!("analysis.pattern_threshold must be in (0, 1), got {}", threshold),
            });
        }
        if self.analysis.min_samples == 0 {
            return Err(Error::Config {
                message: "analysis.min_samples must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

impl AnalysisDefaults {
    pub fn discrepancy_options(&self) -> DiscrepancyOptions {
        DiscrepancyOptions {
            scaling: self.scaling,
            correlation_method: self.correlation_method,
            min_samples: self.min_samples,
            pattern_threshold: self.pattern_threshold,
            tie_break: self.tie_break,
            ..Default::default()
        }
    }

    pub fn resolver_options(&self) -> ResolverOptions {
        ResolverOptions {
            correlation_method: self.correlation_method,
            min_overlap_days: self.min_overlap_days,
            min_correlation: self.min_correlation,
            include_unmatched: self.include_unmatched,
            ..Default::default()
        }
    }

    pub fn trend_options(&self) -> TrendOptions {
        TrendOptions {
            scaling: self.scaling,
            granularity: self.granularity,
            correlation_method: self.correlation_method,
            min_samples: self.min_samples,
            tie_break: self.tie_break,
            ..Default::default()
        }
    }
}
