//! Analysis options shared by the reconciliation operations.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::types::fields::ContextField;
use crate::{Error, Result};

/// How backtest and live P&L are brought onto a comparable basis.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ScalingMode {
    /// Compare P&L as logged.
    #[default]
    Raw,
    /// Divide each side by its own contract count.
    PerContract,
    /// Rescale the backtest to the live contract count.
    ToReported,
}

impl FromStr for ScalingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "raw" => Ok(ScalingMode::Raw),
            "percontract" => Ok(ScalingMode::PerContract),
            "toreported" => Ok(ScalingMode::ToReported),
            other => Err(Error::InvalidOption {
                message: format!("unknown scaling mode '{}'", other),
            }),
        }
    }
}

/// Correlation estimator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    #[default]
    Pearson,
    Spearman,
    Kendall,
}

impl CorrelationMethod {
    pub fn name(&self) -> &'static str {
        match self {
            CorrelationMethod::Pearson => "pearson",
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Kendall => "kendall",
        }
    }
}

impl FromStr for CorrelationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "pearson" => Ok(CorrelationMethod::Pearson),
            "spearman" => Ok(CorrelationMethod::Spearman),
            "kendall" => Ok(CorrelationMethod::Kendall),
            other => Err(Error::InvalidOption {
                message: format!("unknown correlation method '{}'", other),
            }),
        }
    }
}

/// Calendar bucket size for slippage time series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    Daily,
    #[default]
    Weekly,
    Monthly,
}

impl FromStr for Granularity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "daily" | "day" => Ok(Granularity::Daily),
            "weekly" | "week" => Ok(Granularity::Weekly),
            "monthly" | "month" => Ok(Granularity::Monthly),
            other => Err(Error::InvalidOption {
                message: format!("unknown granularity '{}'", other),
            }),
        }
    }
}

/// How a backtest trade picks among live trades sharing its match key.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TieBreakPolicy {
    /// First live trade in log order.
    #[default]
    Fifo,
    /// Live trade with the nearest contract count, log order on ties.
    ClosestContracts,
}

impl FromStr for TieBreakPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "fifo" => Ok(TieBreakPolicy::Fifo),
            "closest_contracts" => Ok(TieBreakPolicy::ClosestContracts),
            other => Err(Error::InvalidOption {
                message: format!("unknown tie-break policy '{}'", other),
            }),
        }
    }
}

/// Inclusive date window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |from| date >= from) && self.to.map_or(true, |to| date <= to)
    }
}

/// Strategy and date restrictions applied to both logs before analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradeFilter {
    /// Strategy names to keep (case-insensitive). Empty keeps all.
    #[serde(default)]
    pub strategies: Vec<String>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

/// Sample-size based reliability label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLevel {
    Low,
    Moderate,
    High,
}

impl ConfidenceLevel {
    /// `<10` low, `<30` moderate, otherwise high.
    pub fn from_sample_size(n: usize) -> Self {
        if n < 10 {
            ConfidenceLevel::Low
        } else if n < 30 {
            ConfidenceLevel::Moderate
        } else {
            ConfidenceLevel::High
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ConfidenceLevel::Low => "low",
            ConfidenceLevel::Moderate => "moderate",
            ConfidenceLevel::High => "high",
        }
    }
}

fn check_threshold(pattern_threshold: f64) -> Result<()> {
    if pattern_threshold <= 0.0 || pattern_threshold >= 1.0 || pattern_threshold.is_nan() {
        return Err(Error::InvalidOption {
            message: format!(
                "pattern_threshold must be in (0, 1), got {}",
                pattern_threshold
            ),
        });
    }
    Ok(())
}

/// Options for the discrepancy report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscrepancyOptions {
    pub scaling: ScalingMode,
    pub correlation_method: CorrelationMethod,
    pub min_samples: usize,
    pub pattern_threshold: f64,
    pub tie_break: TieBreakPolicy,
    /// Context fields correlated against slippage.
    pub context_fields: Vec<ContextField>,
    /// Live strategy name -> backtest strategy name.
    pub strategy_aliases: BTreeMap<String, String>,
    pub filter: TradeFilter,
}

impl Default for DiscrepancyOptions {
    fn default() -> Self {
        Self {
            scaling: ScalingMode::Raw,
            correlation_method: CorrelationMethod::Pearson,
            min_samples: 10,
            pattern_threshold: 0.7,
            tie_break: TieBreakPolicy::Fifo,
            context_fields: ContextField::standard_fields(),
            strategy_aliases: BTreeMap::new(),
            filter: TradeFilter::default(),
        }
    }
}

impl DiscrepancyOptions {
    pub fn validate(&self) -> Result<()> {
        check_threshold(self.pattern_threshold)
    }
}

/// Options for strategy identity resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolverOptions {
    pub correlation_method: CorrelationMethod,
    pub min_overlap_days: usize,
    pub min_correlation: Option<f64>,
    pub include_unmatched: bool,
    pub filter: TradeFilter,
}

impl Default for ResolverOptions {
    fn default() -> Self {
        Self {
            correlation_method: CorrelationMethod::Pearson,
            min_overlap_days: 5,
            min_correlation: None,
            include_unmatched: true,
            filter: TradeFilter::default(),
        }
    }
}

impl ResolverOptions {
    pub fn validate(&self) -> Result<()> {
        if let Some(min) = self.min_correlation {
            if !(-1.0..=1.0).contains(&min) {
                return Err(Error::InvalidOption {
                    message: format!("min_correlation must be in [-1, 1], got {}", min),
                });
            }
        }
        Ok(())
    }
}

/// Options for the slippage trend report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrendOptions {
    pub scaling: ScalingMode,
    pub granularity: Granularity,
    pub correlation_method: CorrelationMethod,
    /// Minimum number of periods before a scope gets a regression.
    pub min_samples: usize,
    pub tie_break: TieBreakPolicy,
    pub include_time_series: bool,
    pub include_external_factors: bool,
    pub context_fields: Vec<ContextField>,
    pub strategy_aliases: BTreeMap<String, String>,
    pub filter: TradeFilter,
}

impl Default for TrendOptions {
    fn default() -> Self {
        Self {
            scaling: ScalingMode::Raw,
            granularity: Granularity::Weekly,
            correlation_method: CorrelationMethod::Pearson,
            min_samples: 10,
            tie_break: TieBreakPolicy::Fifo,
            include_time_series: false,
            include_external_factors: false,
            context_fields: ContextField::standard_fields(),
            strategy_aliases: BTreeMap::new(),
            filter: TradeFilter::default(),
        }
    }
}

impl TrendOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_samples == 0 {
            return Err(Error::InvalidOption {
                message: "min_samples must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}
