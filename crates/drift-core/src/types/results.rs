//! Result types produced by the reconciliation operations.

use std::collections::BTreeMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::fields::ContextField;
use crate::types::options::{ConfidenceLevel, CorrelationMethod, Granularity, ScalingMode};

/// Outcome of an operation that ran to completion.
///
/// `Unavailable` and `NoTrades` are expected conditions rather than failures,
/// so callers can skip the analysis gracefully.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Analysis<T> {
    Ready(T),
    /// The live reporting log was not supplied.
    Unavailable { reason: String },
    /// One side had no trades after filtering.
    NoTrades { backtest: usize, actual: usize },
}

impl<T> Analysis<T> {
    pub fn is_ready(&self) -> bool {
        matches!(self, Analysis::Ready(_))
    }

    pub fn ready(self) -> Option<T> {
        match self {
            Analysis::Ready(report) => Some(report),
            _ => None,
        }
    }
}

// ===================== Periods and trends =====================

/// Slippage reduced over one calendar period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeriodSlippage {
    /// `YYYY-MM-DD`, `YYYY-Www` or `YYYY-MM`.
    pub period: String,
    pub total_slippage: f64,
    pub avg_slippage: f64,
    pub trade_count: usize,
    /// Mean absolute slippage.
    pub avg_magnitude: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendInterpretation {
    /// Slippage shrinking over time.
    Improving,
    /// No significant slope.
    Stable,
    /// Slippage growing over time.
    Degrading,
}

impl TrendInterpretation {
    pub fn name(&self) -> &'static str {
        match self {
            TrendInterpretation::Improving => "improving",
            TrendInterpretation::Stable => "stable",
            TrendInterpretation::Degrading => "degrading",
        }
    }
}

/// OLS fit of average slippage over period index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendResult {
    pub slope: f64,
    pub intercept: f64,
    pub r_squared: f64,
    /// Two-tailed, from a normal approximation to the t statistic.
    pub p_value: f64,
    pub stderr: f64,
    pub interpretation: TrendInterpretation,
    pub confidence: ConfidenceLevel,
    pub sample_size: usize,
}

impl TrendResult {
    pub fn is_significant(&self) -> bool {
        self.p_value < 0.05
    }
}

/// Trend for a single strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyTrend {
    pub strategy: String,
    pub matched_trades: usize,
    pub periods: usize,
    pub total_slippage: f64,
    /// `None` when the strategy had fewer periods than `min_samples`.
    pub trend: Option<TrendResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub granularity: Granularity,
    pub matched_trades: usize,
    /// Portfolio scope; `None` below `min_samples` periods.
    pub trend: Option<TrendResult>,
    /// Sorted by absolute total slippage, largest first.
    pub per_strategy: Vec<StrategyTrend>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_series: Option<Vec<PeriodSlippage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_factors: Option<Vec<FactorCorrelation>>,
}

impl TrendReport {
    pub fn summary_text(&self) -> String {
        let portfolio = match &self.trend {
            Some(trend) => format!(
                "{} (slope {:+.2}/period, p={:.3}, R²={:.2}, {} confidence)",
                trend.interpretation.name(),
                trend.slope,
                trend.p_value,
                trend.r_squared,
                trend.confidence.name()
            ),
            None => "insufficient periods".to_string(),
        };
        let degrading = self
            .per_strategy
            .iter()
            .filter(|s| {
                s.trend
                    .as_ref()
                    .map(|t| t.interpretation == TrendInterpretation::Degrading)
                    .unwrap_or(false)
            })
            .count();

        format!(
            "Slippage Trend\n\
             ==============\n\
             Matched Trades: {}\n\
             Portfolio: {}\n\
             Strategies: {} ({} degrading)",
            self.matched_trades,
            portfolio,
            self.per_strategy.len(),
            degrading
        )
    }
}

// ===================== Patterns and discrepancies =====================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlippageDirection {
    /// Live results better than the backtest.
    Positive,
    /// Live results worse than the backtest.
    Negative,
}

/// Session buckets used for outlier clustering (exchange local time).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeBucket {
    /// 09:00-10:59
    Morning,
    /// 11:00-13:59
    Midday,
    /// 14:00-15:59
    Afternoon,
}

impl TimeBucket {
    pub const ALL: [TimeBucket; 3] = [TimeBucket::Morning, TimeBucket::Midday, TimeBucket::Afternoon];

    pub fn from_hour(hour: u32) -> Option<Self> {
        match hour {
            9..=10 => Some(TimeBucket::Morning),
            11..=13 => Some(TimeBucket::Midday),
            14..=15 => Some(TimeBucket::Afternoon),
            _ => None,
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TimeBucket::Morning => write!(f, "morning"),
            TimeBucket::Midday => write!(f, "midday"),
            TimeBucket::Afternoon => write!(f, "afternoon"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PatternKind {
    DirectionBias {
        direction: SlippageDirection,
        rate: f64,
    },
    TimeOfDayCluster {
        bucket: TimeBucket,
        outlier_share: f64,
        outlier_count: usize,
    },
    ExternalFactor {
        field: ContextField,
        correlation: f64,
        /// Positive when slippage rises with the field.
        direction: SlippageDirection,
    },
}

/// A systematic bias found in matched slippage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternInsight {
    pub kind: PatternKind,
    pub description: String,
    pub sample_size: usize,
    pub confidence: ConfidenceLevel,
}

/// Correlation between slippage and one context field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactorCorrelation {
    pub field: ContextField,
    pub method: CorrelationMethod,
    /// `None` when there was not enough signal to estimate.
    pub correlation: Option<f64>,
    pub sample_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancySummary {
    pub scaling: ScalingMode,
    pub matched_trades: usize,
    pub total_slippage: Decimal,
    pub avg_slippage: f64,
    pub median_slippage: f64,
    pub std_dev: f64,
    pub positive_count: usize,
    pub negative_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySlippage {
    pub strategy: String,
    pub matched_trades: usize,
    pub total_slippage: Decimal,
    pub avg_slippage: f64,
    pub avg_magnitude: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedCounts {
    pub backtest: usize,
    pub actual: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscrepancyReport {
    pub summary: DiscrepancySummary,
    pub patterns: Vec<PatternInsight>,
    pub correlations: Vec<FactorCorrelation>,
    /// Sorted by absolute total slippage, largest first.
    pub per_strategy: Vec<StrategySlippage>,
    pub unmatched: UnmatchedCounts,
}

impl DiscrepancyReport {
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Slippage Discrepancies\n\
             ======================\n\
             Matched Trades: {} (unmatched: {} backtest, {} actual)\n\
             Total Slippage: ${:.2}\n\
             Avg Slippage: ${:.2} (median ${:.2}, std ${:.2})\n\
             Positive/Negative: {}/{}",
            self.summary.matched_trades,
            self.unmatched.backtest,
            self.unmatched.actual,
            self.summary.total_slippage,
            self.summary.avg_slippage,
            self.summary.median_slippage,
            self.summary.std_dev,
            self.summary.positive_count,
            self.summary.negative_count
        );

        if self.patterns.is_empty() {
            text.push_str("\nPatterns: none detected");
        } else {
            for pattern in &self.patterns {
                text.push_str(&format!(
                    "\n- {} [{} confidence]",
                    pattern.description,
                    pattern.confidence.name()
                ));
            }
        }

        text
    }
}

// ===================== Strategy identity =====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CorrelationResult {
    pub correlation: f64,
    pub overlap_days: usize,
    /// Shared days over the smaller of the two active-day counts.
    pub timing_overlap: f64,
}

/// Case-insensitive name match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExactMatch {
    /// Backtest strategy name.
    pub strategy: String,
    pub actual_strategy: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuggestedMatch {
    pub backtest_strategy: String,
    pub actual_strategy: String,
    /// 0-100.
    pub confidence: f64,
    pub correlation: CorrelationResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnmatchableReason {
    /// Daily P&L moves in opposite directions.
    OppositeMovement,
    /// Daily P&L differs by a consistent offset.
    SystematicBias,
}

impl UnmatchableReason {
    pub fn description(&self) -> &'static str {
        match self {
            UnmatchableReason::OppositeMovement => "opposite movement",
            UnmatchableReason::SystematicBias => "systematic bias",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchableEntry {
    pub backtest_strategy: String,
    pub actual_strategy: String,
    pub reason: UnmatchableReason,
    pub correlation: CorrelationResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedStrategies {
    pub backtest_only: Vec<String>,
    pub actual_only: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyMatchReport {
    pub exact_matches: Vec<ExactMatch>,
    /// Sorted by confidence, highest first.
    pub suggested_matches: Vec<SuggestedMatch>,
    pub unmatchable: Vec<UnmatchableEntry>,
    pub unmatched: UnmatchedStrategies,
    /// backtest strategy -> actual strategy -> correlation, for pairs with
    /// enough overlapping days. Exact matches are not included.
    pub correlation_matrix: BTreeMap<String, BTreeMap<String, CorrelationResult>>,
}

impl StrategyMatchReport {
    pub fn summary_text(&self) -> String {
        let mut text = format!(
            "Strategy Matching\n\
             =================\n\
             Exact: {}\n\
             Suggested: {}\n\
             Unmatchable: {}\n\
             Unmatched: {} backtest, {} actual",
            self.exact_matches.len(),
            self.suggested_matches.len(),
            self.unmatchable.len(),
            self.unmatched.backtest_only.len(),
            self.unmatched.actual_only.len()
        );

        for suggestion in &self.suggested_matches {
            text.push_str(&format!(
                "\n- {} -> {} ({:.0}% confidence, r={:.2}, {} days)",
                suggestion.backtest_strategy,
                suggestion.actual_strategy,
                suggestion.confidence,
                suggestion.correlation.correlation,
                suggestion.correlation.overlap_days
            ));
        }

        text
    }
}
