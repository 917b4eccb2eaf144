//! Reconciliation operations over a backtest log and a live reporting log.
//!
//! Every operation applies the pre-filter to both logs (live strategy names
//! after alias resolution), then reports
//! `Analysis::Unavailable` when the live log is missing and
//! `Analysis::NoTrades` when either side is empty. Operations that depend on
//! matched pairs fail with `Error::NoMatchedTrades` when nothing matches.

use std::collections::BTreeMap;

use drift_core::types::{
    Analysis, DiscrepancyOptions, DiscrepancyReport, DiscrepancySummary, Granularity, MatchedPair,
    ReportingTrade, ResolverOptions, ScalingMode, StrategyMatchReport, StrategySlippage,
    StrategyTrend, TieBreakPolicy, Trade, TradeFilter, TrendOptions, TrendReport, UnmatchedCounts,
};
use drift_core::{Error, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::filter;
use crate::identity::StrategyIdentityResolver;
use crate::matcher::{MatchOutcome, TradeMatcher};
use crate::patterns::{PatternConfig, PatternDetector};
use crate::periods::aggregate_periods;
use crate::stats;
use crate::trend::TrendRegressor;

const MISSING_REPORTING_LOG: &str = "no reporting log supplied";

/// Why an operation stopped before analysis.
enum Skip {
    Unavailable,
    NoTrades { backtest: usize, actual: usize },
}

impl Skip {
    fn into_analysis<T>(self) -> Analysis<T> {
        match self {
            Skip::Unavailable => Analysis::Unavailable {
                reason: MISSING_REPORTING_LOG.to_string(),
            },
            Skip::NoTrades { backtest, actual } => Analysis::NoTrades { backtest, actual },
        }
    }
}

fn prepare(
    backtest: &[Trade],
    actual: Option<&[ReportingTrade]>,
    trade_filter: &TradeFilter,
    aliases: &BTreeMap<String, String>,
) -> std::result::Result<(Vec<Trade>, Vec<ReportingTrade>), Skip> {
    let Some(actual) = actual else {
        warn!("Reporting log missing; analysis unavailable");
        return Err(Skip::Unavailable);
    };

    let backtest = filter::apply(trade_filter, backtest);
    let actual = filter::apply_aliased(trade_filter, actual, aliases);

    if backtest.is_empty() || actual.is_empty() {
        warn!(
            backtest = backtest.len(),
            actual = actual.len(),
            "No trades to analyze after filtering"
        );
        return Err(Skip::NoTrades {
            backtest: backtest.len(),
            actual: actual.len(),
        });
    }

    Ok((backtest, actual))
}

fn match_or_fail(
    backtest: &[Trade],
    actual: &[ReportingTrade],
    scaling: ScalingMode,
    tie_break: TieBreakPolicy,
    aliases: &BTreeMap<String, String>,
) -> Result<MatchOutcome> {
    let outcome = TradeMatcher::new(scaling)
        .with_policy(tie_break)
        .with_aliases(aliases.clone())
        .match_trades(backtest, actual);

    if outcome.matched_trades.is_empty() {
        return Err(Error::NoMatchedTrades {
            backtest: backtest.len(),
            actual: actual.len(),
        });
    }

    Ok(outcome)
}

fn to_f64(value: Decimal) -> f64 {
    value.to_f64().unwrap_or(0.0)
}

/// Group pairs by strategy, preserving order within each group.
fn by_strategy(pairs: &[MatchedPair]) -> BTreeMap<&str, Vec<&MatchedPair>> {
    let mut groups: BTreeMap<&str, Vec<&MatchedPair>> = BTreeMap::new();
    for pair in pairs {
        groups.entry(pair.strategy.as_str()).or_default().push(pair);
    }
    groups
}

fn summarize(pairs: &[MatchedPair], scaling: ScalingMode) -> DiscrepancySummary {
    let slippages: Vec<f64> = pairs.iter().map(MatchedPair::slippage).collect();
    let total_slippage: Decimal = pairs.iter().map(|p| p.total_slippage).sum();

    DiscrepancySummary {
        scaling,
        matched_trades: pairs.len(),
        total_slippage,
        avg_slippage: stats::mean(&slippages),
        median_slippage: stats::median(&slippages),
        std_dev: stats::std_dev(&slippages),
        positive_count: slippages.iter().filter(|s| **s > 0.0).count(),
        negative_count: slippages.iter().filter(|s| **s < 0.0).count(),
    }
}

fn strategy_breakdown(pairs: &[MatchedPair]) -> Vec<StrategySlippage> {
    let mut breakdown: Vec<StrategySlippage> = by_strategy(pairs)
        .into_iter()
        .map(|(strategy, group)| {
            let total: Decimal = group.iter().map(|p| p.total_slippage).sum();
            let magnitude: f64 = group.iter().map(|p| p.slippage().abs()).sum();
            let n = group.len() as f64;
            StrategySlippage {
                strategy: strategy.to_string(),
                matched_trades: group.len(),
                total_slippage: total,
                avg_slippage: to_f64(total) / n,
                avg_magnitude: magnitude / n,
            }
        })
        .collect();

    breakdown.sort_by(|a, b| b.total_slippage.abs().cmp(&a.total_slippage.abs()));
    breakdown
}

/// Per-trade slippage statistics, systematic patterns and context
/// correlations.
pub fn compute_discrepancies(
    backtest: &[Trade],
    actual: Option<&[ReportingTrade]>,
    options: &DiscrepancyOptions,
) -> Result<Analysis<DiscrepancyReport>> {
    options.validate()?;

    let (backtest, actual) =
        match prepare(backtest, actual, &options.filter, &options.strategy_aliases) {
            Ok(inputs) => inputs,
            Err(skip) => return Ok(skip.into_analysis()),
        };

    let outcome = match_or_fail(
        &backtest,
        &actual,
        options.scaling,
        options.tie_break,
        &options.strategy_aliases,
    )?;
    let pairs = &outcome.matched_trades;

    let detector = PatternDetector::new(PatternConfig::from(options));
    let patterns = detector.detect(pairs);
    let correlations = detector.factor_correlations(pairs);

    let report = DiscrepancyReport {
        summary: summarize(pairs, options.scaling),
        patterns,
        correlations,
        per_strategy: strategy_breakdown(pairs),
        unmatched: UnmatchedCounts {
            backtest: outcome.unmatched_backtest_count,
            actual: outcome.unmatched_actual_count,
        },
    };

    info!(
        matched = report.summary.matched_trades,
        total_slippage = %report.summary.total_slippage,
        patterns = report.patterns.len(),
        "Computed discrepancies"
    );

    Ok(Analysis::Ready(report))
}

/// Suggest live strategies corresponding to each backtest strategy.
pub fn suggest_strategy_matches(
    backtest: &[Trade],
    actual: Option<&[ReportingTrade]>,
    options: &ResolverOptions,
) -> Result<Analysis<StrategyMatchReport>> {
    options.validate()?;

    let (backtest, actual) =
        match prepare(backtest, actual, &options.filter, &BTreeMap::new()) {
            Ok(inputs) => inputs,
            Err(skip) => return Ok(skip.into_analysis()),
        };

    let report = StrategyIdentityResolver::new(options.clone()).resolve(&backtest, &actual);
    Ok(Analysis::Ready(report))
}

fn strategy_trends(
    pairs: &[MatchedPair],
    granularity: Granularity,
    min_samples: usize,
) -> Vec<StrategyTrend> {
    let mut trends: Vec<StrategyTrend> = by_strategy(pairs)
        .into_iter()
        .map(|(strategy, group)| {
            let periods = aggregate_periods(group.iter().copied(), granularity);
            let trend = if periods.len() >= min_samples {
                TrendRegressor::fit(&periods)
            } else {
                None
            };
            StrategyTrend {
                strategy: strategy.to_string(),
                matched_trades: group.len(),
                periods: periods.len(),
                total_slippage: group.iter().map(|p| p.slippage()).sum(),
                trend,
            }
        })
        .collect();

    trends.sort_by(|a, b| b.total_slippage.abs().total_cmp(&a.total_slippage.abs()));
    trends
}

/// Whether slippage is improving, stable or degrading over time.
pub fn analyze_slippage_trends(
    backtest: &[Trade],
    actual: Option<&[ReportingTrade]>,
    options: &TrendOptions,
) -> Result<Analysis<TrendReport>> {
    options.validate()?;

    let (backtest, actual) =
        match prepare(backtest, actual, &options.filter, &options.strategy_aliases) {
            Ok(inputs) => inputs,
            Err(skip) => return Ok(skip.into_analysis()),
        };

    let outcome = match_or_fail(
        &backtest,
        &actual,
        options.scaling,
        options.tie_break,
        &options.strategy_aliases,
    )?;
    let pairs = &outcome.matched_trades;

    let periods = aggregate_periods(pairs, options.granularity);
    let trend = if periods.len() >= options.min_samples {
        TrendRegressor::fit(&periods)
    } else {
        None
    };

    let external_factors = options.include_external_factors.then(|| {
        PatternDetector::new(PatternConfig {
            min_samples: options.min_samples,
            correlation_method: options.correlation_method,
            context_fields: options.context_fields.clone(),
            ..Default::default()
        })
        .factor_correlations(pairs)
    });

    let report = TrendReport {
        granularity: options.granularity,
        matched_trades: pairs.len(),
        trend,
        per_strategy: strategy_trends(pairs, options.granularity, options.min_samples),
        time_series: options.include_time_series.then(|| periods.clone()),
        external_factors,
    };

    info!(
        matched = report.matched_trades,
        periods = periods.len(),
        interpretation = report.trend.as_ref().map(|t| t.interpretation.name()),
        "Analyzed slippage trends"
    );

    Ok(Analysis::Ready(report))
}
