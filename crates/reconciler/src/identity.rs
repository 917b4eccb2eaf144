//! Strategy identity resolution.
//!
//! Live strategies are often renamed relative to the backtest. Names that
//! match case-insensitively pair up directly; the rest are compared by
//! their daily P&L series and scored on correlation and timing overlap.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use drift_core::types::{
    CorrelationResult, ExactMatch, ExecutedTrade, ReportingTrade, ResolverOptions,
    StrategyMatchReport, SuggestedMatch, Trade, UnmatchableEntry, UnmatchableReason,
    UnmatchedStrategies,
};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::{debug, info};

use crate::stats::{correlate, mean, std_dev};

/// Correlation below which two strategies move against each other.
pub const OPPOSITE_MOVEMENT_THRESHOLD: f64 = -0.2;

/// `|mean| / stddev` of the daily difference above which the offset is
/// treated as systematic.
pub const SYSTEMATIC_BIAS_RATIO: f64 = 2.0;

/// Overlap days at which a candidate stops being penalized.
pub const FULL_OVERLAP_DAYS: usize = 20;

/// One strategy's totals on one day.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DailyPl {
    pub total_pl: Decimal,
    pub total_contracts: u32,
}

impl DailyPl {
    /// Per-contract P&L on days with contracts, raw P&L otherwise.
    pub fn normalized(&self) -> f64 {
        let pl = if self.total_contracts > 0 {
            self.total_pl / Decimal::from(self.total_contracts)
        } else {
            self.total_pl
        };
        pl.to_f64().unwrap_or(0.0)
    }
}

/// Daily totals of one strategy, keyed by date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyPlSeries {
    pub strategy: String,
    pub days: BTreeMap<NaiveDate, DailyPl>,
}

impl DailyPlSeries {
    pub fn active_days(&self) -> usize {
        self.days.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NaiveDate, &DailyPl)> + '_ {
        self.days.iter().map(|(date, day)| (*date, day))
    }

    /// Normalized values of both series on the days they share, in date order.
    pub fn aligned(&self, other: &DailyPlSeries) -> (Vec<f64>, Vec<f64>) {
        self.days
            .iter()
            .filter_map(|(date, day)| {
                other
                    .days
                    .get(date)
                    .map(|o| (day.normalized(), o.normalized()))
            })
            .unzip()
    }
}

/// Accumulates trades into per-strategy daily series.
#[derive(Debug, Default)]
pub struct DailySeriesBuilder {
    strategies: BTreeMap<String, BTreeMap<NaiveDate, DailyPl>>,
}

impl DailySeriesBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add<T: ExecutedTrade>(&mut self, trade: &T) {
        let day = self
            .strategies
            .entry(trade.strategy().to_string())
            .or_default()
            .entry(trade.date_opened())
            .or_default();
        day.total_pl += trade.pl();
        day.total_contracts = day.total_contracts.saturating_add(trade.num_contracts());
    }

    pub fn finish(self) -> BTreeMap<String, DailyPlSeries> {
        self.strategies
            .into_iter()
            .map(|(strategy, days)| {
                let series = DailyPlSeries {
                    strategy: strategy.clone(),
                    days,
                };
                (strategy, series)
            })
            .collect()
    }
}

/// Chooses the accepted suggestions from all scored candidates.
pub trait AssignmentStrategy: Send + Sync {
    fn assign(&self, candidates: Vec<SuggestedMatch>) -> Vec<SuggestedMatch>;
}

/// Highest-confidence candidate per backtest strategy.
///
/// Not a global optimum: two backtest strategies may both pick the same
/// live strategy.
#[derive(Debug, Default, Clone, Copy)]
pub struct GreedyAssignment;

impl AssignmentStrategy for GreedyAssignment {
    fn assign(&self, candidates: Vec<SuggestedMatch>) -> Vec<SuggestedMatch> {
        let mut best: BTreeMap<String, SuggestedMatch> = BTreeMap::new();
        for candidate in candidates {
            match best.get(&candidate.backtest_strategy) {
                Some(current) if current.confidence >= candidate.confidence => {}
                _ => {
                    best.insert(candidate.backtest_strategy.clone(), candidate);
                }
            }
        }
        best.into_values().collect()
    }
}

/// Confidence score in [0, 100] for a correlated pair.
pub fn match_confidence(result: &CorrelationResult) -> f64 {
    let mut confidence = 70.0 * result.correlation.abs() + 30.0 * result.timing_overlap;
    if result.overlap_days < FULL_OVERLAP_DAYS {
        confidence *= result.overlap_days as f64 / FULL_OVERLAP_DAYS as f64;
    }
    confidence.clamp(0.0, 100.0)
}

enum PairVerdict {
    Candidate(f64),
    Unmatchable(UnmatchableReason),
}

pub struct StrategyIdentityResolver {
    options: ResolverOptions,
    assignment: Box<dyn AssignmentStrategy>,
}

impl StrategyIdentityResolver {
    pub fn new(options: ResolverOptions) -> Self {
        Self {
            options,
            assignment: Box::new(GreedyAssignment),
        }
    }

    pub fn with_assignment(mut self, assignment: Box<dyn AssignmentStrategy>) -> Self {
        self.assignment = assignment;
        self
    }

    pub fn resolve(&self, backtest: &[Trade], actual: &[ReportingTrade]) -> StrategyMatchReport {
        let backtest_names: BTreeSet<&str> = backtest.iter().map(|t| t.strategy.as_str()).collect();
        let actual_names: BTreeSet<&str> = actual.iter().map(|t| t.strategy.as_str()).collect();

        // Exact names first; each live name pairs at most once
        let mut exact_matches = Vec::new();
        let mut claimed: BTreeSet<&str> = BTreeSet::new();
        for bt in &backtest_names {
            let lowered = bt.to_lowercase();
            let found = actual_names
                .iter()
                .find(|a| !claimed.contains(*a) && a.to_lowercase() == lowered);
            if let Some(live) = found {
                claimed.insert(*live);
                exact_matches.push(ExactMatch {
                    strategy: bt.to_string(),
                    actual_strategy: live.to_string(),
                    confidence: 100.0,
                });
            }
        }

        let exact_backtest: BTreeSet<&str> =
            exact_matches.iter().map(|m| m.strategy.as_str()).collect();

        let mut backtest_builder = DailySeriesBuilder::new();
        for trade in backtest.iter().filter(|t| !exact_backtest.contains(t.strategy.as_str())) {
            backtest_builder.add(trade);
        }
        let mut actual_builder = DailySeriesBuilder::new();
        for trade in actual.iter().filter(|t| !claimed.contains(t.strategy.as_str())) {
            actual_builder.add(trade);
        }
        let backtest_series = backtest_builder.finish();
        let actual_series = actual_builder.finish();

        let mut correlation_matrix: BTreeMap<String, BTreeMap<String, CorrelationResult>> =
            BTreeMap::new();
        let mut candidates = Vec::new();
        let mut unmatchable = Vec::new();

        for (bt_name, bt) in &backtest_series {
            for (live_name, live) in &actual_series {
                let Some(result) = self.correlate_series(bt, live) else {
                    continue;
                };

                correlation_matrix
                    .entry(bt_name.clone())
                    .or_default()
                    .insert(live_name.clone(), result);

                match self.judge(bt, live, &result) {
                    PairVerdict::Unmatchable(reason) => {
                        debug!(
                            backtest = %bt_name,
                            actual = %live_name,
                            reason = reason.description(),
                            "Strategies cannot be the same"
                        );
                        unmatchable.push(UnmatchableEntry {
                            backtest_strategy: bt_name.clone(),
                            actual_strategy: live_name.clone(),
                            reason,
                            correlation: result,
                        });
                    }
                    PairVerdict::Candidate(confidence) => {
                        if let Some(min) = self.options.min_correlation {
                            if result.correlation < min {
                                debug!(
                                    backtest = %bt_name,
                                    actual = %live_name,
                                    correlation = result.correlation,
                                    "Below minimum correlation"
                                );
                                continue;
                            }
                        }
                        candidates.push(SuggestedMatch {
                            backtest_strategy: bt_name.clone(),
                            actual_strategy: live_name.clone(),
                            confidence,
                            correlation: result,
                        });
                    }
                }
            }
        }

        let mut suggested_matches = self.assignment.assign(candidates);
        suggested_matches.sort_by(|a, b| {
            b.confidence
                .total_cmp(&a.confidence)
                .then_with(|| a.backtest_strategy.cmp(&b.backtest_strategy))
        });

        let suggested_backtest: BTreeSet<&str> = suggested_matches
            .iter()
            .map(|s| s.backtest_strategy.as_str())
            .collect();
        unmatchable.retain(|u| !suggested_backtest.contains(u.backtest_strategy.as_str()));

        let unmatched = if self.options.include_unmatched {
            let suggested_actual: BTreeSet<&str> = suggested_matches
                .iter()
                .map(|s| s.actual_strategy.as_str())
                .collect();
            UnmatchedStrategies {
                backtest_only: backtest_series
                    .keys()
                    .filter(|name| !suggested_backtest.contains(name.as_str()))
                    .cloned()
                    .collect(),
                actual_only: actual_series
                    .keys()
                    .filter(|name| !suggested_actual.contains(name.as_str()))
                    .cloned()
                    .collect(),
            }
        } else {
            UnmatchedStrategies::default()
        };

        info!(
            exact = exact_matches.len(),
            suggested = suggested_matches.len(),
            unmatchable = unmatchable.len(),
            "Resolved strategy identities"
        );

        StrategyMatchReport {
            exact_matches,
            suggested_matches,
            unmatchable,
            unmatched,
            correlation_matrix,
        }
    }

    fn correlate_series(&self, bt: &DailyPlSeries, live: &DailyPlSeries) -> Option<CorrelationResult> {
        let (x, y) = bt.aligned(live);
        let overlap_days = x.len();
        if overlap_days < self.options.min_overlap_days {
            debug!(
                backtest = %bt.strategy,
                actual = %live.strategy,
                overlap_days,
                "Not enough shared trading days"
            );
            return None;
        }

        let Some(correlation) = correlate(self.options.correlation_method, &x, &y) else {
            debug!(
                backtest = %bt.strategy,
                actual = %live.strategy,
                "No correlation signal"
            );
            return None;
        };

        let smaller = bt.active_days().min(live.active_days());
        let timing_overlap = if smaller == 0 {
            0.0
        } else {
            overlap_days as f64 / smaller as f64
        };

        Some(CorrelationResult {
            correlation,
            overlap_days,
            timing_overlap,
        })
    }

    fn judge(&self, bt: &DailyPlSeries, live: &DailyPlSeries, result: &CorrelationResult) -> PairVerdict {
        if result.correlation < OPPOSITE_MOVEMENT_THRESHOLD {
            return PairVerdict::Unmatchable(UnmatchableReason::OppositeMovement);
        }

        let (x, y) = bt.aligned(live);
        let differences: Vec<f64> = x.iter().zip(&y).map(|(b, a)| a - b).collect();
        let spread = std_dev(&differences);
        let bias_ratio = if spread > 0.0 {
            mean(&differences).abs() / spread
        } else {
            0.0
        };
        if bias_ratio > SYSTEMATIC_BIAS_RATIO {
            return PairVerdict::Unmatchable(UnmatchableReason::SystematicBias);
        }

        PairVerdict::Candidate(match_confidence(result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveTime};
    use drift_core::types::CorrelationMethod;

    fn day(n: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
    }

    fn base_pl(n: i64) -> i64 {
        (n * 37) % 23 - 11
    }

    fn bt(days: impl Iterator<Item = i64>, strategy: &str) -> Vec<Trade> {
        days.map(|n| {
            Trade::new(
                day(n),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                strategy,
                Decimal::new(base_pl(n) * 100, 0),
                1,
            )
        })
        .collect()
    }

    fn live(
        days: impl Iterator<Item = i64>,
        strategy: &str,
        contracts: u32,
        pl: impl Fn(i64) -> i64,
    ) -> Vec<ReportingTrade> {
        days.map(|n| {
            ReportingTrade::new(
                day(n),
                NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
                strategy,
                Decimal::new(pl(n) * contracts as i64, 0),
                contracts,
            )
        })
        .collect()
    }

    fn resolver() -> StrategyIdentityResolver {
        StrategyIdentityResolver::new(ResolverOptions::default())
    }

    #[test]
    fn test_daily_series_per_contract() {
        let mut builder = DailySeriesBuilder::new();
        for trade in live(0..3, "IC", 4, |n| 10 * (n + 1)) {
            builder.add(&trade);
        }
        let series = builder.finish();
        let ic = &series["IC"];

        assert_eq!(ic.active_days(), 3);
        let values: Vec<f64> = ic.iter().map(|(_, d)| d.normalized()).collect();
        assert_eq!(values, vec![10.0, 20.0, 30.0]);

        let (_, first) = ic.iter().next().unwrap();
        assert_eq!(first.total_pl, Decimal::new(40, 0));
        assert_eq!(first.total_contracts, 4);
    }

    #[test]
    fn test_daily_totals_accumulate_within_a_day() {
        let mut builder = DailySeriesBuilder::new();
        let trade = |n: i64, hour: u32, pl: i64, contracts: u32| {
            Trade::new(
                day(n),
                NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
                "IC",
                Decimal::new(pl, 0),
                contracts,
            )
        };
        builder.add(&trade(0, 10, 30, 2));
        builder.add(&trade(0, 14, -6, 1));
        builder.add(&trade(1, 10, 15, 0));

        let ic = &builder.finish()["IC"];
        assert_eq!(
            ic.days[&day(0)],
            DailyPl {
                total_pl: Decimal::new(24, 0),
                total_contracts: 3,
            }
        );
        assert!((ic.days[&day(0)].normalized() - 8.0).abs() < 1e-9);
        assert!((ic.days[&day(1)].normalized() - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_case_insensitive() {
        let backtest = bt(0..30, "IronCondor");
        let actual = live(0..30, "ironcondor", 1, |n| base_pl(n) * 100);

        let report = resolver().resolve(&backtest, &actual);

        assert_eq!(report.exact_matches.len(), 1);
        assert_eq!(report.exact_matches[0].strategy, "IronCondor");
        assert_eq!(report.exact_matches[0].actual_strategy, "ironcondor");
        assert_eq!(report.exact_matches[0].confidence, 100.0);
        assert!(report.correlation_matrix.is_empty());
        assert!(report.suggested_matches.is_empty());
        assert!(report.unmatched.backtest_only.is_empty());
        assert!(report.unmatched.actual_only.is_empty());
    }

    #[test]
    fn test_only_sufficient_overlap_is_scored() {
        let backtest = bt(0..30, "Alpha");
        let mut actual = live(0..30, "LiveX", 2, |n| base_pl(n) * 100);
        actual.extend(live(0..3, "LiveY", 1, |n| base_pl(n) * 100));

        let report = resolver().resolve(&backtest, &actual);

        let row = &report.correlation_matrix["Alpha"];
        assert_eq!(row.len(), 1);
        assert!(row.contains_key("LiveX"));

        assert_eq!(report.suggested_matches.len(), 1);
        let suggestion = &report.suggested_matches[0];
        assert_eq!(suggestion.actual_strategy, "LiveX");
        assert!(suggestion.correlation.correlation > 0.8);
        assert!((suggestion.confidence - 100.0).abs() < 1e-9);

        assert!(report.unmatched.backtest_only.is_empty());
        assert_eq!(report.unmatched.actual_only, vec!["LiveY".to_string()]);
    }

    #[test]
    fn test_flat_daily_series_has_no_signal() {
        let backtest = bt(0..30, "Alpha");
        let mut actual = live(0..30, "LiveX", 1, |n| base_pl(n) * 100);
        actual.extend(live(0..30, "LiveFlat", 2, |_| 25));

        let report = resolver().resolve(&backtest, &actual);

        let row = &report.correlation_matrix["Alpha"];
        assert!(!row.contains_key("LiveFlat"));
        assert!(row.contains_key("LiveX"));

        assert!(report
            .suggested_matches
            .iter()
            .all(|m| m.actual_strategy != "LiveFlat"));
        assert!(report
            .unmatchable
            .iter()
            .all(|u| u.actual_strategy != "LiveFlat"));
        assert_eq!(report.unmatched.actual_only, vec!["LiveFlat".to_string()]);
    }

    #[test]
    fn test_short_overlap_penalized() {
        let backtest = bt(0..10, "Beta");
        let actual = live(0..10, "B2", 1, |n| base_pl(n) * 100);

        let report = resolver().resolve(&backtest, &actual);
        assert_eq!(report.suggested_matches.len(), 1);
        assert!((report.suggested_matches[0].confidence - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_partial_timing_overlap() {
        let backtest = bt(0..20, "Gamma");
        let actual = live(10..30, "G2", 1, |n| base_pl(n) * 100);

        let report = resolver().resolve(&backtest, &actual);
        let suggestion = &report.suggested_matches[0];

        assert_eq!(suggestion.correlation.overlap_days, 10);
        assert!((suggestion.correlation.timing_overlap - 0.5).abs() < 1e-9);
        // (70 + 15) * 10 / 20
        assert!((suggestion.confidence - 42.5).abs() < 1e-9);
    }

    #[test]
    fn test_opposite_movement_unmatchable() {
        let backtest = bt(0..30, "Alpha");
        let actual = live(0..30, "Contra", 1, |n| -base_pl(n) * 100);

        let report = resolver().resolve(&backtest, &actual);

        assert!(report.suggested_matches.is_empty());
        assert_eq!(report.unmatchable.len(), 1);
        assert_eq!(report.unmatchable[0].reason, UnmatchableReason::OppositeMovement);
        assert_eq!(report.unmatched.backtest_only, vec!["Alpha".to_string()]);
    }

    #[test]
    fn test_systematic_offset_unmatchable() {
        let backtest = bt(0..30, "Alpha");
        let actual = live(0..30, "Offset", 1, |n| base_pl(n) * 100 + 500 + n % 2);

        let report = resolver().resolve(&backtest, &actual);

        assert!(report.suggested_matches.is_empty());
        assert_eq!(report.unmatchable.len(), 1);
        assert_eq!(report.unmatchable[0].reason, UnmatchableReason::SystematicBias);
        assert!(report.unmatchable[0].correlation.correlation > 0.9);
    }

    #[test]
    fn test_suggested_and_unmatchable_disjoint() {
        let backtest = bt(0..30, "Alpha");
        let mut actual = live(0..30, "LiveX", 1, |n| base_pl(n) * 100);
        actual.extend(live(0..30, "Contra", 1, |n| -base_pl(n) * 100));

        let report = resolver().resolve(&backtest, &actual);

        assert_eq!(report.suggested_matches.len(), 1);
        assert!(report.unmatchable.is_empty());
        // Both pairs were still correlated
        assert_eq!(report.correlation_matrix["Alpha"].len(), 2);
    }

    #[test]
    fn test_min_correlation_filters_candidates() {
        let options = ResolverOptions {
            min_correlation: Some(0.99),
            ..Default::default()
        };
        let backtest = bt(0..30, "Alpha");
        // Noisy copy
        let actual = live(0..30, "Noisy", 1, |n| base_pl(n) * 100 + if n % 3 == 0 { 400 } else { -200 });

        let report = StrategyIdentityResolver::new(options).resolve(&backtest, &actual);

        let r = report.correlation_matrix["Alpha"]["Noisy"].correlation;
        assert!(r < 0.99);
        assert!(report.suggested_matches.is_empty());
    }

    #[test]
    fn test_unmatched_lists_optional() {
        let options = ResolverOptions {
            include_unmatched: false,
            ..Default::default()
        };
        let backtest = bt(0..30, "Alpha");
        let actual = live(40..50, "Elsewhere", 1, base_pl);

        let report = StrategyIdentityResolver::new(options).resolve(&backtest, &actual);
        assert!(report.unmatched.backtest_only.is_empty());
        assert!(report.unmatched.actual_only.is_empty());

        let report = resolver().resolve(&backtest, &actual);
        assert_eq!(report.unmatched.backtest_only, vec!["Alpha".to_string()]);
        assert_eq!(report.unmatched.actual_only, vec!["Elsewhere".to_string()]);
    }

    #[test]
    fn test_greedy_keeps_best_per_backtest() {
        let result = CorrelationResult {
            correlation: 0.9,
            overlap_days: 25,
            timing_overlap: 1.0,
        };
        let candidate = |bt: &str, live: &str, confidence: f64| SuggestedMatch {
            backtest_strategy: bt.to_string(),
            actual_strategy: live.to_string(),
            confidence,
            correlation: result,
        };

        let assigned = GreedyAssignment.assign(vec![
            candidate("A", "X", 60.0),
            candidate("A", "Y", 80.0),
            candidate("B", "X", 70.0),
        ]);

        assert_eq!(assigned.len(), 2);
        assert!(assigned.iter().any(|s| s.backtest_strategy == "A" && s.actual_strategy == "Y"));
        assert!(assigned.iter().any(|s| s.backtest_strategy == "B" && s.actual_strategy == "X"));
    }

    #[test]
    fn test_confidence_bounds() {
        for (correlation, overlap_days, timing_overlap) in
            [(1.0, 40, 1.0), (-1.0, 5, 0.2), (0.0, 0, 0.0), (0.5, 19, 0.9)]
        {
            let confidence = match_confidence(&CorrelationResult {
                correlation,
                overlap_days,
                timing_overlap,
            });
            assert!((0.0..=100.0).contains(&confidence));
        }
    }

    #[test]
    fn test_kendall_method() {
        let options = ResolverOptions {
            correlation_method: CorrelationMethod::Kendall,
            ..Default::default()
        };
        let backtest = bt(0..25, "Alpha");
        let actual = live(0..25, "LiveX", 3, |n| base_pl(n) * 100);

        let report = StrategyIdentityResolver::new(options).resolve(&backtest, &actual);
        let suggestion = &report.suggested_matches[0];
        assert!((suggestion.correlation.correlation - 1.0).abs() < 1e-9);
    }
}
