//! Systematic bias detection over matched slippage.
//!
//! Three detectors run over the same matched set:
//! - direction bias (live consistently better or worse than the backtest)
//! - time-of-day clustering of IQR outliers
//! - correlation of slippage with market context fields

use std::cmp::Ordering;

use chrono::Timelike;
use drift_core::types::{
    ConfidenceLevel, ContextField, CorrelationMethod, DiscrepancyOptions, FactorCorrelation,
    MatchedPair, PatternInsight, PatternKind, SlippageDirection, TimeBucket,
};
use tracing::debug;

use crate::stats::{correlate, iqr_fences};

/// Minimum absolute correlation for an external factor insight.
pub const FACTOR_CORRELATION_THRESHOLD: f64 = 0.3;

/// Fewest resolved pairs a factor correlation is computed from.
pub const MIN_FACTOR_SAMPLES: usize = 3;

/// Fewest outliers (overall and per bucket) for a time-of-day cluster.
pub const MIN_OUTLIERS: usize = 3;

/// Pattern detection configuration
#[derive(Debug, Clone)]
pub struct PatternConfig {
    /// Share of trades (or outliers) needed to call a pattern
    pub pattern_threshold: f64,
    /// Matched trades needed before any pattern is reported
    pub min_samples: usize,
    pub correlation_method: CorrelationMethod,
    pub context_fields: Vec<ContextField>,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            pattern_threshold: 0.7,
            min_samples: 10,
            correlation_method: CorrelationMethod::Pearson,
            context_fields: ContextField::standard_fields(),
        }
    }
}

impl From<&DiscrepancyOptions> for PatternConfig {
    fn from(options: &DiscrepancyOptions) -> Self {
        Self {
            pattern_threshold: options.pattern_threshold,
            min_samples: options.min_samples,
            correlation_method: options.correlation_method,
            context_fields: options.context_fields.clone(),
        }
    }
}

pub struct PatternDetector {
    config: PatternConfig,
}

impl PatternDetector {
    pub fn new(config: PatternConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PatternConfig {
        &self.config
    }

    /// Run all detectors. Empty when fewer than `min_samples` pairs matched.
    pub fn detect(&self, pairs: &[MatchedPair]) -> Vec<PatternInsight> {
        if pairs.len() < self.config.min_samples {
            debug!(
                matched = pairs.len(),
                min_samples = self.config.min_samples,
                "Too few matched trades for pattern detection"
            );
            return Vec::new();
        }

        let mut insights = Vec::new();
        insights.extend(self.direction_bias(pairs));
        insights.extend(self.time_of_day_cluster(pairs));
        insights.extend(self.external_factors(pairs));
        insights
    }

    fn direction_bias(&self, pairs: &[MatchedPair]) -> Option<PatternInsight> {
        let n = pairs.len();
        let positive = pairs.iter().filter(|p| p.slippage() > 0.0).count();
        let negative = pairs.iter().filter(|p| p.slippage() < 0.0).count();

        let positive_rate = positive as f64 / n as f64;
        let negative_rate = negative as f64 / n as f64;

        debug!(positive_rate, negative_rate, "Direction rates");

        let (direction, rate) = match positive.cmp(&negative) {
            Ordering::Greater => (SlippageDirection::Positive, positive_rate),
            Ordering::Less => (SlippageDirection::Negative, negative_rate),
            // Neither side dominates
            Ordering::Equal => return None,
        };

        if rate < self.config.pattern_threshold {
            return None;
        }

        let description = match direction {
            SlippageDirection::Positive => format!(
                "Live results beat the backtest on {:.0}% of matched trades",
                rate * 100.0
            ),
            SlippageDirection::Negative => format!(
                "Live results trail the backtest on {:.0}% of matched trades",
                rate * 100.0
            ),
        };

        Some(PatternInsight {
            kind: PatternKind::DirectionBias { direction, rate },
            description,
            sample_size: n,
            confidence: ConfidenceLevel::from_sample_size(n),
        })
    }

    fn time_of_day_cluster(&self, pairs: &[MatchedPair]) -> Option<PatternInsight> {
        let slippages: Vec<f64> = pairs.iter().map(MatchedPair::slippage).collect();
        let (lower, upper) = iqr_fences(&slippages)?;

        let outliers: Vec<&MatchedPair> = pairs
            .iter()
            .zip(&slippages)
            .filter(|(_, s)| **s < lower || **s > upper)
            .map(|(p, _)| p)
            .collect();

        if outliers.len() < MIN_OUTLIERS {
            return None;
        }

        let total = outliers.len();
        let mut counts = [0usize; 3];
        for pair in &outliers {
            if let Some(bucket) = TimeBucket::from_hour(pair.time_opened.hour()) {
                counts[bucket_index(bucket)] += 1;
            }
        }

        TimeBucket::ALL.iter().find_map(|&bucket| {
            let count = counts[bucket_index(bucket)];
            let share = count as f64 / total as f64;
            if share < self.config.pattern_threshold || count < MIN_OUTLIERS {
                return None;
            }

            debug!(%bucket, count, share, "Outliers cluster by time of day");

            Some(PatternInsight {
                kind: PatternKind::TimeOfDayCluster {
                    bucket,
                    outlier_share: share,
                    outlier_count: count,
                },
                description: format!(
                    "{:.0}% of slippage outliers ({} of {}) occur in the {} session",
                    share * 100.0,
                    count,
                    total,
                    bucket
                ),
                sample_size: total,
                confidence: ConfidenceLevel::from_sample_size(total),
            })
        })
    }

    fn external_factors(&self, pairs: &[MatchedPair]) -> Vec<PatternInsight> {
        self.factor_correlations(pairs)
            .into_iter()
            .filter_map(|factor| {
                let r = factor.correlation?;
                if r.abs() < FACTOR_CORRELATION_THRESHOLD {
                    return None;
                }

                let direction = if r > 0.0 {
                    SlippageDirection::Positive
                } else {
                    SlippageDirection::Negative
                };
                let description = format!(
                    "Slippage {} as {} rises ({} r = {:.2})",
                    if r > 0.0 { "improves" } else { "worsens" },
                    factor.field.label(),
                    factor.method.name(),
                    r
                );

                Some(PatternInsight {
                    kind: PatternKind::ExternalFactor {
                        field: factor.field,
                        correlation: r,
                        direction,
                    },
                    description,
                    sample_size: factor.sample_size,
                    confidence: ConfidenceLevel::from_sample_size(factor.sample_size),
                })
            })
            .collect()
    }

    /// Correlation of slippage with every configured context field.
    ///
    /// Fields resolving on fewer than three pairs, or with no variance,
    /// report `correlation: None`.
    pub fn factor_correlations(&self, pairs: &[MatchedPair]) -> Vec<FactorCorrelation> {
        self.config
            .context_fields
            .iter()
            .map(|field| {
                let (values, slippages): (Vec<f64>, Vec<f64>) = pairs
                    .iter()
                    .filter_map(|p| field.resolve(p).map(|v| (v, p.slippage())))
                    .unzip();

                let sample_size = values.len();
                let correlation = if sample_size < MIN_FACTOR_SAMPLES {
                    None
                } else {
                    correlate(self.config.correlation_method, &values, &slippages)
                };

                debug!(field = %field, sample_size, ?correlation, "Factor correlation");

                FactorCorrelation {
                    field: field.clone(),
                    method: self.config.correlation_method,
                    correlation,
                    sample_size,
                }
            })
            .collect()
    }
}

fn bucket_index(bucket: TimeBucket) -> usize {
    match bucket {
        TimeBucket::Morning => 0,
        TimeBucket::Midday => 1,
        TimeBucket::Afternoon => 2,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};
    use drift_core::types::StandardField;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;

    fn pair(slippage: i64, hour: u32) -> MatchedPair {
        MatchedPair {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            strategy: "IC".to_string(),
            time_opened: NaiveTime::from_hms_opt(hour, 30, 0).unwrap(),
            backtest_pl: Decimal::ZERO,
            actual_pl: Decimal::new(slippage, 0),
            total_slippage: Decimal::new(slippage, 0),
            backtest_contracts: 1,
            actual_contracts: 1,
            opening_vix: None,
            gap: None,
            movement: None,
            custom_fields: BTreeMap::new(),
        }
    }

    fn detector() -> PatternDetector {
        PatternDetector::new(PatternConfig::default())
    }

    fn direction_insights(insights: &[PatternInsight]) -> Vec<&PatternInsight> {
        insights
            .iter()
            .filter(|i| matches!(i.kind, PatternKind::DirectionBias { .. }))
            .collect()
    }

    #[test]
    fn test_alternating_slippage_has_no_bias() {
        let pairs: Vec<MatchedPair> = (0..40)
            .map(|i| pair(if i % 2 == 0 { 10 } else { -10 }, 10))
            .collect();

        let insights = detector().detect(&pairs);
        assert!(direction_insights(&insights).is_empty());
        assert!(detector().direction_bias(&pairs).is_none());
    }

    #[test]
    fn test_tied_rates_report_no_direction_under_low_threshold() {
        let detector = PatternDetector::new(PatternConfig {
            pattern_threshold: 0.4,
            ..Default::default()
        });
        let mut pairs: Vec<MatchedPair> = (0..20)
            .map(|i| pair(if i % 2 == 0 { 8 } else { -8 }, 10))
            .collect();
        pairs.extend((0..4).map(|_| pair(0, 10)));

        assert!(detector.direction_bias(&pairs).is_none());
        assert!(direction_insights(&detector.detect(&pairs)).is_empty());
    }

    #[test]
    fn test_negative_bias_detected() {
        let mut pairs: Vec<MatchedPair> = (0..16).map(|_| pair(-12, 10)).collect();
        pairs.extend((0..4).map(|_| pair(5, 10)));

        let insights = detector().detect(&pairs);
        let bias = direction_insights(&insights);

        assert_eq!(bias.len(), 1);
        match &bias[0].kind {
            PatternKind::DirectionBias { direction, rate } => {
                assert_eq!(*direction, SlippageDirection::Negative);
                assert!((rate - 0.8).abs() < 1e-9);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
        assert_eq!(bias[0].confidence, ConfidenceLevel::Moderate);
    }

    #[test]
    fn test_below_min_samples_reports_nothing() {
        let pairs: Vec<MatchedPair> = (0..9).map(|_| pair(-12, 10)).collect();
        assert!(detector().detect(&pairs).is_empty());
    }

    #[test]
    fn test_zero_slippage_counts_toward_neither_side() {
        let mut pairs: Vec<MatchedPair> = (0..7).map(|_| pair(-3, 10)).collect();
        pairs.extend((0..3).map(|_| pair(0, 10)));

        let insight = detector().direction_bias(&pairs).unwrap();
        match insight.kind {
            PatternKind::DirectionBias { direction, rate } => {
                assert_eq!(direction, SlippageDirection::Negative);
                assert!((rate - 0.7).abs() < 1e-9);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn test_outliers_cluster_in_afternoon() {
        // Tight core around zero, four large losses late in the day
        let mut pairs: Vec<MatchedPair> = (0..20)
            .map(|i| pair(if i % 2 == 0 { 1 } else { -1 }, 10))
            .collect();
        pairs.extend((0..4).map(|_| pair(-200, 15)));

        let insight = detector().time_of_day_cluster(&pairs).unwrap();
        match insight.kind {
            PatternKind::TimeOfDayCluster {
                bucket,
                outlier_share,
                outlier_count,
            } => {
                assert_eq!(bucket, TimeBucket::Afternoon);
                assert_eq!(outlier_count, 4);
                assert!((outlier_share - 1.0).abs() < 1e-9);
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn test_too_few_outliers_no_cluster() {
        let mut pairs: Vec<MatchedPair> = (0..20)
            .map(|i| pair(if i % 2 == 0 { 1 } else { -1 }, 10))
            .collect();
        pairs.extend((0..2).map(|_| pair(-200, 15)));

        assert!(detector().time_of_day_cluster(&pairs).is_none());
    }

    #[test]
    fn test_outliers_spread_across_sessions_no_cluster() {
        let mut pairs: Vec<MatchedPair> = (0..20)
            .map(|i| pair(if i % 2 == 0 { 1 } else { -1 }, 12))
            .collect();
        for hour in [9, 9, 12, 12, 15, 15] {
            pairs.push(pair(-200, hour));
        }

        assert!(detector().time_of_day_cluster(&pairs).is_none());
    }

    #[test]
    fn test_vix_correlation_insight() {
        // Higher VIX, worse fills
        let pairs: Vec<MatchedPair> = (0..12)
            .map(|i| {
                let mut p = pair(-(i as i64) * 5 + if i % 3 == 0 { 2 } else { 0 }, 10);
                p.opening_vix = Some(14.0 + i as f64);
                p
            })
            .collect();

        let correlations = detector().factor_correlations(&pairs);
        let vix = correlations
            .iter()
            .find(|c| c.field == ContextField::Standard(StandardField::OpeningVix))
            .unwrap();
        assert_eq!(vix.sample_size, 12);
        assert!(vix.correlation.unwrap() < -0.9);

        // Gap and movement never resolve
        assert!(correlations
            .iter()
            .filter(|c| c.field != ContextField::Standard(StandardField::OpeningVix))
            .all(|c| c.correlation.is_none() && c.sample_size == 0));

        let insights = detector().external_factors(&pairs);
        assert_eq!(insights.len(), 1);
        match &insights[0].kind {
            PatternKind::ExternalFactor { direction, .. } => {
                assert_eq!(*direction, SlippageDirection::Negative)
            }
            other => panic!("unexpected pattern {:?}", other),
        }
    }

    #[test]
    fn test_factor_needs_three_points() {
        let pairs: Vec<MatchedPair> = (0..2)
            .map(|i| {
                let mut p = pair(i, 10);
                p.gap = Some(i as f64);
                p
            })
            .collect();

        let correlations = detector().factor_correlations(&pairs);
        assert!(correlations.iter().all(|c| c.correlation.is_none()));
    }

    #[test]
    fn test_kendall_method_is_recorded() {
        let config = PatternConfig {
            correlation_method: CorrelationMethod::Kendall,
            context_fields: vec![ContextField::Custom("fill_delay".to_string())],
            ..Default::default()
        };
        let pairs: Vec<MatchedPair> = (0..10)
            .map(|i| {
                let mut p = pair(-(i as i64), 10);
                p.custom_fields.insert("fill_delay".to_string(), i as f64);
                p
            })
            .collect();

        let correlations = PatternDetector::new(config).factor_correlations(&pairs);
        assert_eq!(correlations.len(), 1);
        assert_eq!(correlations[0].method, CorrelationMethod::Kendall);
        assert!((correlations[0].correlation.unwrap() + 1.0).abs() < 1e-9);
    }
}
