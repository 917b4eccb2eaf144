//! Calendar-period aggregation of matched slippage.

use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use drift_core::types::{Granularity, MatchedPair, PeriodSlippage};

/// Period key for a date: `YYYY-MM-DD`, ISO week `YYYY-Www`, or `YYYY-MM`.
pub fn period_key(date: NaiveDate, granularity: Granularity) -> String {
    match granularity {
        Granularity::Daily => date.format("%Y-%m-%d").to_string(),
        Granularity::Weekly => {
            // ISO year can differ from the calendar year around New Year
            let week = date.iso_week();
            format!("{}-W{:02}", week.year(), week.week())
        }
        Granularity::Monthly => date.format("%Y-%m").to_string(),
    }
}

#[derive(Debug, Default)]
struct PeriodAccumulator {
    total: f64,
    magnitude: f64,
    count: usize,
}

/// Groups slippage by period. Owns its accumulator until [`finish`].
///
/// [`finish`]: PeriodBuilder::finish
#[derive(Debug)]
pub struct PeriodBuilder {
    granularity: Granularity,
    periods: BTreeMap<String, PeriodAccumulator>,
}

impl PeriodBuilder {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            periods: BTreeMap::new(),
        }
    }

    pub fn add(&mut self, pair: &MatchedPair) {
        let slippage = pair.slippage();
        let acc = self
            .periods
            .entry(period_key(pair.date, self.granularity))
            .or_default();
        acc.total += slippage;
        acc.magnitude += slippage.abs();
        acc.count += 1;
    }

    /// Periods in key order, which is chronological for all granularities.
    pub fn finish(self) -> Vec<PeriodSlippage> {
        self.periods
            .into_iter()
            .map(|(period, acc)| {
                let n = acc.count as f64;
                PeriodSlippage {
                    period,
                    total_slippage: acc.total,
                    avg_slippage: acc.total / n,
                    trade_count: acc.count,
                    avg_magnitude: acc.magnitude / n,
                }
            })
            .collect()
    }
}

/// Aggregate matched pairs into per-period slippage.
pub fn aggregate_periods<'a, I>(pairs: I, granularity: Granularity) -> Vec<PeriodSlippage>
where
    I: IntoIterator<Item = &'a MatchedPair>,
{
    let mut builder = PeriodBuilder::new(granularity);
    for pair in pairs {
        builder.add(pair);
    }
    builder.finish()
}
