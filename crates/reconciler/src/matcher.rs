//! Composite-key trade matching between backtest and live logs.
//!
//! Trades are paired on `(date, strategy, minute-truncated open time)`.
//! There is no trade ID shared by the two logs, so when several live trades
//! share a key the choice between them is delegated to a [`TieBreak`]. The
//! default [`Fifo`] consumes them in log order and does not look at size or
//! P&L, which means two same-minute trades can be cross-matched.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;

use chrono::{NaiveDate, NaiveTime};
use drift_core::types::{
    ExecutedTrade, MatchedPair, ReportingTrade, ScalingMode, TieBreakPolicy, Trade,
};
use tracing::debug;

use crate::scaling::PnlScaler;

/// Key shared by a backtest trade and its live counterpart.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MatchKey {
    pub date: NaiveDate,
    pub strategy: String,
    pub minute: NaiveTime,
}

impl MatchKey {
    pub fn for_trade<T: ExecutedTrade>(trade: &T) -> Self {
        Self::with_strategy(trade, trade.strategy())
    }

    /// Key using a strategy name other than the one on the trade.
    pub fn with_strategy<T: ExecutedTrade>(trade: &T, strategy: &str) -> Self {
        Self {
            date: trade.date_opened(),
            strategy: strategy.to_string(),
            minute: trade.opened_minute(),
        }
    }
}

impl fmt::Display for MatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}",
            self.date.format("%Y-%m-%d"),
            self.strategy,
            self.minute.format("%H:%M")
        )
    }
}

/// Chooses which queued live trade a backtest trade consumes.
pub trait TieBreak: Send + Sync {
    /// Index into `candidates`, which is never empty and is in log order.
    fn select(&self, backtest: &Trade, candidates: &VecDeque<&ReportingTrade>) -> usize;
}

/// Log order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fifo;

impl TieBreak for Fifo {
    fn select(&self, _backtest: &Trade, _candidates: &VecDeque<&ReportingTrade>) -> usize {
        0
    }
}

/// Nearest contract count; log order among equally close trades.
#[derive(Debug, Clone, Copy, Default)]
pub struct ClosestContracts;

impl TieBreak for ClosestContracts {
    fn select(&self, backtest: &Trade, candidates: &VecDeque<&ReportingTrade>) -> usize {
        candidates
            .iter()
            .enumerate()
            .min_by_key(|(_, live)| live.num_contracts.abs_diff(backtest.num_contracts))
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    }
}

impl From<TieBreakPolicy> for Box<dyn TieBreak> {
    fn from(policy: TieBreakPolicy) -> Self {
        match policy {
            TieBreakPolicy::Fifo => Box::new(Fifo),
            TieBreakPolicy::ClosestContracts => Box::new(ClosestContracts),
        }
    }
}

/// Result of pairing two logs.
#[derive(Debug, Clone, Default)]
pub struct MatchOutcome {
    pub matched_trades: Vec<MatchedPair>,
    pub unmatched_backtest_count: usize,
    pub unmatched_actual_count: usize,
}

impl MatchOutcome {
    pub fn matched_count(&self) -> usize {
        self.matched_trades.len()
    }
}

pub struct TradeMatcher {
    scaler: PnlScaler,
    tie_break: Box<dyn TieBreak>,
    /// Live strategy name -> backtest strategy name.
    aliases: BTreeMap<String, String>,
}

impl Default for TradeMatcher {
    fn default() -> Self {
        Self::new(ScalingMode::Raw)
    }
}

impl TradeMatcher {
    pub fn new(scaling: ScalingMode) -> Self {
        Self {
            scaler: PnlScaler::new(scaling),
            tie_break: Box::new(Fifo),
            aliases: BTreeMap::new(),
        }
    }

    pub fn with_tie_break(mut self, tie_break: Box<dyn TieBreak>) -> Self {
        self.tie_break = tie_break;
        self
    }

    pub fn with_policy(self, policy: TieBreakPolicy) -> Self {
        self.with_tie_break(policy.into())
    }

    pub fn with_aliases(mut self, aliases: BTreeMap<String, String>) -> Self {
        self.aliases = aliases;
        self
    }

    /// Pair every backtest trade with at most one live trade.
    ///
    /// Each live trade is consumed at most once, so
    /// `matched + unmatched_backtest == backtest.len()` and
    /// `matched + unmatched_actual == actual.len()`.
    pub fn match_trades(&self, backtest: &[Trade], actual: &[ReportingTrade]) -> MatchOutcome {
        let mut queues: HashMap<MatchKey, VecDeque<&ReportingTrade>> = HashMap::new();
        for live in actual {
            let strategy = self
                .aliases
                .get(&live.strategy)
                .map(String::as_str)
                .unwrap_or(live.strategy.as_str());
            queues
                .entry(MatchKey::with_strategy(live, strategy))
                .or_default()
                .push_back(live);
        }

        let mut matched_trades = Vec::with_capacity(backtest.len().min(actual.len()));
        let mut unmatched_backtest_count = 0;

        for trade in backtest {
            let key = MatchKey::for_trade(trade);
            let live = match queues.get_mut(&key) {
                Some(queue) if !queue.is_empty() => {
                    let idx = self.tie_break.select(trade, queue).min(queue.len() - 1);
                    queue.remove(idx)
                }
                _ => None,
            };

            match live {
                Some(live) => matched_trades.push(self.pair(trade, live, &key)),
                None => {
                    debug!(key = %key, "No live trade for backtest trade");
                    unmatched_backtest_count += 1;
                }
            }
        }

        let unmatched_actual_count = queues.values().map(VecDeque::len).sum();

        debug!(
            matched = matched_trades.len(),
            unmatched_backtest = unmatched_backtest_count,
            unmatched_actual = unmatched_actual_count,
            scaling = ?self.scaler.mode(),
            "Trade matching complete"
        );

        MatchOutcome {
            matched_trades,
            unmatched_backtest_count,
            unmatched_actual_count,
        }
    }

    fn pair(&self, trade: &Trade, live: &ReportingTrade, key: &MatchKey) -> MatchedPair {
        let scaled = self
            .scaler
            .scale(trade.pl, trade.num_contracts, live.pl, live.num_contracts);

        MatchedPair {
            date: key.date,
            strategy: key.strategy.clone(),
            time_opened: key.minute,
            backtest_pl: scaled.backtest,
            actual_pl: scaled.actual,
            total_slippage: scaled.slippage(),
            backtest_contracts: trade.num_contracts,
            actual_contracts: live.num_contracts,
            opening_vix: trade.opening_vix,
            gap: trade.gap,
            movement: trade.movement,
            custom_fields: trade.custom_fields.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, day).unwrap()
    }

    fn time(h: u32, m: u32, s: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, s).unwrap()
    }

    fn bt(day: u32, t: NaiveTime, strategy: &str, pl: i64, contracts: u32) -> Trade {
        Trade::new(date(day), t, strategy, Decimal::new(pl, 0), contracts)
    }

    fn live(day: u32, t: NaiveTime, strategy: &str, pl: i64, contracts: u32) -> ReportingTrade {
        ReportingTrade::new(date(day), t, strategy, Decimal::new(pl, 0), contracts)
    }

    #[test]
    fn test_match_key_display() {
        let trade = bt(3, time(9, 45, 12), "Put Spread", 10, 1);
        assert_eq!(
            MatchKey::for_trade(&trade).to_string(),
            "2024-05-03|Put Spread|09:45"
        );
    }

    #[test]
    fn test_matches_on_minute_truncated_time() {
        let backtest = vec![bt(1, time(9, 30, 0), "IC", 100, 1)];
        let actual = vec![live(1, time(9, 30, 42), "IC", 80, 1)];

        let outcome = TradeMatcher::default().match_trades(&backtest, &actual);

        assert_eq!(outcome.matched_count(), 1);
        let pair = &outcome.matched_trades[0];
        assert_eq!(pair.time_opened, time(9, 30, 0));
        assert_eq!(pair.total_slippage, Decimal::new(-20, 0));
    }

    #[test]
    fn test_unmatched_counts_balance() {
        let backtest = vec![
            bt(1, time(9, 30, 0), "IC", 100, 1),
            bt(1, time(10, 0, 0), "IC", 50, 1),
            bt(2, time(9, 30, 0), "Strangle", -40, 1),
        ];
        let actual = vec![
            live(1, time(9, 30, 0), "IC", 90, 1),
            live(2, time(9, 31, 0), "Strangle", -60, 1),
            live(3, time(9, 30, 0), "IC", 10, 1),
        ];

        let outcome = TradeMatcher::default().match_trades(&backtest, &actual);

        assert_eq!(outcome.matched_count(), 1);
        assert_eq!(outcome.matched_count() + outcome.unmatched_backtest_count, backtest.len());
        assert_eq!(outcome.matched_count() + outcome.unmatched_actual_count, actual.len());
    }

    #[test]
    fn test_strategy_names_must_match_exactly() {
        let backtest = vec![bt(1, time(9, 30, 0), "IC", 100, 1)];
        let actual = vec![live(1, time(9, 30, 0), "ic", 100, 1)];

        let outcome = TradeMatcher::default().match_trades(&backtest, &actual);
        assert_eq!(outcome.matched_count(), 0);
        assert_eq!(outcome.unmatched_backtest_count, 1);
        assert_eq!(outcome.unmatched_actual_count, 1);
    }

    #[test]
    fn test_duplicate_keys_consumed_in_log_order() {
        // Same key on both sides; FIFO ignores that sizes line up crosswise.
        let backtest = vec![
            bt(1, time(9, 30, 0), "IC", 100, 1),
            bt(1, time(9, 30, 0), "IC", 300, 3),
        ];
        let actual = vec![
            live(1, time(9, 30, 5), "IC", 290, 3),
            live(1, time(9, 30, 9), "IC", 95, 1),
        ];

        let outcome = TradeMatcher::default().match_trades(&backtest, &actual);

        assert_eq!(outcome.matched_count(), 2);
        assert_eq!(outcome.matched_trades[0].actual_contracts, 3);
        assert_eq!(outcome.matched_trades[0].total_slippage, Decimal::new(190, 0));
        assert_eq!(outcome.matched_trades[1].actual_contracts, 1);
    }

    #[test]
    fn test_closest_contracts_tie_break() {
        let backtest = vec![
            bt(1, time(9, 30, 0), "IC", 100, 1),
            bt(1, time(9, 30, 0), "IC", 300, 3),
        ];
        let actual = vec![
            live(1, time(9, 30, 5), "IC", 290, 3),
            live(1, time(9, 30, 9), "IC", 95, 1),
        ];

        let outcome = TradeMatcher::default()
            .with_policy(TieBreakPolicy::ClosestContracts)
            .match_trades(&backtest, &actual);

        assert_eq!(outcome.matched_trades[0].actual_contracts, 1);
        assert_eq!(outcome.matched_trades[0].total_slippage, Decimal::new(-5, 0));
        assert_eq!(outcome.matched_trades[1].actual_contracts, 3);
        assert_eq!(outcome.matched_trades[1].total_slippage, Decimal::new(-10, 0));
    }

    #[test]
    fn test_each_live_trade_consumed_once() {
        let backtest = vec![
            bt(1, time(9, 30, 0), "IC", 100, 1),
            bt(1, time(9, 30, 0), "IC", 100, 1),
        ];
        let actual = vec![live(1, time(9, 30, 0), "IC", 100, 1)];

        let outcome = TradeMatcher::default().match_trades(&backtest, &actual);
        assert_eq!(outcome.matched_count(), 1);
        assert_eq!(outcome.unmatched_backtest_count, 1);
        assert_eq!(outcome.unmatched_actual_count, 0);
    }

    #[test]
    fn test_aliases_rename_live_strategy() {
        let backtest = vec![bt(1, time(9, 30, 0), "Iron Condor 45DTE", 100, 1)];
        let actual = vec![live(1, time(9, 30, 0), "IC-45", 70, 1)];

        let mut aliases = BTreeMap::new();
        aliases.insert("IC-45".to_string(), "Iron Condor 45DTE".to_string());

        let outcome = TradeMatcher::default()
            .with_aliases(aliases)
            .match_trades(&backtest, &actual);

        assert_eq!(outcome.matched_count(), 1);
        assert_eq!(outcome.matched_trades[0].strategy, "Iron Condor 45DTE");
    }

    #[test]
    fn test_context_copied_from_backtest() {
        let backtest = vec![bt(1, time(9, 30, 0), "IC", 100, 2).with_vix(22.5).with_gap(-0.4)];
        let actual = vec![live(1, time(9, 30, 0), "IC", 150, 3)];

        let outcome = TradeMatcher::new(ScalingMode::PerContract).match_trades(&backtest, &actual);

        let pair = &outcome.matched_trades[0];
        assert_eq!(pair.opening_vix, Some(22.5));
        assert_eq!(pair.gap, Some(-0.4));
        assert_eq!(pair.total_slippage, Decimal::ZERO);
    }
}
