//! Strategy and date pre-filter applied to both logs.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use drift_core::types::{ExecutedTrade, TradeFilter};

fn passes(filter: &TradeFilter, strategy: &str, date: NaiveDate) -> bool {
    let strategy_ok = filter.strategies.is_empty()
        || filter
            .strategies
            .iter()
            .any(|s| s.eq_ignore_ascii_case(strategy));

    let date_ok = filter
        .date_range
        .as_ref()
        .map_or(true, |range| range.contains(date));

    strategy_ok && date_ok
}

/// Whether a trade passes the filter.
pub fn keep<T: ExecutedTrade>(filter: &TradeFilter, trade: &T) -> bool {
    passes(filter, trade.strategy(), trade.date_opened())
}

/// Trades passing the filter, cloned in log order.
pub fn apply<T: ExecutedTrade + Clone>(filter: &TradeFilter, trades: &[T]) -> Vec<T> {
    trades.iter().filter(|t| keep(filter, *t)).cloned().collect()
}

/// Like [`apply`], but strategy names are checked after alias resolution.
///
/// Trades keep their original strategy name; the matcher applies the same
/// aliases when keying.
pub fn apply_aliased<T: ExecutedTrade + Clone>(
    filter: &TradeFilter,
    trades: &[T],
    aliases: &BTreeMap<String, String>,
) -> Vec<T> {
    trades
        .iter()
        .filter(|t| {
            let strategy = aliases
                .get(t.strategy())
                .map(String::as_str)
                .unwrap_or(t.strategy());
            passes(filter, strategy, t.date_opened())
        })
        .cloned()
        .collect()
}
