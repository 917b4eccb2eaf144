//! Trade records for the backtest and live (reporting) logs.

use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveTime, Timelike};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Common view over a closed options position from either log.
pub trait ExecutedTrade {
    fn date_opened(&self) -> NaiveDate;
    fn time_opened(&self) -> NaiveTime;
    fn strategy(&self) -> &str;
    fn pl(&self) -> Decimal;
    fn num_contracts(&self) -> u32;

    /// Opening time with seconds and sub-seconds dropped.
    fn opened_minute(&self) -> NaiveTime {
        truncate_to_minute(self.time_opened())
    }
}

/// Drop seconds and nanoseconds from a time of day.
pub fn truncate_to_minute(time: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(time.hour(), time.minute(), 0).unwrap_or(time)
}

/// A simulated trade from the backtest log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    pub date_opened: NaiveDate,
    pub time_opened: NaiveTime,
    pub strategy: String,
    pub pl: Decimal,
    pub num_contracts: u32,
    /// VIX at the open, when the backtest engine recorded it.
    #[serde(default)]
    pub opening_vix: Option<f64>,
    /// Overnight gap of the underlying.
    #[serde(default)]
    pub gap: Option<f64>,
    /// Intraday movement of the underlying.
    #[serde(default)]
    pub movement: Option<f64>,
    /// User-defined numeric columns.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, f64>,
}

impl Trade {
    pub fn new(
        date_opened: NaiveDate,
        time_opened: NaiveTime,
        strategy: impl Into<String>,
        pl: Decimal,
        num_contracts: u32,
    ) -> Self {
        Self {
            date_opened,
            time_opened,
            strategy: strategy.into(),
            pl,
            num_contracts,
            opening_vix: None,
            gap: None,
            movement: None,
            custom_fields: BTreeMap::new(),
        }
    }

    pub fn with_vix(mut self, vix: f64) -> Self {
        self.opening_vix = Some(vix);
        self
    }

    pub fn with_gap(mut self, gap: f64) -> Self {
        self.gap = Some(gap);
        self
    }

    pub fn with_movement(mut self, movement: f64) -> Self {
        self.movement = Some(movement);
        self
    }

    pub fn with_custom_field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.custom_fields.insert(name.into(), value);
        self
    }
}

impl ExecutedTrade for Trade {
    fn date_opened(&self) -> NaiveDate {
        self.date_opened
    }

    fn time_opened(&self) -> NaiveTime {
        self.time_opened
    }

    fn strategy(&self) -> &str {
        &self.strategy
    }

    fn pl(&self) -> Decimal {
        self.pl
    }

    fn num_contracts(&self) -> u32 {
        self.num_contracts
    }
}

/// An executed trade from the broker reporting log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportingTrade {
    pub date_opened: NaiveDate,
    pub time_opened: NaiveTime,
    pub strategy: String,
    pub pl: Decimal,
    pub num_contracts: u32,
    #[serde(default)]
    pub opening_price: Option<Decimal>,
    #[serde(default)]
    pub closing_price: Option<Decimal>,
}

impl ReportingTrade {
    pub fn new(
        date_opened: NaiveDate,
        time_opened: NaiveTime,
        strategy: impl Into<String>,
        pl: Decimal,
        num_contracts: u32,
    ) -> Self {
        Self {
            date_opened,
            time_opened,
            strategy: strategy.into(),
            pl,
            num_contracts,
            opening_price: None,
            closing_price: None,
        }
    }
}

impl ExecutedTrade for ReportingTrade {
    fn date_opened(&self) -> NaiveDate {
        self.date_opened
    }

    fn time_opened(&self) -> NaiveTime {
        self.time_opened
    }

    fn strategy(&self) -> &str {
        &self.strategy
    }

    fn pl(&self) -> Decimal {
        self.pl
    }

    fn num_contracts(&self) -> u32 {
        self.num_contracts
    }
}

/// A backtest trade paired with the live trade that executed it.
///
/// P&L values are already scaled; `total_slippage` is always
/// `actual_pl - backtest_pl`. Context fields come from the backtest side,
/// which is the only log that records market conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchedPair {
    pub date: NaiveDate,
    pub strategy: String,
    /// Minute-truncated opening time shared by both trades.
    pub time_opened: NaiveTime,
    pub backtest_pl: Decimal,
    pub actual_pl: Decimal,
    pub total_slippage: Decimal,
    pub backtest_contracts: u32,
    pub actual_contracts: u32,
    pub opening_vix: Option<f64>,
    pub gap: Option<f64>,
    pub movement: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub custom_fields: BTreeMap<String, f64>,
}

impl MatchedPair {
    /// Slippage as a float for statistical work.
    pub fn slippage(&self) -> f64 {
        self.total_slippage.to_f64().unwrap_or(0.0)
    }
}
