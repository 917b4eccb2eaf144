//! P&L scaling between backtest and live trades.

use drift_core::types::ScalingMode;
use rust_decimal::Decimal;

/// A (backtest, live) P&L pair on a common basis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaledPnl {
    pub backtest: Decimal,
    pub actual: Decimal,
}

impl ScaledPnl {
    /// Live minus backtest.
    pub fn slippage(&self) -> Decimal {
        self.actual - self.backtest
    }
}

/// Normalizes P&L pairs. Zero contract counts scale to zero rather than
/// failing.
#[derive(Debug, Clone, Copy, Default)]
pub struct PnlScaler {
    mode: ScalingMode,
}

impl PnlScaler {
    pub fn new(mode: ScalingMode) -> Self {
        Self { mode }
    }

    pub fn mode(&self) -> ScalingMode {
        self.mode
    }

    pub fn scale(
        &self,
        backtest_pl: Decimal,
        backtest_contracts: u32,
        actual_pl: Decimal,
        actual_contracts: u32,
    ) -> ScaledPnl {
        match self.mode {
            ScalingMode::Raw => ScaledPnl {
                backtest: backtest_pl,
                actual: actual_pl,
            },
            ScalingMode::PerContract => ScaledPnl {
                backtest: per_contract(backtest_pl, backtest_contracts),
                actual: per_contract(actual_pl, actual_contracts),
            },
            ScalingMode::ToReported => {
                let backtest = if backtest_contracts == 0 {
                    Decimal::ZERO
                } else {
                    backtest_pl * Decimal::from(actual_contracts) / Decimal::from(backtest_contracts)
                };
                ScaledPnl {
                    backtest,
                    actual: actual_pl,
                }
            }
        }
    }
}

fn per_contract(pl: Decimal, contracts: u32) -> Decimal {
    if contracts == 0 {
        Decimal::ZERO
    } else {
        pl / Decimal::from(contracts)
    }
}
