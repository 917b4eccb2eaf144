//! Reconciler
//!
//! Compare backtested options trades against live execution to quantify
//! slippage and detect when live results drift from the backtest.
//!
//! # Features
//!
//! - **Trade Matching**: Pair backtest and live trades by date, strategy and opening minute
//! - **P&L Scaling**: Raw, per-contract, or backtest scaled to the live size
//! - **Pattern Detection**: Direction bias, time-of-day outlier clusters, market context correlation
//! - **Strategy Resolution**: Suggest live strategies for renamed backtest strategies
//! - **Trend Regression**: Is slippage improving, stable or degrading over time
//!
//! # Example
//!
//! ```ignore
//! use reconciler::compute_discrepancies;
//! use drift_core::types::{Analysis, DiscrepancyOptions};
//!
//! let analysis = compute_discrepancies(&backtest, Some(&actual), &DiscrepancyOptions::default())?;
//! if let Analysis::Ready(report) = analysis {
//!     println!("{}", report.summary_text());
//! }
//! ```

pub mod analysis;
pub mod filter;
pub mod identity;
pub mod matcher;
pub mod patterns;
pub mod periods;
pub mod scaling;
pub mod stats;
pub mod trend;

// Re-exports
pub use analysis::{analyze_slippage_trends, compute_discrepancies, suggest_strategy_matches};
pub use identity::{
    AssignmentStrategy, DailyPl, DailyPlSeries, DailySeriesBuilder, GreedyAssignment,
    StrategyIdentityResolver,
};
pub use matcher::{ClosestContracts, Fifo, MatchKey, MatchOutcome, TieBreak, TradeMatcher};
pub use patterns::{PatternConfig, PatternDetector};
pub use periods::{aggregate_periods, period_key, PeriodBuilder};
pub use scaling::{PnlScaler, ScaledPnl};
pub use trend::TrendRegressor;
