//! backtest-drift: Backtest vs Live Slippage Analysis
//!
//! This is the root crate that provides benchmark and integration test access
//! to the workspace crates. For actual functionality, use the individual
//! crates directly:
//!
//! - `drift-core`: Trade records, options, result types, configuration
//! - `reconciler`: Matching, scaling, pattern detection, strategy resolution, trends
//! - `drift-cli`: The `drift` command-line front end

// Re-export for benchmarks
pub use drift_core as core;
pub use reconciler;
