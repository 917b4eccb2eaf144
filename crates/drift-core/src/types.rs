//! Core domain types for backtest drift analysis.

pub mod fields;
pub mod options;
pub mod results;
pub mod trade;

pub use fields::*;
pub use options::*;
pub use results::*;
pub use trade::*;
