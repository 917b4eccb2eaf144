//! Drift Core Library
//!
//! Shared trade records, option types, result types and configuration for
//! reconciling backtest trade logs against live execution logs.

pub mod config;
pub mod error;
pub mod types;

pub use error::{Error, Result};
