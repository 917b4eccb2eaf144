//! Error types for backtest drift analysis.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] config::ConfigError),

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid option: {message}")]
    InvalidOption { message: String },

    #[error("Unknown context field: {0}")]
    InvalidField(String),

    #[error("No matched trades ({backtest} backtest, {actual} actual)")]
    NoMatchedTrades { backtest: usize, actual: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
