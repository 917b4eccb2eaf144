//! Drift CLI
//!
//! Reconcile a backtest trade log against a live reporting log from the
//! command line. Both logs are JSON arrays of trades.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use drift_core::config::{Config, LoggingConfig};
use drift_core::types::{
    Analysis, ContextField, CorrelationMethod, DateRange, Granularity, ReportingTrade,
    ScalingMode, TieBreakPolicy, Trade, TradeFilter,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "drift", author, version, about = "Backtest vs live slippage analysis", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Per-trade slippage statistics and systematic patterns
    Discrepancies(DiscrepancyArgs),
    /// Suggest live strategies for backtest strategies
    MatchStrategies(MatchArgs),
    /// Slippage trend over time
    Trends(TrendArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// Backtest trade log (JSON array)
    #[arg(long)]
    backtest: PathBuf,

    /// Live reporting log (JSON array); analysis is unavailable without it
    #[arg(long)]
    actual: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only analyze these strategies (repeatable, case-insensitive)
    #[arg(long = "strategy")]
    strategies: Vec<String>,

    /// First trade date to include (YYYY-MM-DD)
    #[arg(long)]
    from: Option<NaiveDate>,

    /// Last trade date to include (YYYY-MM-DD)
    #[arg(long)]
    to: Option<NaiveDate>,

    /// Correlation method: pearson, spearman or kendall
    #[arg(long)]
    method: Option<CorrelationMethod>,

    /// Emit JSON log lines
    #[arg(long, default_value_t = false)]
    json_logs: bool,
}

impl CommonArgs {
    fn filter(&self) -> TradeFilter {
        let date_range = (self.from.is_some() || self.to.is_some()).then_some(DateRange {
            from: self.from,
            to: self.to,
        });
        TradeFilter {
            strategies: self.strategies.clone(),
            date_range,
        }
    }
}

#[derive(Args, Debug)]
struct MatchingArgs {
    /// P&L scaling: raw, per-contract or to-reported
    #[arg(long)]
    scaling: Option<ScalingMode>,

    /// Minimum matched trades (discrepancies) or periods (trends)
    #[arg(long)]
    min_samples: Option<usize>,

    /// Duplicate key tie-break: fifo or closest-contracts
    #[arg(long)]
    tie_break: Option<TieBreakPolicy>,

    /// Treat a live strategy as a backtest strategy (actual=backtest, repeatable)
    #[arg(long = "alias", value_parser = parse_alias)]
    aliases: Vec<(String, String)>,

    /// Context field to correlate against (vix, gap, movement, custom:<name>, derived:hour, ...)
    #[arg(long = "field")]
    fields: Vec<ContextField>,
}

impl MatchingArgs {
    fn aliases(&self) -> BTreeMap<String, String> {
        self.aliases.iter().cloned().collect()
    }
}

#[derive(Args, Debug)]
struct DiscrepancyArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    matching: MatchingArgs,

    /// Share of trades needed to report a pattern, in (0, 1)
    #[arg(long)]
    pattern_threshold: Option<f64>,
}

#[derive(Args, Debug)]
struct MatchArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Minimum shared trading days to compare two strategies
    #[arg(long)]
    min_overlap_days: Option<usize>,

    /// Minimum correlation for a suggestion
    #[arg(long, allow_negative_numbers = true)]
    min_correlation: Option<f64>,

    /// Omit strategies without a match from the report
    #[arg(long, default_value_t = false)]
    hide_unmatched: bool,
}

#[derive(Args, Debug)]
struct TrendArgs {
    #[command(flatten)]
    common: CommonArgs,

    #[command(flatten)]
    matching: MatchingArgs,

    /// Period size: daily, weekly or monthly
    #[arg(long)]
    granularity: Option<Granularity>,

    /// Include per-period slippage in the output
    #[arg(long, default_value_t = false)]
    time_series: bool,

    /// Include context field correlations in the output
    #[arg(long, default_value_t = false)]
    external_factors: bool,
}

fn parse_alias(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((actual, backtest)) if !actual.trim().is_empty() && !backtest.trim().is_empty() => {
            Ok((actual.trim().to_string(), backtest.trim().to_string()))
        }
        _ => Err(format!("expected actual=backtest, got '{}'", value)),
    }
}

fn init_logging(logging: &LoggingConfig, json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter.clone().into());
    let json = json || logging.json;

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr)))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

fn read_trades<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

fn load_logs(common: &CommonArgs) -> Result<(Vec<Trade>, Option<Vec<ReportingTrade>>)> {
    let backtest: Vec<Trade> = read_trades(&common.backtest)?;
    let actual = match &common.actual {
        Some(path) => Some(read_trades::<ReportingTrade>(path)?),
        None => None,
    };
    info!(
        backtest = backtest.len(),
        actual = actual.as_ref().map(Vec::len),
        "Loaded trade logs"
    );
    Ok((backtest, actual))
}

/// Summary text followed by the full result as pretty JSON.
fn print_analysis<T: Serialize>(analysis: &Analysis<T>, summary: impl Fn(&T) -> String) -> Result<()> {
    let json = serde_json::to_string_pretty(analysis).context("Failed to serialize result")?;

    match analysis {
        Analysis::Ready(report) => println!("{}\n", summary(report)),
        Analysis::Unavailable { reason } => println!("Analysis unavailable: {}\n", reason),
        Analysis::NoTrades { backtest, actual } => println!(
            "No trades to analyze ({} backtest, {} actual)\n",
            backtest, actual
        ),
    }
    println!("{}", json);
    Ok(())
}

fn setup(common: &CommonArgs) -> Result<Config> {
    let config = Config::load(common.config.as_deref()).context("Failed to load configuration")?;
    init_logging(&config.logging, common.json_logs);
    Ok(config)
}

fn run_discrepancies(args: DiscrepancyArgs) -> Result<()> {
    let config = setup(&args.common)?;
    let mut options = config.analysis.discrepancy_options();

    options.filter = args.common.filter();
    options.strategy_aliases = args.matching.aliases();
    if let Some(method) = args.common.method {
        options.correlation_method = method;
    }
    if let Some(scaling) = args.matching.scaling {
        options.scaling = scaling;
    }
    if let Some(min_samples) = args.matching.min_samples {
        options.min_samples = min_samples;
    }
    if let Some(tie_break) = args.matching.tie_break {
        options.tie_break = tie_break;
    }
    if !args.matching.fields.is_empty() {
        options.context_fields = args.matching.fields.clone();
    }
    if let Some(threshold) = args.pattern_threshold {
        options.pattern_threshold = threshold;
    }

    let (backtest, actual) = load_logs(&args.common)?;
    let analysis = reconciler::compute_discrepancies(&backtest, actual.as_deref(), &options)?;
    print_analysis(&analysis, |report| report.summary_text())
}

fn run_match_strategies(args: MatchArgs) -> Result<()> {
    let config = setup(&args.common)?;
    let mut options = config.analysis.resolver_options();

    options.filter = args.common.filter();
    if let Some(method) = args.common.method {
        options.correlation_method = method;
    }
    if let Some(days) = args.min_overlap_days {
        options.min_overlap_days = days;
    }
    if args.min_correlation.is_some() {
        options.min_correlation = args.min_correlation;
    }
    if args.hide_unmatched {
        options.include_unmatched = false;
    }

    let (backtest, actual) = load_logs(&args.common)?;
    let analysis = reconciler::suggest_strategy_matches(&backtest, actual.as_deref(), &options)?;
    print_analysis(&analysis, |report| report.summary_text())
}

fn run_trends(args: TrendArgs) -> Result<()> {
    let config = setup(&args.common)?;
    let mut options = config.analysis.trend_options();

    options.filter = args.common.filter();
    options.strategy_aliases = args.matching.aliases();
    options.include_time_series = args.time_series;
    options.include_external_factors = args.external_factors;
    if let Some(method) = args.common.method {
        options.correlation_method = method;
    }
    if let Some(scaling) = args.matching.scaling {
        options.scaling = scaling;
    }
    if let Some(min_samples) = args.matching.min_samples {
        options.min_samples = min_samples;
    }
    if let Some(tie_break) = args.matching.tie_break {
        options.tie_break = tie_break;
    }
    if !args.matching.fields.is_empty() {
        options.context_fields = args.matching.fields.clone();
    }
    if let Some(granularity) = args.granularity {
        options.granularity = granularity;
    }

    let (backtest, actual) = load_logs(&args.common)?;
    let analysis = reconciler::analyze_slippage_trends(&backtest, actual.as_deref(), &options)?;
    print_analysis(&analysis, |report| report.summary_text())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Discrepancies(args) => run_discrepancies(args),
        Command::MatchStrategies(args) => run_match_strategies(args),
        Command::Trends(args) => run_trends(args),
    }
}
