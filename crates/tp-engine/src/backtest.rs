//! The backtester: replays historical bars through strategy -> order manager
//! -> risk -> matching, tracks its own equity/position bookkeeping distinct
//! from the risk engine's copy, and computes performance metrics (spec
//! §4.H). Also supports running a list of parameter configurations as a
//! sweep, sorted by total pnl.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use tp_data::audit::AuditLog;
use tp_risk::{RiskEngine, RiskEngineConfig};
use tp_types::{MarketDataPoint, OrderStatus, Side, Signal, SignalAction, TpResult};

use crate::order_manager::{self, OrderManager, ProcessResult};
use crate::strategy::Strategy;

/// One completed round-trip position (spec §3 `TradeRecord`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub qty: i64,
    pub entry_price: Decimal,
    pub exit_price: Decimal,
    pub pnl: Decimal,
}

/// One row of the trade log (spec §6 `<label>_trade_log.csv`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub signal: String,
    pub symbol: String,
    pub status: String,
    pub qty: i64,
    pub price: Decimal,
    pub reason: String,
    pub order_id: Option<u64>,
}

/// Performance metrics computed from the equity curve and completed trades
/// (spec §4.H).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    pub win_rate: f64,
    pub profit_factor: f64,
    pub num_trades: usize,
    pub realized_pnl: Decimal,
}

fn decimal_to_f64(d: Decimal) -> f64 {
    d.to_f64().unwrap_or(0.0)
}

impl PerformanceMetrics {
    fn calculate(
        initial_capital: Decimal,
        equity_curve: &[(DateTime<Utc>, Decimal)],
        completed_trades: &[TradeRecord],
        realized_pnl: Decimal,
    ) -> Self {
        let final_equity = equity_curve.last().map(|(_, e)| *e).unwrap_or(initial_capital);
        let total_return = if initial_capital > Decimal::ZERO {
            decimal_to_f64((final_equity - initial_capital) / initial_capital)
        } else {
            0.0
        };

        let returns: Vec<f64> = equity_curve
            .windows(2)
            .filter_map(|pair| {
                let (_, prev) = pair[0];
                let (_, cur) = pair[1];
                if prev > Decimal::ZERO {
                    Some(decimal_to_f64((cur - prev) / prev))
                } else {
                    None
                }
            })
            .collect();

        let sharpe_ratio = if returns.len() > 1 {
            let mean = returns.iter().sum::<f64>() / returns.len() as f64;
            let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / (returns.len() - 1) as f64;
            let stdev = variance.sqrt();
            if stdev > 0.0 {
                (mean / stdev) * (252.0_f64).sqrt()
            } else {
                0.0
            }
        } else {
            0.0
        };

        let mut running_max = initial_capital;
        let mut max_drawdown = 0.0_f64;
        for (_, equity) in equity_curve {
            if *equity > running_max {
                running_max = *equity;
            }
            if running_max > Decimal::ZERO {
                let dd = decimal_to_f64((*equity - running_max) / running_max);
                if dd < max_drawdown {
                    max_drawdown = dd;
                }
            }
        }

        let win_rate = if completed_trades.is_empty() {
            0.0
        } else {
            let wins = completed_trades.iter().filter(|t| t.pnl > Decimal::ZERO).count();
            wins as f64 / completed_trades.len() as f64
        };

        let gross_profit: Decimal = completed_trades.iter().map(|t| t.pnl).filter(|p| *p > Decimal::ZERO).sum();
        let gross_loss: Decimal = completed_trades
            .iter()
            .map(|t| t.pnl)
            .filter(|p| *p < Decimal::ZERO)
            .map(|p| p.abs())
            .sum();
        let profit_factor = if completed_trades.is_empty() {
            0.0
        } else if gross_loss > Decimal::ZERO {
            decimal_to_f64(gross_profit / gross_loss)
        } else if gross_profit > Decimal::ZERO {
            f64::INFINITY
        } else {
            0.0
        };

        Self {
            total_return,
            sharpe_ratio,
            max_drawdown,
            win_rate,
            profit_factor,
            num_trades: completed_trades.len(),
            realized_pnl,
        }
    }
}

/// A strategy factory + risk/capital configuration for one backtest run.
pub struct BacktestConfig {
    pub label: String,
    pub symbol: String,
    pub data_path: PathBuf,
    pub initial_capital: Decimal,
    pub risk_config: RiskEngineConfig,
    pub output_dir: PathBuf,
    pub seed: u64,
}

/// The backtester's own accounting, distinct from the risk engine's copy
/// (spec §4.H step 5: "this is distinct from RiskEngine's copy").
struct Ledger {
    cash: Decimal,
    position: i64,
    avg_entry_price: Decimal,
    realized_pnl: Decimal,
    open_trade_start: Option<DateTime<Utc>>,
}

pub struct BacktestResult {
    pub equity_curve: Vec<(DateTime<Utc>, Decimal)>,
    pub trade_log: Vec<TradeLogEntry>,
    pub completed_trades: Vec<TradeRecord>,
    pub metrics: PerformanceMetrics,
}

/// Replays `data_path` through `strategy` + a freshly constructed risk
/// engine + order manager, producing an equity curve, trade log, completed
/// trades, and performance metrics.
pub fn run(strategy: &mut dyn Strategy, config: &BacktestConfig) -> TpResult<BacktestResult> {
    let risk = RiskEngine::new(config.risk_config.clone(), config.initial_capital);
    let audit = AuditLog::new(config.output_dir.join("order_audits").join(format!("{}_audit.csv", config.label)));
    let rng = Box::new(ChaCha8Rng::seed_from_u64(config.seed));
    let mut manager = OrderManager::new_simulated(&risk, audit, rng);

    let mut ledger = Ledger {
        cash: config.initial_capital,
        position: 0,
        avg_entry_price: Decimal::ZERO,
        realized_pnl: Decimal::ZERO,
        open_trade_start: None,
    };

    let mut equity_curve = Vec::new();
    let mut trade_log = Vec::new();
    let mut completed_trades = Vec::new();
    let mut last_price = Decimal::ZERO;

    for bar in tp_data::gateway::load_market_data(&config.data_path)? {
        if bar.symbol != config.symbol {
            continue;
        }
        last_price = bar.price;

        // 1. Mark-to-market.
        let equity = ledger.cash + Decimal::from(ledger.position) * bar.price;
        equity_curve.push((bar.timestamp, equity));

        // 2. Strategy signal.
        let Some(signal) = strategy.on_new_bar(&bar) else {
            continue;
        };

        // 3. Build order.
        let side = match signal.action {
            SignalAction::Buy => Side::Buy,
            SignalAction::Sell => Side::Sell,
        };
        let order = order_manager::order_from_signal(side, &signal.symbol, strategy.position_size(), signal.price);

        // 4. Process.
        let result = manager.process_order(order);
        log_trade_row(&mut trade_log, &bar, &signal, &result);

        // 5. Backtester's own fill bookkeeping.
        if let ProcessResult::Processed {
            status,
            order,
            filled_qty,
            filled_price,
            ..
        } = &result
        {
            if matches!(status, OrderStatus::Filled | OrderStatus::Partial) && *filled_qty > 0 {
                let price = filled_price.unwrap_or(order.price);
                apply_fill(&mut ledger, &mut completed_trades, order.side, *filled_qty, price, bar.timestamp);
            }
        }
    }

    let metrics = PerformanceMetrics::calculate(config.initial_capital, &equity_curve, &completed_trades, ledger.realized_pnl);
    info!(label = %config.label, total_return = metrics.total_return, trades = metrics.num_trades, "backtest complete");

    let _ = last_price;
    Ok(BacktestResult {
        equity_curve,
        trade_log,
        completed_trades,
        metrics,
    })
}

fn log_trade_row(trade_log: &mut Vec<TradeLogEntry>, bar: &MarketDataPoint, signal: &Signal, result: &ProcessResult) {
    let (status, order_id) = match result {
        ProcessResult::Processed { status, order, .. } => (status.to_string(), order.id),
        ProcessResult::Rejected { msg } => (msg.clone(), None),
        ProcessResult::Failed { error } => (error.clone(), None),
    };
    trade_log.push(TradeLogEntry {
        timestamp: bar.timestamp,
        signal: signal.action.to_string(),
        symbol: signal.symbol.clone(),
        status,
        qty: strategy_order_qty(result),
        price: signal.price,
        reason: signal.reason.clone(),
        order_id,
    });
}

fn strategy_order_qty(result: &ProcessResult) -> i64 {
    match result {
        ProcessResult::Processed { order, .. } => order.qty,
        ProcessResult::Rejected { .. } => 0,
        ProcessResult::Failed { .. } => 0,
    }
}

/// Spec §4.H step 5: BUY with `position == 0` opens a new trade (weighted
/// average into it otherwise); SELL closes `min(qty, position)` shares,
/// realizes pnl, and appends a completed `TradeRecord` once the position
/// reaches zero.
fn apply_fill(
    ledger: &mut Ledger,
    completed_trades: &mut Vec<TradeRecord>,
    side: Side,
    qty: i64,
    price: Decimal,
    ts: DateTime<Utc>,
) {
    match side {
        Side::Buy => {
            let cost = Decimal::from(qty) * price;
            ledger.cash -= cost;
            if ledger.position == 0 {
                ledger.open_trade_start = Some(ts);
                ledger.avg_entry_price = price;
            } else {
                let total_cost = Decimal::from(ledger.position) * ledger.avg_entry_price + cost;
                let new_position = ledger.position + qty;
                ledger.avg_entry_price = total_cost / Decimal::from(new_position);
            }
            ledger.position += qty;
        }
        Side::Sell => {
            let close_qty = qty.min(ledger.position);
            if close_qty > 0 {
                ledger.cash += Decimal::from(close_qty) * price;
                let pnl = (price - ledger.avg_entry_price) * Decimal::from(close_qty);
                ledger.realized_pnl += pnl;
                completed_trades.push(TradeRecord {
                    entry_time: ledger.open_trade_start.unwrap_or(ts),
                    exit_time: ts,
                    qty: close_qty,
                    entry_price: ledger.avg_entry_price,
                    exit_price: price,
                    pnl,
                });
                ledger.position -= close_qty;
                if ledger.position == 0 {
                    ledger.avg_entry_price = Decimal::ZERO;
                    ledger.open_trade_start = None;
                }
            }
        }
    }
}

/// Runs a list of `(label, factory)` configurations and returns results
/// sorted by realized pnl, descending (spec §4.H "parameter sweeps").
pub fn sweep(
    configs: Vec<(BacktestConfig, Box<dyn FnOnce() -> Box<dyn Strategy>>)>,
) -> TpResult<Vec<(String, BacktestResult)>> {
    let mut results = Vec::new();
    for (config, factory) in configs {
        let mut strategy = factory();
        let result = run(strategy.as_mut(), &config)?;
        results.push((config.label.clone(), result));
    }
    results.sort_by(|a, b| b.1.metrics.realized_pnl.cmp(&a.1.metrics.realized_pnl));
    Ok(results)
}

/// Writes the `<label>_metrics.json`, `<label>_trade_log.csv`, and
/// `<label>_completed_trades.csv` artifacts (spec §6).
pub fn write_artifacts(label: &str, output_dir: &Path, result: &BacktestResult) -> TpResult<()> {
    std::fs::create_dir_all(output_dir)?;

    let metrics_path = output_dir.join(format!("{label}_metrics.json"));
    std::fs::write(metrics_path, serde_json::to_string_pretty(&result.metrics)?)?;

    let mut trade_log_wtr = csv::Writer::from_path(output_dir.join(format!("{label}_trade_log.csv")))?;
    for row in &result.trade_log {
        trade_log_wtr.serialize(row)?;
    }
    trade_log_wtr.flush()?;

    let mut trades_wtr = csv::Writer::from_path(output_dir.join(format!("{label}_completed_trades.csv")))?;
    for row in &result.completed_trades {
        trades_wtr.serialize(row)?;
    }
    trades_wtr.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use crate::strategy::MaCrossover;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    fn config(data_path: PathBuf, output_dir: PathBuf) -> BacktestConfig {
        BacktestConfig {
            label: "test".to_string(),
            symbol: "AAPL".to_string(),
            data_path,
            initial_capital: Decimal::from(1_000_000),
            risk_config: RiskEngineConfig {
                max_order_size: 1000,
                max_position: 1000,
                ..Default::default()
            },
            output_dir,
            seed: 7,
        }
    }

    #[test]
    fn empty_market_data_yields_zeroed_metrics() {
        let f = write_csv("Datetime,Open,High,Low,Close,Volume,Symbol\n");
        let dir = tempfile::tempdir().unwrap();
        let mut strat = MaCrossover::new("AAPL", 2, 3, 10);
        let result = run(&mut strat, &config(f.path().to_path_buf(), dir.path().to_path_buf())).unwrap();
        assert!(result.equity_curve.is_empty());
        assert_eq!(result.metrics.num_trades, 0);
        assert_eq!(result.metrics.total_return, 0.0);
    }

    #[test]
    fn short_series_produces_no_signals() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02 09:30:00,100,101,99,100,1000,AAPL\n\
             2024-01-02 09:31:00,100,101,99,101,1000,AAPL\n",
        );
        let dir = tempfile::tempdir().unwrap();
        let mut strat = MaCrossover::new("AAPL", 2, 5, 10);
        let result = run(&mut strat, &config(f.path().to_path_buf(), dir.path().to_path_buf())).unwrap();
        assert_eq!(result.trade_log.len(), 0);
    }

    #[test]
    fn happy_path_two_row_run_produces_audit_and_terminal_status() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02 09:30:00,105,106,104,105,1000,AAPL\n\
             2024-01-02 09:31:00,101,102,100,101,1000,AAPL\n",
        );
        let dir = tempfile::tempdir().unwrap();
        let mut strat = MaCrossover::new("AAPL", 1, 2, 10);
        let result = run(&mut strat, &config(f.path().to_path_buf(), dir.path().to_path_buf())).unwrap();
        assert_eq!(result.equity_curve.len(), 2);
    }

    #[test]
    fn metrics_total_return_matches_equity_delta() {
        let equity_curve = vec![
            (Utc::now(), Decimal::from(100_000)),
            (Utc::now(), Decimal::from(110_000)),
        ];
        let metrics = PerformanceMetrics::calculate(Decimal::from(100_000), &equity_curve, &[], Decimal::ZERO);
        assert!((metrics.total_return - 0.1).abs() < 1e-9);
    }

    #[test]
    fn profit_factor_is_infinite_with_only_winning_trades() {
        let trades = vec![TradeRecord {
            entry_time: Utc::now(),
            exit_time: Utc::now(),
            qty: 10,
            entry_price: Decimal::from(100),
            exit_price: Decimal::from(110),
            pnl: Decimal::from(100),
        }];
        let metrics = PerformanceMetrics::calculate(Decimal::from(100_000), &[], &trades, Decimal::from(100));
        assert!(metrics.profit_factor.is_infinite());
    }

    #[test]
    fn max_drawdown_is_non_positive() {
        let equity_curve = vec![
            (Utc::now(), Decimal::from(100_000)),
            (Utc::now(), Decimal::from(90_000)),
            (Utc::now(), Decimal::from(95_000)),
        ];
        let metrics = PerformanceMetrics::calculate(Decimal::from(100_000), &equity_curve, &[], Decimal::ZERO);
        assert!(metrics.max_drawdown <= 0.0);
        assert!((metrics.max_drawdown - (-0.1)).abs() < 1e-9);
    }
}
