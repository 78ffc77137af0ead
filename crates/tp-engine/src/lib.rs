//! The trading pipeline core: strategies, the price-time-priority order
//! book, the simulated matching engine, the order manager, and the
//! backtester that drives them all over historical data.

pub mod backtest;
pub mod matching;
pub mod order_manager;
pub mod orderbook;
pub mod strategy;

pub use backtest::{run as run_backtest, BacktestConfig, BacktestResult, PerformanceMetrics, TradeLogEntry, TradeRecord};
pub use matching::{simulate_execution, ExecutionOutcome};
pub use order_manager::{ExecutionVenue, OrderManager, ProcessResult};
pub use orderbook::{DepthLevel, OrderBook, Trade};
pub use strategy::{MaCrossover, Momentum, NoSentiment, Sentiment, SentimentLookup, Strategy, ZScore};
