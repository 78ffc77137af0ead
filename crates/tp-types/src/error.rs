//! Crate-wide error hierarchy.
//!
//! Per spec §7, the strategy layer, the order book, and the order manager's
//! main flow never raise — degenerate math yields "no signal", rejections
//! come back as `{ok: false, msg}`-shaped return values. `TpError` is reserved
//! for genuine I/O and construction failures: a malformed CSV row the caller
//! chose to propagate rather than skip, an audit-file write failure, an
//! invalid `Order::from_map` payload reaching a caller that uses `?`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TpError {
    #[error("data error: {0}")]
    Data(#[from] DataError),

    #[error("order error: {0}")]
    Order(#[from] OrderError),

    #[error("risk error: {0}")]
    Risk(#[from] RiskError),

    #[error("backtest error: {0}")]
    Backtest(#[from] BacktestError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Gateway / market-data errors (spec §4.G, §7 `DataError`).
#[derive(Error, Debug)]
pub enum DataError {
    #[error("invalid data format: {message}")]
    InvalidFormat { message: String },

    #[error("failed to parse row: {message}")]
    ParseError { message: String },

    #[error("data loading failed: {message}")]
    LoadingFailed { message: String },
}

/// Order validation / construction errors (spec §4.A, §7 `ValidationError`).
#[derive(Error, Debug)]
pub enum OrderError {
    #[error("missing field '{field}' in order payload")]
    MissingField { field: &'static str },

    #[error("invalid side: must be BUY or SELL, got '{side}'")]
    InvalidSide { side: String },

    #[error("qty must be > 0, got {qty}")]
    InvalidQty { qty: String },

    #[error("price must be > 0, got {price}")]
    InvalidPrice { price: String },

    #[error("symbol must be non-empty")]
    EmptySymbol,

    #[error("order not found: {order_id}")]
    NotFound { order_id: String },
}

/// Pre-trade risk rejection reasons (spec §4.E, §7 `RiskRejection`).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RiskError {
    #[error("order qty {qty} exceeds max order size {max}")]
    OrderSizeExceeded { qty: String, max: String },

    #[error("order would exceed max position {max} (current {current}, prospective {prospective})")]
    PositionLimitExceeded {
        current: String,
        prospective: String,
        max: String,
    },

    #[error("order exceeds max total buy {max} for {symbol} (current {current})")]
    TotalBuyExceeded {
        symbol: String,
        current: String,
        max: String,
    },

    #[error("order exceeds max total sell {max} for {symbol} (current {current})")]
    TotalSellExceeded {
        symbol: String,
        current: String,
        max: String,
    },

    #[error("order value exceeds cash balance {cash}")]
    InsufficientCash { cash: String },

    #[error("order notional {notional} exceeds per-order cap {max}")]
    NotionalCapExceeded { notional: String, max: String },

    #[error("position in {symbol} would exceed {pct}% of equity")]
    ConcentrationExceeded { symbol: String, pct: String },

    #[error("market is closed for {symbol}")]
    MarketClosed { symbol: String },
}

/// Backtester-level errors (spec §4.H, §6 CLI surface).
#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("unknown strategy: {name}")]
    UnknownStrategy { name: String },

    #[error("no market data available")]
    NoData,

    #[error("invalid backtest configuration: {message}")]
    InvalidConfig { message: String },
}

pub type TpResult<T> = Result<T, TpError>;
