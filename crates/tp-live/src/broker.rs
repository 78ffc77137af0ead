//! Minimal broker abstraction for the live execution path.
//!
//! Deliberately narrow — `submit`, `get_account`, `get_open_position`, and
//! `get_all_positions` are all the order manager needs to drive a live run.
//! Implementations translate [`Order::to_broker_request`] into their own wire
//! format; this crate stays unaware of any particular broker's SDK.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tp_types::{Order, OrderStatus};

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker rejected order: {reason}")]
    Rejected { reason: String },
    #[error("broker request failed: {message}")]
    RequestFailed { message: String },
}

pub type BrokerResult<T> = Result<T, BrokerError>;

/// What comes back from routing an order through a broker — the order
/// manager maps this to `{FILLED, PARTIAL, CANCELLED, OTHER}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionReport {
    pub status: OrderStatus,
    pub filled_qty: i64,
    pub filled_avg_price: Option<Decimal>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    pub cash: Decimal,
    pub equity: Decimal,
    pub buying_power: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub qty: i64,
    pub market_value: Decimal,
}

#[async_trait]
pub trait Broker: Send + Sync {
    async fn submit(&self, order: &Order) -> BrokerResult<ExecutionReport>;
    async fn get_account(&self) -> BrokerResult<AccountInfo>;
    async fn get_open_position(&self, symbol: &str) -> BrokerResult<Option<PositionInfo>>;
    async fn get_all_positions(&self) -> BrokerResult<Vec<(String, PositionInfo)>>;
}
