//! Value types that cross every boundary in the pipeline: the immutable market
//! data record and the signal a strategy emits in response to it.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, TpResult};

/// One (timestamp, symbol, price) observation. Immutable once constructed —
/// strategies and the backtester's equity-mark path only ever read it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketDataPoint {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub price: Decimal,
}

impl MarketDataPoint {
    /// Construct a data point, rejecting an empty symbol or non-positive price.
    pub fn new(timestamp: DateTime<Utc>, symbol: impl Into<String>, price: Decimal) -> TpResult<Self> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(DataError::InvalidFormat {
                message: "symbol must be non-empty".into(),
            }
            .into());
        }
        if price <= Decimal::ZERO {
            return Err(DataError::InvalidFormat {
                message: format!("price must be > 0, got {price}"),
            }
            .into());
        }
        Ok(Self {
            timestamp,
            symbol,
            price,
        })
    }
}

/// A BUY/SELL intent emitted by a strategy on a specific bar. HOLD is never
/// represented as a value — the absence of a `Signal` *is* the HOLD outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalAction {
    Buy,
    Sell,
}

impl std::fmt::Display for SignalAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub timestamp: DateTime<Utc>,
    pub action: SignalAction,
    pub symbol: String,
    /// Price at the emitting bar.
    pub price: Decimal,
    pub reason: String,
}

impl Signal {
    pub fn new(
        timestamp: DateTime<Utc>,
        action: SignalAction,
        symbol: impl Into<String>,
        price: Decimal,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            timestamp,
            action,
            symbol: symbol.into(),
            price,
            reason: reason.into(),
        }
    }
}
