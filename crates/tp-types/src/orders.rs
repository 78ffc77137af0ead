//! The `Order` value type and the supporting enums/records that travel with
//! it through risk checks, execution, and audit logging.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{OrderError, TpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    pub fn opposite(&self) -> Side {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }

    fn parse(raw: &str) -> Option<Side> {
        match raw.to_ascii_uppercase().as_str() {
            "BUY" => Some(Side::Buy),
            "SELL" => Some(Side::Sell),
            _ => None,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Terminal/in-flight outcomes an order can reach (spec §4.D/§7 GLOSSARY "Fill").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    Filled,
    Partial,
    Cancelled,
    Rejected,
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderStatus::Filled => write!(f, "FILLED"),
            OrderStatus::Partial => write!(f, "PARTIAL"),
            OrderStatus::Cancelled => write!(f, "CANCELLED"),
            OrderStatus::Rejected => write!(f, "REJECTED"),
        }
    }
}

/// A concrete instruction routed to execution. `ts` and `id` are `None` until
/// the order manager admits the order (spec §3: "filled in on admission if
/// absent"); everything else is validated at construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub side: Side,
    pub symbol: String,
    pub qty: i64,
    pub price: Decimal,
    pub ts: Option<DateTime<Utc>>,
    pub id: Option<u64>,
}

impl Order {
    /// Construct directly from already-validated fields (used by strategies /
    /// the backtester, which compute qty/price themselves). Still enforces
    /// the core invariants.
    pub fn new(side: Side, symbol: impl Into<String>, qty: i64, price: Decimal) -> TpResult<Self> {
        let symbol = symbol.into();
        if symbol.is_empty() {
            return Err(OrderError::EmptySymbol.into());
        }
        if qty <= 0 {
            return Err(OrderError::InvalidQty { qty: qty.to_string() }.into());
        }
        if price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice {
                price: price.to_string(),
            }
            .into());
        }
        Ok(Self {
            side,
            symbol: symbol.to_ascii_uppercase(),
            qty,
            price,
            ts: None,
            id: None,
        })
    }

    /// Spec §4.A: `Order::from_map(dict)` rejects missing fields, non-positive
    /// qty/price, and unknown sides; `ts`/`id` are taken from the map if
    /// present, otherwise left `None` for the order manager to stamp later.
    pub fn from_map(map: &HashMap<String, Value>) -> TpResult<Self> {
        let side_raw = map
            .get("side")
            .and_then(Value::as_str)
            .ok_or(OrderError::MissingField { field: "side" })?;
        let side = Side::parse(side_raw).ok_or_else(|| OrderError::InvalidSide {
            side: side_raw.to_string(),
        })?;

        let symbol = map
            .get("symbol")
            .and_then(Value::as_str)
            .ok_or(OrderError::MissingField { field: "symbol" })?
            .trim()
            .to_ascii_uppercase();
        if symbol.is_empty() {
            return Err(OrderError::EmptySymbol.into());
        }

        let qty = map
            .get("qty")
            .and_then(Value::as_i64)
            .ok_or(OrderError::MissingField { field: "qty" })?;
        if qty <= 0 {
            return Err(OrderError::InvalidQty { qty: qty.to_string() }.into());
        }

        let price = map
            .get("price")
            .and_then(Value::as_f64)
            .and_then(Decimal::from_f64_retain)
            .ok_or(OrderError::MissingField { field: "price" })?;
        if price <= Decimal::ZERO {
            return Err(OrderError::InvalidPrice {
                price: price.to_string(),
            }
            .into());
        }

        let ts = map
            .get("ts")
            .and_then(Value::as_f64)
            .and_then(|secs| DateTime::from_timestamp(secs as i64, 0));
        let id = map.get("id").and_then(Value::as_u64);

        Ok(Self {
            side,
            symbol,
            qty,
            price,
            ts,
            id,
        })
    }

    pub fn to_map(&self) -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("side".into(), Value::from(self.side.to_string()));
        m.insert("symbol".into(), Value::from(self.symbol.clone()));
        m.insert("qty".into(), Value::from(self.qty));
        m.insert(
            "price".into(),
            Value::from(self.price.to_string().parse::<f64>().unwrap_or_default()),
        );
        if let Some(ts) = self.ts {
            m.insert("ts".into(), Value::from(ts.timestamp() as f64));
        }
        if let Some(id) = self.id {
            m.insert("id".into(), Value::from(id));
        }
        m
    }

    /// Stamp `ts`/`id` if absent — step 3 of the order manager's admission
    /// sequence (spec §4.F). A no-op on an already-stamped order.
    pub fn stamp_if_missing(&mut self, ts: DateTime<Utc>, id: u64) {
        if self.ts.is_none() {
            self.ts = Some(ts);
        }
        if self.id.is_none() {
            self.id = Some(id);
        }
    }

    /// True for pair-style symbols (e.g. `BTC/USD`) — the one crypto-specific
    /// branch the original broker-request projection special-cased.
    pub fn is_crypto_symbol(&self) -> bool {
        self.symbol.contains('/')
    }

    /// Projects the neutral fields a broker adapter needs (spec §4.A), without
    /// coupling this crate to any specific broker SDK.
    pub fn to_broker_request(&self) -> BrokerRequest {
        BrokerRequest {
            side: self.side,
            symbol: self.symbol.clone(),
            qty: self.qty,
            limit_price: Some(self.price),
            time_in_force: if self.is_crypto_symbol() {
                TimeInForce::FillOrKill
            } else {
                TimeInForce::Day
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeInForce {
    Day,
    GoodTilCancelled,
    FillOrKill,
}

/// The neutral projection of an `Order` a broker adapter translates into its
/// own native request type (spec §4.A/§6).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerRequest {
    pub side: Side,
    pub symbol: String,
    pub qty: i64,
    pub limit_price: Option<Decimal>,
    pub time_in_force: TimeInForce,
}

/// The execution outcome of an order (spec GLOSSARY "Fill").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub order_id: u64,
    pub symbol: String,
    pub side: Side,
    pub status: OrderStatus,
    pub filled_qty: i64,
    pub filled_price: Option<Decimal>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn valid_map() -> HashMap<String, Value> {
        let mut m = HashMap::new();
        m.insert("side".into(), Value::from("buy"));
        m.insert("symbol".into(), Value::from("aapl"));
        m.insert("qty".into(), Value::from(10));
        m.insert("price".into(), Value::from(170.5));
        m
    }

    #[test]
    fn from_map_canonicalizes_symbol_and_side() {
        let order = Order::from_map(&valid_map()).unwrap();
        assert_eq!(order.symbol, "AAPL");
        assert_eq!(order.side, Side::Buy);
        assert!(order.ts.is_none());
        assert!(order.id.is_none());
    }

    #[test]
    fn from_map_rejects_missing_field() {
        let mut m = valid_map();
        m.remove("qty");
        assert!(Order::from_map(&m).is_err());
    }

    #[test]
    fn from_map_rejects_non_positive_qty() {
        let mut m = valid_map();
        m.insert("qty".into(), Value::from(0));
        assert!(Order::from_map(&m).is_err());
    }

    #[test]
    fn from_map_rejects_unknown_side() {
        let mut m = valid_map();
        m.insert("side".into(), Value::from("HOLD"));
        assert!(Order::from_map(&m).is_err());
    }

    #[test]
    fn round_trip_from_map_to_map() {
        let order = Order::from_map(&valid_map()).unwrap();
        let back = Order::from_map(&order.to_map()).unwrap();
        assert_eq!(order.symbol, back.symbol);
        assert_eq!(order.side, back.side);
        assert_eq!(order.qty, back.qty);
        assert_eq!(order.price, back.price);
    }

    #[test]
    fn stamp_if_missing_only_fills_absent_fields() {
        let mut order = Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap();
        let ts = Utc::now();
        order.stamp_if_missing(ts, 7);
        assert_eq!(order.ts, Some(ts));
        assert_eq!(order.id, Some(7));

        order.stamp_if_missing(ts + chrono::Duration::seconds(1), 99);
        assert_eq!(order.id, Some(7), "existing id must not be overwritten");
    }

    #[test]
    fn crypto_symbol_routes_fok() {
        let order = Order::new(Side::Buy, "BTC/USD", 1, dec!(50000)).unwrap();
        let req = order.to_broker_request();
        assert_eq!(req.time_in_force, TimeInForce::FillOrKill);
    }

    #[test]
    fn equity_symbol_routes_day() {
        let order = Order::new(Side::Buy, "AAPL", 1, dec!(150)).unwrap();
        let req = order.to_broker_request();
        assert_eq!(req.time_in_force, TimeInForce::Day);
    }
}
