//! Paper (simulated) broker for the live code path with no external
//! dependencies — a stand-in when exercising the live order-manager branch
//! without a real brokerage connection.

use std::collections::HashMap;

use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::info;

use async_trait::async_trait;
use tp_types::{Order, OrderStatus, Side};

use crate::broker::{AccountInfo, Broker, BrokerResult, ExecutionReport, PositionInfo};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PaperBrokerConfig {
    pub initial_cash: Decimal,
    pub commission_per_share: Decimal,
    /// Simulated slippage as a fraction of price (e.g. 0.0005 = 0.05%).
    pub slippage_bps: Decimal,
}

impl Default for PaperBrokerConfig {
    fn default() -> Self {
        Self {
            initial_cash: Decimal::from(100_000),
            commission_per_share: Decimal::new(1, 2),
            slippage_bps: Decimal::new(5, 4),
        }
    }
}

#[derive(Debug)]
struct PaperState {
    cash: Decimal,
    positions: HashMap<String, (i64, Decimal)>,
    latest_prices: HashMap<String, Decimal>,
}

/// A fully in-process broker that fills every order immediately against its
/// own price, with slippage and commission applied.
#[derive(Debug)]
pub struct PaperBroker {
    config: PaperBrokerConfig,
    state: Mutex<PaperState>,
}

impl PaperBroker {
    pub fn new(config: PaperBrokerConfig) -> Self {
        Self {
            state: Mutex::new(PaperState {
                cash: config.initial_cash,
                positions: HashMap::new(),
                latest_prices: HashMap::new(),
            }),
            config,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PaperBrokerConfig::default())
    }

    /// Feed a reference price for a symbol — orders with no known price fall
    /// back to their own limit price.
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.state.lock().latest_prices.insert(symbol.to_string(), price);
    }

    pub fn cash(&self) -> Decimal {
        self.state.lock().cash
    }
}

#[async_trait]
impl Broker for PaperBroker {
    async fn submit(&self, order: &Order) -> BrokerResult<ExecutionReport> {
        let mut state = self.state.lock();
        let market_price = state
            .latest_prices
            .get(&order.symbol)
            .copied()
            .unwrap_or(order.price);

        let slip = market_price * self.config.slippage_bps;
        let fill_price = match order.side {
            Side::Buy => market_price + slip,
            Side::Sell => market_price - slip,
        };
        let qty = Decimal::from(order.qty);
        let commission = qty * self.config.commission_per_share;

        match order.side {
            Side::Buy => {
                let cost = qty * fill_price + commission;
                if cost > state.cash {
                    info!(symbol = %order.symbol, cost = %cost, cash = %state.cash, "paper broker: rejected for insufficient cash");
                    return Ok(ExecutionReport {
                        status: OrderStatus::Rejected,
                        filled_qty: 0,
                        filled_avg_price: None,
                    });
                }
                state.cash -= cost;
            }
            Side::Sell => {
                state.cash += qty * fill_price - commission;
            }
        }

        let entry = state
            .positions
            .entry(order.symbol.clone())
            .or_insert((0, Decimal::ZERO));
        match order.side {
            Side::Buy => {
                let (held_qty, held_avg) = *entry;
                let total_cost = Decimal::from(held_qty) * held_avg + qty * fill_price;
                let new_qty = held_qty + order.qty;
                let new_avg = if new_qty > 0 {
                    total_cost / Decimal::from(new_qty)
                } else {
                    Decimal::ZERO
                };
                *entry = (new_qty, new_avg);
            }
            Side::Sell => {
                let (held_qty, held_avg) = *entry;
                let new_qty = held_qty - order.qty;
                *entry = if new_qty <= 0 {
                    (0, Decimal::ZERO)
                } else {
                    (new_qty, held_avg)
                };
            }
        }

        info!(
            symbol = %order.symbol,
            side = %order.side,
            qty = order.qty,
            price = %fill_price,
            "paper broker: order filled"
        );

        Ok(ExecutionReport {
            status: OrderStatus::Filled,
            filled_qty: order.qty,
            filled_avg_price: Some(fill_price),
        })
    }

    async fn get_account(&self) -> BrokerResult<AccountInfo> {
        let state = self.state.lock();
        let position_value: Decimal = state
            .positions
            .iter()
            .map(|(symbol, (qty, avg))| {
                let price = state.latest_prices.get(symbol).copied().unwrap_or(*avg);
                Decimal::from(*qty) * price
            })
            .sum();
        let equity = state.cash + position_value;
        Ok(AccountInfo {
            cash: state.cash,
            equity,
            buying_power: state.cash,
        })
    }

    async fn get_open_position(&self, symbol: &str) -> BrokerResult<Option<PositionInfo>> {
        let state = self.state.lock();
        Ok(state.positions.get(symbol).and_then(|(qty, avg)| {
            if *qty == 0 {
                return None;
            }
            let price = state.latest_prices.get(symbol).copied().unwrap_or(*avg);
            Some(PositionInfo {
                qty: *qty,
                market_value: Decimal::from(*qty) * price,
            })
        }))
    }

    async fn get_all_positions(&self) -> BrokerResult<Vec<(String, PositionInfo)>> {
        let state = self.state.lock();
        Ok(state
            .positions
            .iter()
            .filter(|(_, (qty, _))| *qty != 0)
            .map(|(symbol, (qty, avg))| {
                let price = state.latest_prices.get(symbol).copied().unwrap_or(*avg);
                (
                    symbol.clone(),
                    PositionInfo {
                        qty: *qty,
                        market_value: Decimal::from(*qty) * price,
                    },
                )
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn order(side: Side, qty: i64, price: Decimal) -> Order {
        Order::new(side, "AAPL", qty, price).unwrap()
    }

    #[tokio::test]
    async fn market_buy_fills_and_moves_cash() {
        let broker = PaperBroker::with_defaults();
        broker.set_price("AAPL", dec!(150));

        let report = broker.submit(&order(Side::Buy, 10, dec!(150))).await.unwrap();
        assert_eq!(report.status, OrderStatus::Filled);
        assert_eq!(report.filled_qty, 10);
        assert!(broker.cash() < dec!(100_000));
    }

    #[tokio::test]
    async fn rejects_when_cash_insufficient() {
        let broker = PaperBroker::new(PaperBrokerConfig {
            initial_cash: dec!(100),
            ..Default::default()
        });
        broker.set_price("AAPL", dec!(150));

        let report = broker.submit(&order(Side::Buy, 10, dec!(150))).await.unwrap();
        assert_eq!(report.status, OrderStatus::Rejected);
        assert_eq!(report.filled_qty, 0);
    }

    #[tokio::test]
    async fn tracks_position_across_buy_and_sell() {
        let broker = PaperBroker::with_defaults();
        broker.set_price("AAPL", dec!(150));

        broker.submit(&order(Side::Buy, 10, dec!(150))).await.unwrap();
        let pos = broker.get_open_position("AAPL").await.unwrap().unwrap();
        assert_eq!(pos.qty, 10);

        broker.submit(&order(Side::Sell, 10, dec!(150))).await.unwrap();
        let pos = broker.get_open_position("AAPL").await.unwrap();
        assert!(pos.is_none());
    }

    #[tokio::test]
    async fn get_all_positions_excludes_flat_symbols() {
        let broker = PaperBroker::with_defaults();
        broker.set_price("AAPL", dec!(150));
        broker.submit(&order(Side::Buy, 10, dec!(150))).await.unwrap();
        broker.submit(&order(Side::Sell, 10, dec!(150))).await.unwrap();

        let positions = broker.get_all_positions().await.unwrap();
        assert!(positions.is_empty());
    }

    #[tokio::test]
    async fn account_equity_reflects_open_position() {
        let broker = PaperBroker::with_defaults();
        broker.set_price("AAPL", dec!(150));
        broker.submit(&order(Side::Buy, 10, dec!(150))).await.unwrap();

        broker.set_price("AAPL", dec!(160));
        let account = broker.get_account().await.unwrap();
        assert!(account.equity > dec!(100_000));
    }
}
