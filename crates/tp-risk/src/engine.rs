//! The simulated pre-trade risk engine.
//!
//! `check` is pure: it inspects the current book of positions/cash and
//! returns a verdict without touching state. `update_position` is the only
//! mutator, and the order manager calls it only after a fill actually comes
//! back from the matching engine — a rejected or cancelled order never moves
//! the ledger.

use std::collections::HashMap;
use std::sync::{Mutex, OnceLock};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tp_types::{Order, RiskError, Side};

#[derive(Debug, Clone, PartialEq)]
pub enum RiskCheckResult {
    Approved,
    Rejected(RiskError),
}

impl RiskCheckResult {
    pub fn is_approved(&self) -> bool {
        matches!(self, RiskCheckResult::Approved)
    }

    pub fn reason(&self) -> Option<&RiskError> {
        match self {
            RiskCheckResult::Rejected(err) => Some(err),
            RiskCheckResult::Approved => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskEngineConfig {
    pub max_order_size: i64,
    pub max_position: i64,
    pub max_total_buy: i64,
    pub max_total_sell: i64,
}

impl Default for RiskEngineConfig {
    fn default() -> Self {
        Self {
            max_order_size: 1_000,
            max_position: 10_000,
            max_total_buy: i64::MAX,
            max_total_sell: i64::MAX,
        }
    }
}

#[derive(Debug)]
struct RiskState {
    config: RiskEngineConfig,
    cash_balance: Decimal,
    positions: HashMap<String, i64>,
    buy_totals: HashMap<String, i64>,
    sell_totals: HashMap<String, i64>,
}

impl RiskState {
    fn check(&self, order: &Order) -> RiskCheckResult {
        if order.qty > self.config.max_order_size {
            warn!(
                symbol = %order.symbol,
                qty = order.qty,
                max = self.config.max_order_size,
                "risk: order size exceeded"
            );
            return RiskCheckResult::Rejected(RiskError::OrderSizeExceeded {
                qty: order.qty.to_string(),
                max: self.config.max_order_size.to_string(),
            });
        }

        let current = self.positions.get(&order.symbol).copied().unwrap_or(0);
        let delta = match order.side {
            Side::Buy => order.qty,
            Side::Sell => -order.qty,
        };
        let prospective = current + delta;
        if prospective.abs() > self.config.max_position {
            warn!(
                symbol = %order.symbol,
                current,
                prospective,
                max = self.config.max_position,
                "risk: position limit exceeded"
            );
            return RiskCheckResult::Rejected(RiskError::PositionLimitExceeded {
                current: current.to_string(),
                prospective: prospective.to_string(),
                max: self.config.max_position.to_string(),
            });
        }

        match order.side {
            Side::Buy => {
                let prospective_total = self.buy_totals.get(&order.symbol).copied().unwrap_or(0) + order.qty;
                if prospective_total > self.config.max_total_buy {
                    warn!(symbol = %order.symbol, total = prospective_total, max = self.config.max_total_buy, "risk: total buy exceeded");
                    return RiskCheckResult::Rejected(RiskError::TotalBuyExceeded {
                        symbol: order.symbol.clone(),
                        current: prospective_total.to_string(),
                        max: self.config.max_total_buy.to_string(),
                    });
                }

                let notional = Decimal::from(order.qty) * order.price;
                if notional > self.cash_balance {
                    warn!(symbol = %order.symbol, notional = %notional, cash = %self.cash_balance, "risk: insufficient cash");
                    return RiskCheckResult::Rejected(RiskError::InsufficientCash {
                        cash: self.cash_balance.to_string(),
                    });
                }
            }
            Side::Sell => {
                let prospective_total = self.sell_totals.get(&order.symbol).copied().unwrap_or(0) + order.qty;
                if prospective_total > self.config.max_total_sell {
                    warn!(symbol = %order.symbol, total = prospective_total, max = self.config.max_total_sell, "risk: total sell exceeded");
                    return RiskCheckResult::Rejected(RiskError::TotalSellExceeded {
                        symbol: order.symbol.clone(),
                        current: prospective_total.to_string(),
                        max: self.config.max_total_sell.to_string(),
                    });
                }
            }
        }

        RiskCheckResult::Approved
    }

    fn update_position(&mut self, order: &Order, filled_qty: i64) {
        if filled_qty <= 0 {
            return;
        }
        let notional = Decimal::from(filled_qty) * order.price;
        let entry = self.positions.entry(order.symbol.clone()).or_insert(0);
        match order.side {
            Side::Buy => {
                *entry += filled_qty;
                self.cash_balance -= notional;
                *self.buy_totals.entry(order.symbol.clone()).or_insert(0) += filled_qty;
            }
            Side::Sell => {
                *entry -= filled_qty;
                self.cash_balance += notional;
                *self.sell_totals.entry(order.symbol.clone()).or_insert(0) += filled_qty;
            }
        }
    }
}

/// Process-wide pre-trade risk engine. Every order passes through the same
/// instance so position/cash/cumulative limits are enforced globally.
#[derive(Debug)]
pub struct RiskEngine {
    state: Mutex<RiskState>,
}

static INSTANCE: OnceLock<RiskEngine> = OnceLock::new();

impl RiskEngine {
    /// Access the process-wide singleton, initializing it with `config`/
    /// `starting_cash` on the first call. Later calls ignore the arguments
    /// and return the already-initialized instance — callers that need a
    /// fresh, isolated engine (tests, parameter sweeps) should use
    /// [`RiskEngine::new`] instead.
    pub fn global(config: RiskEngineConfig, starting_cash: Decimal) -> &'static RiskEngine {
        INSTANCE.get_or_init(|| RiskEngine::new(config, starting_cash))
    }

    pub fn new(config: RiskEngineConfig, starting_cash: Decimal) -> Self {
        Self {
            state: Mutex::new(RiskState {
                config,
                cash_balance: starting_cash,
                positions: HashMap::new(),
                buy_totals: HashMap::new(),
                sell_totals: HashMap::new(),
            }),
        }
    }

    /// Pure pre-trade check, never mutates state.
    pub fn check(&self, order: &Order) -> RiskCheckResult {
        self.state.lock().unwrap().check(order)
    }

    /// Records the effect of a fill. Only call this once execution actually
    /// reports a filled or partially filled quantity.
    pub fn update_position(&self, order: &Order, filled_qty: i64) {
        self.state.lock().unwrap().update_position(order, filled_qty);
    }

    pub fn cash_balance(&self) -> Decimal {
        self.state.lock().unwrap().cash_balance
    }

    pub fn position(&self, symbol: &str) -> i64 {
        self.state
            .lock()
            .unwrap()
            .positions
            .get(symbol)
            .copied()
            .unwrap_or(0)
    }
}
