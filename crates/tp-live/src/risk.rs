//! Live-broker risk variant.
//!
//! Shares the logical `check` contract with [`tp_risk::RiskEngine`] but backs
//! its decisions with the broker's own view of cash and positions instead of
//! an in-process ledger — the live path never keeps a second set of books.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;

use tp_types::{Order, RiskError, Side};

use crate::broker::{Broker, BrokerResult};

pub use tp_risk::RiskCheckResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiveRiskConfig {
    pub max_order_notional: Decimal,
    /// Cap on `|position value| / equity` for a single symbol.
    pub max_position_pct_equity: Decimal,
}

impl Default for LiveRiskConfig {
    fn default() -> Self {
        Self {
            max_order_notional: Decimal::from(100_000),
            max_position_pct_equity: Decimal::new(25, 2), // 25%
        }
    }
}

pub struct LiveRiskEngine<'b> {
    broker: &'b dyn Broker,
    config: LiveRiskConfig,
}

impl<'b> LiveRiskEngine<'b> {
    pub fn new(broker: &'b dyn Broker, config: LiveRiskConfig) -> Self {
        Self { broker, config }
    }

    /// Queries the broker for cash/positions and checks the per-order
    /// notional cap and the per-symbol concentration cap. A broker request
    /// failure is an I/O error, not a risk rejection — it propagates via `?`.
    pub async fn check(&self, order: &Order) -> BrokerResult<RiskCheckResult> {
        let notional = Decimal::from(order.qty) * order.price;
        if notional > self.config.max_order_notional {
            warn!(symbol = %order.symbol, notional = %notional, max = %self.config.max_order_notional, "live risk: order notional exceeded");
            return Ok(RiskCheckResult::Rejected(RiskError::NotionalCapExceeded {
                notional: notional.to_string(),
                max: self.config.max_order_notional.to_string(),
            }));
        }

        let account = self.broker.get_account().await?;
        if account.equity <= Decimal::ZERO {
            return Ok(RiskCheckResult::Approved);
        }

        let existing_value = self
            .broker
            .get_open_position(&order.symbol)
            .await?
            .map(|p| p.market_value)
            .unwrap_or(Decimal::ZERO);
        let delta = match order.side {
            Side::Buy => notional,
            Side::Sell => -notional,
        };
        let prospective_pct = (existing_value + delta).abs() / account.equity;

        if prospective_pct > self.config.max_position_pct_equity {
            warn!(symbol = %order.symbol, pct = %prospective_pct, max = %self.config.max_position_pct_equity, "live risk: concentration cap exceeded");
            return Ok(RiskCheckResult::Rejected(RiskError::ConcentrationExceeded {
                symbol: order.symbol.clone(),
                pct: (prospective_pct * Decimal::from(100)).to_string(),
            }));
        }

        Ok(RiskCheckResult::Approved)
    }
}
