//! Order manager: sequences validation, risk checks, execution, accounting,
//! and audit logging for a single order (spec §4.F).
//!
//! `process_order` is the one public operation. It never retries, never
//! modifies an order in flight, and never cancels except as directed by the
//! execution outcome — out-of-band cancel/modify would be a separate
//! operation this design doesn't define.

use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use rand::RngCore;
use rust_decimal::Decimal;

use tp_data::audit::AuditLog;
use tp_live::{Broker, LiveRiskConfig, LiveRiskEngine};
use tp_risk::{RiskCheckResult, RiskEngine};
use tp_types::{Order, OrderStatus, Side, TpResult};

use crate::matching::{self, ExecutionOutcome};

/// The result handed back from `process_order`. Mirrors the
/// `{ok, status, order, filled_qty, filled_price}` shape from spec §4.F, with
/// failures carrying a short reason instead of `ok: true` fields. `Failed`
/// is the spec §7 `IOError` case — a broker communication failure, not a
/// risk rejection — and propagates to the caller rather than being silently
/// treated as approved.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessResult {
    Rejected { msg: String },
    Failed { error: String },
    Processed {
        status: OrderStatus,
        order: Order,
        filled_qty: i64,
        filled_price: Option<Decimal>,
    },
}

impl ProcessResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, ProcessResult::Processed { .. })
    }
}

fn basic_validate(order: &Order) -> Option<String> {
    if order.qty <= 0 {
        return Some("Quantity must be > 0".to_string());
    }
    if order.price <= Decimal::ZERO {
        return Some("Price must be > 0".to_string());
    }
    None
}

/// The execution venue an order manager drives: a local simulator, or a
/// live broker behind the neutral [`Broker`] trait.
pub enum ExecutionVenue<'b> {
    Simulated { rng: Box<dyn RngCore + Send> },
    Live { broker: &'b dyn Broker, risk: LiveRiskEngine<'b> },
}

/// Orchestrates the fixed validate -> risk -> execute -> accounting -> audit
/// sequence. Holds its own monotonic order-id counter and a running list of
/// orders that reached a fill (spec §3: "Append to `self.orders` on any
/// fill").
pub struct OrderManager<'b> {
    risk: &'b RiskEngine,
    audit: AuditLog,
    venue: ExecutionVenue<'b>,
    next_order_id: AtomicU64,
    pub orders: Vec<Order>,
}

impl<'b> OrderManager<'b> {
    pub fn new_simulated(risk: &'b RiskEngine, audit: AuditLog, rng: Box<dyn RngCore + Send>) -> Self {
        Self {
            risk,
            audit,
            venue: ExecutionVenue::Simulated { rng },
            next_order_id: AtomicU64::new(1),
            orders: Vec::new(),
        }
    }

    pub fn new_live(risk: &'b RiskEngine, audit: AuditLog, broker: &'b dyn Broker, live_risk_config: LiveRiskConfig) -> Self {
        Self {
            risk,
            audit,
            venue: ExecutionVenue::Live {
                broker,
                risk: LiveRiskEngine::new(broker, live_risk_config),
            },
            next_order_id: AtomicU64::new(1),
            orders: Vec::new(),
        }
    }

    fn next_id(&self) -> u64 {
        self.next_order_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Dumps every order that has reached a fill to a flat CSV, distinct from
    /// the per-event audit log (a supplemental feature carried over from the
    /// original order manager's explicit orders dump).
    pub fn export_orders_csv(&self, path: impl AsRef<std::path::Path>) -> TpResult<()> {
        let mut wtr = csv::Writer::from_path(path)?;
        for order in &self.orders {
            wtr.serialize(order)?;
        }
        wtr.flush()?;
        Ok(())
    }

    /// The fixed 10-step sequence from spec §4.F.
    pub fn process_order(&mut self, mut order: Order) -> ProcessResult {
        // 1. Basic validation.
        if let Some(msg) = basic_validate(&order) {
            return ProcessResult::Rejected { msg };
        }

        // 2. (Live path only) reject non-crypto symbols while the market is
        // closed. Checked before stamping so a rejection never consumes an id.
        if matches!(self.venue, ExecutionVenue::Live { .. })
            && !order.is_crypto_symbol()
            && !tp_live::is_market_open(Utc::now())
        {
            self.audit
                .log_order_event(&order, "rejected", None, None, None, "market_closed")
                .ok();
            return ProcessResult::Rejected {
                msg: "market_closed".to_string(),
            };
        }

        // 3. Stamp ts/id if missing.
        order.stamp_if_missing(Utc::now(), self.next_id());

        // 4. Audit "sent".
        self.audit.log_order_event(&order, "sent", None, None, None, "").ok();

        // 5. Risk check. A broker communication failure here is an IOError
        // (spec §7), not a risk rejection, and propagates rather than being
        // treated as approved.
        let risk_result = match &self.venue {
            ExecutionVenue::Simulated { .. } => self.risk.check(&order),
            ExecutionVenue::Live { risk, .. } => {
                let outcome = match tokio::runtime::Handle::try_current() {
                    Ok(h) => tokio::task::block_in_place(|| h.block_on(risk.check(&order))),
                    Err(_) => tokio::runtime::Runtime::new()
                        .expect("failed to start blocking runtime for live risk check")
                        .block_on(risk.check(&order)),
                };
                match outcome {
                    Ok(r) => r,
                    Err(e) => {
                        self.audit
                            .log_order_event(&order, "rejected", None, None, None, "broker_io_error")
                            .ok();
                        return ProcessResult::Failed { error: e.to_string() };
                    }
                }
            }
        };
        if let RiskCheckResult::Rejected(reason) = risk_result {
            self.audit
                .log_order_event(&order, "rejected", None, None, None, "risk_check_failed")
                .ok();
            return ProcessResult::Rejected {
                msg: format!("risk_check_failed: {reason}"),
            };
        }

        // 6. Execute. A broker communication failure here is likewise an
        // IOError that propagates to the driver rather than a fabricated
        // rejection.
        let outcome = match &mut self.venue {
            ExecutionVenue::Simulated { rng } => matching::simulate_execution(&order, rng.as_mut()),
            ExecutionVenue::Live { broker, .. } => {
                let report = match tokio::runtime::Handle::try_current() {
                    Ok(h) => tokio::task::block_in_place(|| h.block_on(broker.submit(&order))),
                    Err(_) => tokio::runtime::Runtime::new()
                        .expect("failed to start blocking runtime for broker submit")
                        .block_on(broker.submit(&order)),
                };
                match report {
                    Ok(r) => ExecutionOutcome {
                        status: r.status,
                        qty: r.filled_qty,
                        price: r.filled_avg_price,
                    },
                    Err(e) => {
                        self.audit
                            .log_order_event(&order, "rejected", None, None, None, "broker_io_error")
                            .ok();
                        return ProcessResult::Failed { error: e.to_string() };
                    }
                }
            }
        };

        // 7. Build the filled-order view.
        let filled_qty = outcome.qty;
        let filled_price = outcome.price;

        // 8. Simulated mode applies risk accounting here; live mode delegates
        // to the broker's own books.
        if matches!(self.venue, ExecutionVenue::Simulated { .. })
            && matches!(outcome.status, OrderStatus::Filled | OrderStatus::Partial)
            && filled_qty > 0
        {
            self.risk.update_position(&order, filled_qty);
        }

        // 9. Append to orders on any fill; audit the terminal event.
        match outcome.status {
            OrderStatus::Cancelled => {
                self.audit
                    .log_order_event(&order, "cancelled", Some(outcome.status), Some(0), None, "")
                    .ok();
            }
            OrderStatus::Partial => {
                self.orders.push(order.clone());
                self.audit
                    .log_order_event(&order, "partial", Some(outcome.status), Some(filled_qty), filled_price, "")
                    .ok();
            }
            OrderStatus::Filled => {
                self.orders.push(order.clone());
                self.audit
                    .log_order_event(&order, "filled", Some(outcome.status), Some(filled_qty), filled_price, "")
                    .ok();
            }
            OrderStatus::Rejected => {
                self.audit
                    .log_order_event(&order, "rejected", Some(outcome.status), None, None, "broker_rejected")
                    .ok();
            }
        }

        // 10. Return.
        ProcessResult::Processed {
            status: outcome.status,
            order,
            filled_qty,
            filled_price,
        }
    }
}

/// Builds an order from a signal: qty from the strategy's position size,
/// price from the signal, side from the signal's action (spec §4.H step 3).
pub fn order_from_signal(side: Side, symbol: &str, qty: i64, price: Decimal) -> Order {
    Order::new(side, symbol, qty, price).expect("signal-derived orders are always well-formed")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rust_decimal_macros::dec;
    use tp_risk::RiskEngineConfig;

    fn manager(risk: &RiskEngine, dir: &std::path::Path) -> OrderManager<'_> {
        let audit = AuditLog::new(dir.join("audit.csv"));
        OrderManager::new_simulated(risk, audit, Box::new(ChaCha8Rng::seed_from_u64(1)))
    }

    #[test]
    fn rejects_non_positive_qty_without_touching_risk() {
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(100_000));
        let dir = tempfile::tempdir().unwrap();
        let mut om = manager(&risk, dir.path());
        let order = Order {
            side: Side::Buy,
            symbol: "AAPL".to_string(),
            qty: 0,
            price: dec!(100),
            ts: None,
            id: None,
        };
        let result = om.process_order(order);
        assert!(!result.is_ok());
    }

    #[test]
    fn risk_rejection_returns_failure_without_fill() {
        let risk = RiskEngine::new(
            RiskEngineConfig {
                max_order_size: 1,
                ..Default::default()
            },
            dec!(100_000),
        );
        let dir = tempfile::tempdir().unwrap();
        let mut om = manager(&risk, dir.path());
        let order = Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap();
        let result = om.process_order(order);
        match result {
            ProcessResult::Rejected { msg } => assert!(msg.contains("risk_check_failed")),
            _ => panic!("expected rejection"),
        }
    }

    #[test]
    fn successful_order_stamps_ts_and_id() {
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(1_000_000));
        let dir = tempfile::tempdir().unwrap();
        let mut om = manager(&risk, dir.path());
        let order = Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap();
        let result = om.process_order(order);
        match result {
            ProcessResult::Processed { order, .. } => {
                assert!(order.ts.is_some());
                assert!(order.id.is_some());
            }
            ProcessResult::Rejected { msg } => panic!("unexpected rejection: {msg}"),
            ProcessResult::Failed { error } => panic!("unexpected failure: {error}"),
        }
    }

    struct UnreachableBroker;

    #[async_trait::async_trait]
    impl Broker for UnreachableBroker {
        async fn submit(&self, _order: &Order) -> tp_live::BrokerResult<tp_live::ExecutionReport> {
            Err(tp_live::BrokerError::RequestFailed {
                message: "connection refused".to_string(),
            })
        }
        async fn get_account(&self) -> tp_live::BrokerResult<tp_live::AccountInfo> {
            Err(tp_live::BrokerError::RequestFailed {
                message: "connection refused".to_string(),
            })
        }
        async fn get_open_position(&self, _symbol: &str) -> tp_live::BrokerResult<Option<tp_live::PositionInfo>> {
            Err(tp_live::BrokerError::RequestFailed {
                message: "connection refused".to_string(),
            })
        }
        async fn get_all_positions(&self) -> tp_live::BrokerResult<Vec<(String, tp_live::PositionInfo)>> {
            Err(tp_live::BrokerError::RequestFailed {
                message: "connection refused".to_string(),
            })
        }
    }

    #[test]
    fn live_venue_propagates_broker_io_failure_instead_of_approving() {
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(1_000_000));
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.csv"));
        let broker = UnreachableBroker;
        let mut om = OrderManager::new_live(&risk, audit, &broker, tp_live::LiveRiskConfig::default());

        let order = Order::new(Side::Buy, "BTC/USD", 1, dec!(100)).unwrap();
        let result = om.process_order(order);
        match result {
            ProcessResult::Failed { error } => assert!(error.contains("connection refused")),
            other => panic!("expected a broker IOError to propagate as Failed, got {other:?}"),
        }
    }

    #[test]
    fn fill_triggers_risk_accounting() {
        // Seed chosen to land in the always-FILLED branch (u >= 0.7).
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(1_000_000));
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.csv"));
        let mut om = OrderManager::new_simulated(&risk, audit, Box::new(ChaCha8Rng::seed_from_u64(123)));

        let before_cash = risk.cash_balance();
        let order = Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap();
        let result = om.process_order(order);
        if let ProcessResult::Processed { status, filled_qty, .. } = result {
            if matches!(status, OrderStatus::Filled | OrderStatus::Partial) {
                assert!(risk.cash_balance() < before_cash);
                assert!(filled_qty > 0);
            }
        }
    }

    #[test]
    fn export_orders_csv_writes_one_row_per_filled_order() {
        // Seed chosen to land in the always-FILLED branch (u >= 0.7), same as
        // fill_triggers_risk_accounting.
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(1_000_000));
        let dir = tempfile::tempdir().unwrap();
        let audit = AuditLog::new(dir.path().join("audit.csv"));
        let mut om = OrderManager::new_simulated(&risk, audit, Box::new(ChaCha8Rng::seed_from_u64(123)));
        om.process_order(Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap());

        let out_path = dir.path().join("orders.csv");
        om.export_orders_csv(&out_path).unwrap();
        let contents = std::fs::read_to_string(&out_path).unwrap();
        assert_eq!(contents.lines().count(), om.orders.len() + 1);
    }

    #[test]
    fn cancelled_outcome_does_not_mutate_risk_state() {
        let risk = RiskEngine::new(RiskEngineConfig::default(), dec!(1_000_000));
        let before_cash = risk.cash_balance();
        let before_position = risk.position("AAPL");
        let dir = tempfile::tempdir().unwrap();
        // Try several seeds and assert the invariant whenever a cancel occurs.
        for seed in 0..30 {
            let audit = AuditLog::new(dir.path().join(format!("audit_{seed}.csv")));
            let mut om = OrderManager::new_simulated(&risk, audit, Box::new(ChaCha8Rng::seed_from_u64(seed)));
            let order = Order::new(Side::Buy, "AAPL", 10, dec!(100)).unwrap();
            if let ProcessResult::Processed { status, .. } = om.process_order(order) {
                if status == OrderStatus::Cancelled {
                    assert_eq!(risk.cash_balance(), before_cash);
                    assert_eq!(risk.position("AAPL"), before_position);
                    return;
                }
            }
        }
    }
}
