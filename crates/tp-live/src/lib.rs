//! Live execution path: a broker abstraction thin enough to swap in a real
//! brokerage SDK, a paper-trading implementation of it, a broker-backed risk
//! variant, and the placeholder market-hours guard that gates non-crypto
//! orders outside a naive trading session.

pub mod broker;
pub mod market_hours;
pub mod paper;
pub mod risk;

pub use broker::{AccountInfo, Broker, BrokerError, BrokerResult, ExecutionReport, PositionInfo};
pub use market_hours::is_market_open;
pub use paper::{PaperBroker, PaperBrokerConfig};
pub use risk::{LiveRiskConfig, LiveRiskEngine, RiskCheckResult};
