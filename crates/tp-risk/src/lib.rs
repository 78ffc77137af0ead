//! Pre-trade risk engine for the simulated trading pipeline.
//!
//! A single [`RiskEngine`] instance gates every order before it reaches the
//! matching engine: it checks order size, position limits, available cash,
//! and cumulative buy/sell notional, then — only once a fill actually comes
//! back — records the resulting position and cash movement.

pub mod engine;

pub use engine::{RiskCheckResult, RiskEngine, RiskEngineConfig};
