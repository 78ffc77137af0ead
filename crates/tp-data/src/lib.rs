//! Market-data ingestion and order audit logging.
//!
//! [`gateway`] reads the CSV bar files the backtester and live feed both
//! consume; [`audit`] is the append-only log every order event is written to.

pub mod audit;
pub mod gateway;

pub use audit::AuditLog;
pub use gateway::{load_market_data, MarketDataIter};
