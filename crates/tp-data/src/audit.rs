//! Append-only order audit log.
//!
//! Every order event (submission, risk rejection, fill) is appended as one
//! row to a per-run CSV file under `order_audits/`, named with the run's
//! start time so successive runs never collide or overwrite each other.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use chrono::Utc;
use rust_decimal::Decimal;

use tp_types::{Order, OrderStatus, TpResult};

static RUN_ID: OnceLock<String> = OnceLock::new();

/// The run-scoped identifier used to name this process's audit file —
/// computed once, on first use.
pub fn run_id() -> &'static str {
    RUN_ID.get_or_init(|| Utc::now().format("%Y%m%d_%H%M%S").to_string())
}

fn default_audit_path() -> PathBuf {
    Path::new("order_audits").join(format!("order_audit_{}.csv", run_id()))
}

const FIELDS: [&str; 12] = [
    "event_time",
    "event_type",
    "id",
    "side",
    "symbol",
    "qty",
    "price",
    "ts",
    "status",
    "filled_qty",
    "filled_price",
    "note",
];

/// An append-only CSV audit trail for order lifecycle events.
pub struct AuditLog {
    path: PathBuf,
}

impl AuditLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The conventional per-run path: `order_audits/order_audit_<run_id>.csv`.
    pub fn for_current_run() -> Self {
        Self::new(default_audit_path())
    }

    /// Append one event row. Writes the header first if the file doesn't
    /// exist yet.
    #[allow(clippy::too_many_arguments)]
    pub fn log_order_event(
        &self,
        order: &Order,
        event_type: &str,
        status: Option<OrderStatus>,
        filled_qty: Option<i64>,
        filled_price: Option<Decimal>,
        note: &str,
    ) -> TpResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let needs_header = !self.path.exists();
        let file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(file);

        if needs_header {
            wtr.write_record(FIELDS)?;
        }

        wtr.write_record(&[
            Utc::now().to_rfc3339(),
            event_type.to_string(),
            order.id.map(|id| id.to_string()).unwrap_or_default(),
            order.side.to_string(),
            order.symbol.clone(),
            order.qty.to_string(),
            order.price.to_string(),
            order.ts.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
            status.map(|s| s.to_string()).unwrap_or_default(),
            filled_qty.map(|q| q.to_string()).unwrap_or_default(),
            filled_price.map(|p| p.to_string()).unwrap_or_default(),
            note.to_string(),
        ])?;
        wtr.flush()?;
        Ok(())
    }
}
