//! CSV market-data gateway.
//!
//! Reads bar files with the header `Datetime,Open,High,Low,Close,Volume,Symbol`
//! and streams them out as [`MarketDataPoint`]s, closing price only. Rows with
//! missing or unparseable fields are logged and skipped rather than aborting
//! the whole run.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::warn;

use tp_types::{DataError, MarketDataPoint, TpResult};

#[derive(Debug, Deserialize)]
struct MarketDataRow {
    #[serde(rename = "Datetime")]
    datetime: String,
    #[serde(rename = "Open")]
    #[allow(dead_code)]
    open: Decimal,
    #[serde(rename = "High")]
    #[allow(dead_code)]
    high: Decimal,
    #[serde(rename = "Low")]
    #[allow(dead_code)]
    low: Decimal,
    #[serde(rename = "Close")]
    close: Decimal,
    #[serde(rename = "Volume")]
    #[allow(dead_code)]
    volume: Decimal,
    #[serde(rename = "Symbol")]
    symbol: String,
}

/// Accepts both `2024-01-02 09:30:00` and `2024-01-02T09:30:00`-style
/// timestamps, with or without fractional seconds.
fn parse_timestamp(raw: &str) -> TpResult<DateTime<Utc>> {
    let normalized = raw.trim().replacen('T', " ", 1);
    NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(&normalized, "%Y-%m-%d %H:%M:%S%.f"))
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            DataError::ParseError {
                message: format!("unparseable timestamp '{raw}': {e}"),
            }
            .into()
        })
}

fn build_point(row: MarketDataRow) -> TpResult<MarketDataPoint> {
    let timestamp = parse_timestamp(&row.datetime)?;
    MarketDataPoint::new(timestamp, row.symbol, row.close)
}

/// Streams [`MarketDataPoint`]s out of a CSV reader, skipping rows that fail
/// to parse or fail `MarketDataPoint` validation.
pub struct MarketDataIter<R> {
    records: csv::DeserializeRecordsIntoIter<R, MarketDataRow>,
}

impl<R: std::io::Read> Iterator for MarketDataIter<R> {
    type Item = MarketDataPoint;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let row = match self.records.next()? {
                Ok(row) => row,
                Err(e) => {
                    warn!(error = %e, "skipping unparseable market data row");
                    continue;
                }
            };
            match build_point(row) {
                Ok(point) => return Some(point),
                Err(e) => {
                    warn!(error = %e, "skipping invalid market data row");
                    continue;
                }
            }
        }
    }
}

/// Opens a CSV bar file for streaming reads.
pub fn load_market_data(path: impl AsRef<Path>) -> TpResult<MarketDataIter<File>> {
    let file = File::open(path)?;
    let reader = csv::ReaderBuilder::new().has_headers(true).from_reader(file);
    Ok(MarketDataIter {
        records: reader.into_deserialize(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_csv(contents: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_valid_rows() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02 09:30:00,100,101,99,100.5,1000,AAPL\n\
             2024-01-02 09:31:00,100.5,102,100,101.2,1200,AAPL\n",
        );
        let points: Vec<_> = load_market_data(f.path()).unwrap().collect();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].symbol, "AAPL");
        assert_eq!(points[1].price.to_string(), "101.2");
    }

    #[test]
    fn accepts_t_separated_timestamp() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02T09:30:00,100,101,99,100.5,1000,AAPL\n",
        );
        let points: Vec<_> = load_market_data(f.path()).unwrap().collect();
        assert_eq!(points.len(), 1);
    }

    #[test]
    fn skips_rows_with_missing_fields() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02 09:30:00,100,101,99,100.5,1000,AAPL\n\
             ,,,,,,\n\
             2024-01-02 09:31:00,100.5,102,100,101.2,1200,AAPL\n",
        );
        let points: Vec<_> = load_market_data(f.path()).unwrap().collect();
        assert_eq!(points.len(), 2);
    }

    #[test]
    fn skips_rows_with_non_positive_price() {
        let f = write_csv(
            "Datetime,Open,High,Low,Close,Volume,Symbol\n\
             2024-01-02 09:30:00,100,101,99,0,1000,AAPL\n\
             2024-01-02 09:31:00,100.5,102,100,101.2,1200,AAPL\n",
        );
        let points: Vec<_> = load_market_data(f.path()).unwrap().collect();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].price.to_string(), "101.2");
    }
}
