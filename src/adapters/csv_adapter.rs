//! CSV quote snapshot adapter.
//!
//! Reads `symbol,price,volume[,open,high,low,close,timestamp]` rows from a
//! file that some external process keeps current. The file is re-read on
//! every call so each tick sees the latest snapshot.

use crate::domain::error::TraderError;
use crate::domain::symbol::Quote;
use crate::ports::market_data_port::MarketDataPort;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::str::FromStr;
use tracing::warn;

pub struct CsvQuoteAdapter {
    path: PathBuf,
}

impl CsvQuoteAdapter {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn parse_decimal(field: Option<&str>, column: &str) -> Result<Option<Decimal>, String> {
        match field.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(None),
            Some(s) => Decimal::from_str(s)
                .map(Some)
                .map_err(|e| format!("invalid {column} value '{s}': {e}")),
        }
    }

    fn parse_row(record: &csv::StringRecord, fallback_ts: DateTime<Utc>) -> Result<Quote, String> {
        let symbol = record
            .get(0)
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .ok_or("missing symbol column")?;

        let price = Self::parse_decimal(record.get(1), "price")?
            .ok_or_else(|| format!("{symbol}: missing price column"))?;

        let volume = match record.get(2).map(str::trim).filter(|s| !s.is_empty()) {
            None => 0,
            Some(s) => s
                .parse::<u64>()
                .map_err(|e| format!("{symbol}: invalid volume value '{s}': {e}"))?,
        };

        let timestamp = match record.get(7).map(str::trim).filter(|s| !s.is_empty()) {
            None => fallback_ts,
            Some(s) => DateTime::parse_from_rfc3339(s)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|e| format!("{symbol}: invalid timestamp '{s}': {e}"))?,
        };

        Ok(Quote {
            price,
            volume,
            open: Self::parse_decimal(record.get(3), "open")?,
            high: Self::parse_decimal(record.get(4), "high")?,
            low: Self::parse_decimal(record.get(5), "low")?,
            close: Self::parse_decimal(record.get(6), "close")?,
            timestamp,
            symbol,
        })
    }

    /// Every well-formed row in the snapshot.
    pub fn read_all(&self) -> Result<Vec<Quote>, TraderError> {
        let content =
            fs::read_to_string(&self.path).map_err(|e| TraderError::GatewayUnavailable {
                reason: format!("failed to read {}: {}", self.path.display(), e),
            })?;
        let modified = fs::metadata(&self.path)
            .and_then(|m| m.modified())
            .map(DateTime::<Utc>::from)
            .unwrap_or_else(|_| Utc::now());

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut quotes = Vec::new();
        for (line, result) in rdr.records().enumerate() {
            let record = match result {
                Ok(record) => record,
                Err(e) => {
                    warn!(path = %self.path.display(), line = line + 2, error = %e, "unreadable quote row");
                    continue;
                }
            };
            match Self::parse_row(&record, modified) {
                Ok(quote) if quote.price > Decimal::ZERO => quotes.push(quote),
                Ok(quote) => {
                    warn!(symbol = %quote.symbol, price = %quote.price, "ignoring non-positive price")
                }
                Err(reason) => {
                    warn!(path = %self.path.display(), line = line + 2, %reason, "skipping quote row")
                }
            }
        }
        Ok(quotes)
    }
}

impl MarketDataPort for CsvQuoteAdapter {
    fn get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, TraderError> {
        let mut by_symbol: HashMap<String, Quote> = self
            .read_all()?
            .into_iter()
            .map(|q| (q.symbol.clone(), q))
            .collect();
        by_symbol.retain(|symbol, _| symbols.contains(symbol));
        Ok(by_symbol)
    }
}
