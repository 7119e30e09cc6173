//! Tracked symbols and market quotes.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// A tracked ticker. Identity is the ticker; only the price fields change.
#[derive(Debug, Clone, PartialEq)]
pub struct Symbol {
    pub ticker: String,
    pub name: String,
    pub last_price: Option<Decimal>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Symbol {
    pub fn new(ticker: &str) -> Self {
        Symbol {
            ticker: ticker.to_string(),
            name: ticker.to_string(),
            last_price: None,
            updated_at: None,
        }
    }

    pub fn refresh(&mut self, quote: &Quote) {
        self.last_price = Some(quote.price);
        self.updated_at = Some(quote.timestamp);
    }
}

/// Last-traded snapshot returned by the market data gateway.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub symbol: String,
    pub price: Decimal,
    pub volume: u64,
    pub open: Option<Decimal>,
    pub high: Option<Decimal>,
    pub low: Option<Decimal>,
    pub close: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    pub fn new(symbol: &str, price: Decimal, timestamp: DateTime<Utc>) -> Self {
        Quote {
            symbol: symbol.to_string(),
            price,
            volume: 0,
            open: None,
            high: None,
            low: None,
            close: None,
            timestamp,
        }
    }
}

/// Parse a comma separated ticker list, trimming, upper-casing and dropping
/// blanks and repeats while keeping first-seen order.
pub fn parse_tickers(list: &str) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for raw in list.split(',') {
        let ticker = raw.trim().to_uppercase();
        if !ticker.is_empty() && !out.contains(&ticker) {
            out.push(ticker);
        }
    }
    out
}
