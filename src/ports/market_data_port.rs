//! Market data gateway port trait.

use crate::domain::error::TraderError;
use crate::domain::symbol::Quote;
use std::collections::HashMap;

pub trait MarketDataPort {
    /// Fetch last-traded quotes for a batch of symbols in one round trip.
    ///
    /// Symbols the gateway could not price are simply absent from the map;
    /// an `Err` means the whole batch failed.
    fn get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, TraderError>;
}
