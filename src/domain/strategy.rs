//! Strategy parameters.

use rust_decimal::Decimal;

/// Immutable strategy thresholds, passed explicitly to every evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub min_price: Decimal,
    pub max_price: Decimal,
    /// Absolute move from average purchase price that triggers a full exit.
    pub price_change_threshold: Decimal,
    pub lot_size: u32,
    pub min_confidence: u8,
    pub brokerage_pct: Decimal,
    pub max_buys_per_tick: usize,
    /// Ask the advisor about held symbols and exit on a confident SELL.
    pub advisor_exits: bool,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        StrategyConfig {
            min_price: Decimal::from(75),
            max_price: Decimal::from(150),
            price_change_threshold: Decimal::from(2),
            lot_size: 20,
            min_confidence: 60,
            brokerage_pct: Decimal::ZERO,
            max_buys_per_tick: 3,
            advisor_exits: false,
        }
    }
}

impl StrategyConfig {
    pub fn in_price_band(&self, price: Decimal) -> bool {
        self.min_price <= price && price <= self.max_price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn defaults_match_small_cap_rules() {
        let config = StrategyConfig::default();
        assert_eq!(config.min_price, dec!(75));
        assert_eq!(config.max_price, dec!(150));
        assert_eq!(config.price_change_threshold, dec!(2));
        assert_eq!(config.lot_size, 20);
        assert_eq!(config.min_confidence, 60);
    }

    #[test]
    fn price_band_is_inclusive() {
        let config = StrategyConfig::default();
        assert!(config.in_price_band(dec!(75)));
        assert!(config.in_price_band(dec!(150)));
        assert!(!config.in_price_band(dec!(74.99)));
        assert!(!config.in_price_band(dec!(150.01)));
    }
}
