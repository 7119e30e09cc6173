//! Open position tracking.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

/// Shares of one symbol held by a portfolio. A position whose quantity
/// reaches zero is removed rather than kept around.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub portfolio_id: i64,
    pub symbol: String,
    pub quantity: u32,
    pub average_price: Decimal,
    pub invested_amount: Decimal,
    pub opened_at: DateTime<Utc>,
}

impl Position {
    pub fn is_open(&self) -> bool {
        self.quantity > 0
    }

    /// `None` when the value is out of range.
    pub fn market_value(&self, price: Decimal) -> Option<Decimal> {
        price.checked_mul(Decimal::from(self.quantity))
    }

    pub fn cost_basis(&self) -> Option<Decimal> {
        self.average_price.checked_mul(Decimal::from(self.quantity))
    }

    pub fn unrealized_pnl(&self, price: Decimal) -> Option<Decimal> {
        price
            .checked_sub(self.average_price)?
            .checked_mul(Decimal::from(self.quantity))
    }

    /// Unrealized P&L as a percentage of cost basis, `None` for an empty basis.
    pub fn unrealized_pnl_pct(&self, price: Decimal) -> Option<Decimal> {
        let basis = self.cost_basis()?;
        if basis.is_zero() {
            return None;
        }
        let pct = self
            .unrealized_pnl(price)?
            .checked_div(basis)?
            .checked_mul(Decimal::ONE_HUNDRED)?;
        Some(pct.round_dp(2))
    }
}
