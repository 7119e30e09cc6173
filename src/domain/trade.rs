//! Executed trade records.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::error::TraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl fmt::Display for TradeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TradeAction {
    type Err = TraderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(TraderError::InvalidInput {
                reason: format!("unknown trade action '{other}'"),
            }),
        }
    }
}

/// Deterministic trade identity: replaying the same tick yields the same id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TradeId(String);

impl TradeId {
    pub fn new(portfolio_id: i64, tick_stamp: &str, symbol: &str, action: TradeAction) -> Self {
        TradeId(format!("{portfolio_id}:{tick_stamp}:{symbol}:{action}"))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        TradeId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TradeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Immutable, append-only record of an executed action.
#[derive(Debug, Clone, PartialEq)]
pub struct Trade {
    pub id: TradeId,
    pub portfolio_id: i64,
    pub symbol: String,
    pub action: TradeAction,
    pub quantity: u32,
    pub price: Decimal,
    pub brokerage: Decimal,
    pub executed_at: DateTime<Utc>,
    pub reason: String,
    /// Filled in for SELLs once applied.
    pub realized_pnl: Option<Decimal>,
}

impl Trade {
    pub fn gross_amount(&self) -> Result<Decimal, TraderError> {
        notional(self.price, self.quantity)
    }

    /// Cash leaving the portfolio for a BUY, or entering it for a SELL.
    pub fn net_amount(&self) -> Result<Decimal, TraderError> {
        let gross = self.gross_amount()?;
        let net = match self.action {
            TradeAction::Buy => gross.checked_add(self.brokerage),
            TradeAction::Sell => gross.checked_sub(self.brokerage),
        };
        net.ok_or_else(|| overflow(&format!("net amount of trade {}", self.id)))
    }
}

/// `price * quantity`, failing instead of overflowing.
pub fn notional(price: Decimal, quantity: u32) -> Result<Decimal, TraderError> {
    price
        .checked_mul(Decimal::from(quantity))
        .ok_or_else(|| overflow(&format!("{quantity} x {price}")))
}

/// Brokerage charged on a fill: `value * pct / 100`, rounded to paise.
pub fn brokerage_for(
    price: Decimal,
    quantity: u32,
    brokerage_pct: Decimal,
) -> Result<Decimal, TraderError> {
    let value = notional(price, quantity)?;
    value
        .checked_mul(brokerage_pct)
        .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
        .map(|v| v.round_dp(2))
        .ok_or_else(|| overflow(&format!("brokerage on {value}")))
}

pub(crate) fn overflow(what: &str) -> TraderError {
    TraderError::InvalidInput {
        reason: format!("amount out of range: {what}"),
    }
}
