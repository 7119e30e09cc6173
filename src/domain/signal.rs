//! Advisory signals produced by the evaluator.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::fmt;

use super::trade::TradeAction;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalAction {
    Buy,
    Sell,
    Hold,
}

impl SignalAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalAction::Buy => "BUY",
            SignalAction::Sell => "SELL",
            SignalAction::Hold => "HOLD",
        }
    }

    pub fn trade_action(&self) -> Option<TradeAction> {
        match self {
            SignalAction::Buy => Some(TradeAction::Buy),
            SignalAction::Sell => Some(TradeAction::Sell),
            SignalAction::Hold => None,
        }
    }
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    /// Price moved at least the configured threshold from the average cost.
    PriceRule,
    Advisor,
}

impl ExitReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitReason::PriceRule => "PRICE_RULE",
            ExitReason::Advisor => "ADVISOR",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub symbol: String,
    pub action: SignalAction,
    pub quantity: u32,
    pub price: Decimal,
    pub confidence: Option<u8>,
    pub rationale: String,
    pub exit_reason: Option<ExitReason>,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    pub fn hold(symbol: &str, price: Decimal, rationale: String, at: DateTime<Utc>) -> Self {
        Signal {
            symbol: symbol.to_string(),
            action: SignalAction::Hold,
            quantity: 0,
            price,
            confidence: None,
            rationale,
            exit_reason: None,
            created_at: at,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.action != SignalAction::Hold && self.quantity > 0
    }

    /// Turn this signal into a HOLD, noting the blocked action in the rationale.
    pub fn downgrade(&mut self, why: &str) {
        self.rationale = format!("{} (was {}: {})", why, self.action, self.rationale);
        self.action = SignalAction::Hold;
        self.quantity = 0;
        self.exit_reason = None;
    }
}
