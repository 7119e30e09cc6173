//! Portfolio state and the trade state transition.
//!
//! [`Portfolio::apply`] is the only place balance and positions change. Store
//! implementations load a portfolio, call `apply`, and persist the result
//! together with the trade in one transaction.

use rust_decimal::Decimal;
use std::collections::HashMap;

use super::error::TraderError;
use super::position::Position;
use super::trade::{Trade, TradeAction, notional, overflow};

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    pub initial_balance: Decimal,
    pub current_balance: Decimal,
    pub is_active: bool,
    pub positions: HashMap<String, Position>,
}

/// Outcome of applying one trade.
#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub balance_after: Decimal,
    /// Position after the trade, `None` once fully sold.
    pub position_after: Option<Position>,
    pub realized_pnl: Option<Decimal>,
}

impl Portfolio {
    pub fn new(id: i64, name: &str, initial_balance: Decimal) -> Self {
        Portfolio {
            id,
            name: name.to_string(),
            initial_balance,
            current_balance: initial_balance,
            is_active: true,
            positions: HashMap::new(),
        }
    }

    pub fn get_position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol).filter(|p| p.is_open())
    }

    pub fn has_position(&self, symbol: &str) -> bool {
        self.get_position(symbol).is_some()
    }

    pub fn position_count(&self) -> usize {
        self.positions.values().filter(|p| p.is_open()).count()
    }

    /// Cash plus market value of positions with a known price.
    pub fn total_value(&self, prices: &HashMap<String, Decimal>) -> Result<Decimal, TraderError> {
        let mut total = self.current_balance;
        for pos in self.positions.values().filter(|p| p.is_open()) {
            let Some(&price) = prices.get(&pos.symbol) else {
                continue;
            };
            total = pos
                .market_value(price)
                .and_then(|value| total.checked_add(value))
                .ok_or_else(|| overflow(&format!("value of portfolio {}", self.id)))?;
        }
        Ok(total)
    }

    /// Apply a trade. On error the portfolio is left exactly as it was.
    pub fn apply(&mut self, trade: &Trade) -> Result<TradeReceipt, TraderError> {
        if trade.portfolio_id != self.id {
            return Err(TraderError::InvalidInput {
                reason: format!(
                    "trade {} belongs to portfolio {}, not {}",
                    trade.id, trade.portfolio_id, self.id
                ),
            });
        }
        if trade.quantity == 0 {
            return Err(TraderError::InvalidInput {
                reason: format!("trade {} has zero quantity", trade.id),
            });
        }
        if trade.price <= Decimal::ZERO {
            return Err(TraderError::InvalidInput {
                reason: format!("trade {} has non-positive price {}", trade.id, trade.price),
            });
        }
        if trade.brokerage < Decimal::ZERO {
            return Err(TraderError::InvalidInput {
                reason: format!("trade {} has negative brokerage", trade.id),
            });
        }

        match trade.action {
            TradeAction::Buy => self.apply_buy(trade),
            TradeAction::Sell => self.apply_sell(trade),
        }
    }

    fn apply_buy(&mut self, trade: &Trade) -> Result<TradeReceipt, TraderError> {
        let cost = trade.net_amount()?;
        if cost > self.current_balance {
            return Err(TraderError::InsufficientBalance {
                required: cost,
                available: self.current_balance,
            });
        }

        let position = match self.positions.get(&trade.symbol).filter(|p| p.is_open()) {
            Some(existing) => {
                let new_qty = existing.quantity.checked_add(trade.quantity).ok_or_else(|| {
                    TraderError::InvalidInput {
                        reason: format!("position quantity overflow for {}", trade.symbol),
                    }
                })?;
                let total_cost = existing
                    .cost_basis()
                    .zip(notional(trade.price, trade.quantity).ok())
                    .and_then(|(held, added)| held.checked_add(added))
                    .ok_or_else(|| overflow(&format!("cost basis of {}", trade.symbol)))?;
                let invested = existing
                    .invested_amount
                    .checked_add(cost)
                    .ok_or_else(|| overflow(&format!("invested amount of {}", trade.symbol)))?;
                Position {
                    quantity: new_qty,
                    average_price: (total_cost / Decimal::from(new_qty)).round_dp(4),
                    invested_amount: invested,
                    ..existing.clone()
                }
            }
            None => Position {
                portfolio_id: self.id,
                symbol: trade.symbol.clone(),
                quantity: trade.quantity,
                average_price: trade.price,
                invested_amount: cost,
                opened_at: trade.executed_at,
            },
        };

        self.current_balance -= cost;
        self.positions.insert(trade.symbol.clone(), position.clone());

        Ok(TradeReceipt {
            balance_after: self.current_balance,
            position_after: Some(position),
            realized_pnl: None,
        })
    }

    fn apply_sell(&mut self, trade: &Trade) -> Result<TradeReceipt, TraderError> {
        let existing = self
            .get_position(&trade.symbol)
            .ok_or_else(|| TraderError::NoPosition {
                symbol: trade.symbol.clone(),
            })?;
        if trade.quantity > existing.quantity {
            return Err(TraderError::InsufficientQuantity {
                symbol: trade.symbol.clone(),
                held: existing.quantity,
                requested: trade.quantity,
            });
        }

        let proceeds = trade.net_amount()?;
        let sold_basis = notional(existing.average_price, trade.quantity)?;
        let realized = proceeds
            .checked_sub(sold_basis)
            .ok_or_else(|| overflow(&format!("realized P&L of trade {}", trade.id)))?;
        let balance_after = self
            .current_balance
            .checked_add(proceeds)
            .ok_or_else(|| overflow(&format!("balance of portfolio {}", self.id)))?;
        let remaining = existing.quantity - trade.quantity;
        let position_after = if remaining == 0 {
            None
        } else {
            Some(Position {
                quantity: remaining,
                invested_amount: existing.invested_amount - sold_basis,
                ..existing.clone()
            })
        };

        self.current_balance = balance_after;
        match &position_after {
            Some(pos) => {
                self.positions.insert(trade.symbol.clone(), pos.clone());
            }
            None => {
                self.positions.remove(&trade.symbol);
            }
        }

        Ok(TradeReceipt {
            balance_after: self.current_balance,
            position_after,
            realized_pnl: Some(realized),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::trade::TradeId;
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn trade(action: TradeAction, symbol: &str, quantity: u32, price: Decimal) -> Trade {
        Trade {
            id: TradeId::from_raw(format!("1:t:{symbol}:{action}")),
            portfolio_id: 1,
            symbol: symbol.into(),
            action,
            quantity,
            price,
            brokerage: Decimal::ZERO,
            executed_at: Utc.with_ymd_and_hms(2025, 7, 3, 5, 0, 0).unwrap(),
            reason: String::new(),
            realized_pnl: None,
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(1, "Default", dec!(50000));
        assert_eq!(portfolio.current_balance, dec!(50000));
        assert_eq!(portfolio.initial_balance, dec!(50000));
        assert!(portfolio.is_active);
        assert_eq!(portfolio.position_count(), 0);
    }

    #[test]
    fn buy_opens_position_and_debits_cash() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        let receipt = portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();

        assert_eq!(receipt.balance_after, dec!(48000));
        let pos = portfolio.get_position("VMART").unwrap();
        assert_eq!(pos.quantity, 20);
        assert_eq!(pos.average_price, dec!(100));
        assert_eq!(pos.invested_amount, dec!(2000));
    }

    #[test]
    fn second_buy_averages_price() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(110)))
            .unwrap();

        let pos = portfolio.get_position("VMART").unwrap();
        assert_eq!(pos.quantity, 40);
        assert_eq!(pos.average_price, dec!(105));
        assert_eq!(portfolio.current_balance, dec!(45800));
    }

    #[test]
    fn buy_rejected_when_balance_short() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(1999.99));
        let before = portfolio.clone();
        let err = portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap_err();

        assert!(matches!(err, TraderError::InsufficientBalance { .. }));
        assert_eq!(portfolio, before);
    }

    #[test]
    fn buy_spending_entire_balance_allowed() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(2000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        assert_eq!(portfolio.current_balance, Decimal::ZERO);
    }

    #[test]
    fn sell_full_quantity_closes_position() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let receipt = portfolio
            .apply(&trade(TradeAction::Sell, "VMART", 20, dec!(103)))
            .unwrap();

        assert_eq!(receipt.realized_pnl, Some(dec!(60)));
        assert!(receipt.position_after.is_none());
        assert!(!portfolio.has_position("VMART"));
        assert_eq!(portfolio.current_balance, dec!(50060));
    }

    #[test]
    fn partial_sell_keeps_average_price() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let receipt = portfolio
            .apply(&trade(TradeAction::Sell, "VMART", 5, dec!(98)))
            .unwrap();

        let pos = receipt.position_after.unwrap();
        assert_eq!(pos.quantity, 15);
        assert_eq!(pos.average_price, dec!(100));
        assert_eq!(pos.invested_amount, dec!(1500));
        assert_eq!(receipt.realized_pnl, Some(dec!(-10)));
    }

    #[test]
    fn sell_more_than_held_rejected() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let err = portfolio
            .apply(&trade(TradeAction::Sell, "VMART", 21, dec!(100)))
            .unwrap_err();
        assert!(matches!(
            err,
            TraderError::InsufficientQuantity {
                held: 20,
                requested: 21,
                ..
            }
        ));
        assert_eq!(portfolio.get_position("VMART").unwrap().quantity, 20);
    }

    #[test]
    fn sell_without_position_rejected() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        let err = portfolio
            .apply(&trade(TradeAction::Sell, "VMART", 1, dec!(100)))
            .unwrap_err();
        assert!(matches!(err, TraderError::NoPosition { .. }));
    }

    #[test]
    fn sell_brokerage_reduces_proceeds_and_pnl() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let mut sell = trade(TradeAction::Sell, "VMART", 20, dec!(103));
        sell.brokerage = dec!(0.62);
        let receipt = portfolio.apply(&sell).unwrap();

        assert_eq!(receipt.realized_pnl, Some(dec!(59.38)));
        assert_eq!(portfolio.current_balance, dec!(50059.38));
    }

    #[test]
    fn malformed_trades_rejected() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        let zero_qty = trade(TradeAction::Buy, "VMART", 0, dec!(100));
        assert!(matches!(
            portfolio.apply(&zero_qty),
            Err(TraderError::InvalidInput { .. })
        ));
        let bad_price = trade(TradeAction::Buy, "VMART", 1, dec!(-1));
        assert!(matches!(
            portfolio.apply(&bad_price),
            Err(TraderError::InvalidInput { .. })
        ));
        let mut other = trade(TradeAction::Buy, "VMART", 1, dec!(10));
        other.portfolio_id = 2;
        assert!(matches!(
            portfolio.apply(&other),
            Err(TraderError::InvalidInput { .. })
        ));
    }

    #[test]
    fn total_value_uses_known_prices() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let mut prices = HashMap::new();
        prices.insert("VMART".to_string(), dec!(110));
        assert_eq!(portfolio.total_value(&prices).unwrap(), dec!(50200));
        assert_eq!(portfolio.total_value(&HashMap::new()).unwrap(), dec!(48000));

        prices.insert("VMART".to_string(), Decimal::MAX);
        assert!(portfolio.total_value(&prices).is_err());
    }

    #[test]
    fn out_of_range_sell_leaves_portfolio_untouched() {
        let mut portfolio = Portfolio::new(1, "Default", dec!(50000));
        portfolio
            .apply(&trade(TradeAction::Buy, "VMART", 20, dec!(100)))
            .unwrap();
        let before = portfolio.clone();

        let result = portfolio.apply(&trade(TradeAction::Sell, "VMART", 20, Decimal::MAX));
        assert!(matches!(result, Err(TraderError::InvalidInput { .. })));
        assert_eq!(portfolio, before);
    }

    fn arb_trade() -> impl Strategy<Value = (bool, usize, u32, i64)> {
        (any::<bool>(), 0usize..3, 1u32..60, 1i64..40_000)
    }

    proptest! {
        #[test]
        fn balance_and_quantity_never_negative(ops in proptest::collection::vec(arb_trade(), 1..60)) {
            let symbols = ["VMART", "CDSL", "IIFL"];
            let mut portfolio = Portfolio::new(1, "Prop", dec!(25000));
            for (is_buy, sym, qty, paise) in ops {
                let action = if is_buy { TradeAction::Buy } else { TradeAction::Sell };
                let price = Decimal::new(paise, 2);
                let _ = portfolio.apply(&trade(action, symbols[sym], qty, price));
                prop_assert!(portfolio.current_balance >= Decimal::ZERO);
                for pos in portfolio.positions.values() {
                    prop_assert!(pos.quantity > 0);
                }
            }
        }
    }
}
