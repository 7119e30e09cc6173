//! Portfolio summary statistics over the trade log.

use rust_decimal::Decimal;

use super::error::TraderError;
use super::portfolio::Portfolio;
use super::trade::{Trade, TradeAction};

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSummary {
    pub portfolio_id: i64,
    pub current_balance: Decimal,
    pub initial_balance: Decimal,
    pub open_positions: usize,
    pub total_trades: usize,
    pub buy_trades: usize,
    pub sell_trades: usize,
    /// BUY cost including brokerage.
    pub total_invested: Decimal,
    pub realized_pnl: Decimal,
    pub trades_won: usize,
    pub trades_lost: usize,
    /// Percentage of SELLs with positive realized P&L.
    pub win_rate: Decimal,
    /// Realized P&L as a percentage of total invested.
    pub profit_pct: Decimal,
}

impl PortfolioSummary {
    pub fn compute(portfolio: &Portfolio, trades: &[Trade]) -> Result<Self, TraderError> {
        let mut buy_trades = 0usize;
        let mut sell_trades = 0usize;
        let mut total_invested = Decimal::ZERO;
        let mut realized_pnl = Decimal::ZERO;
        let mut trades_won = 0usize;
        let mut trades_lost = 0usize;

        for trade in trades {
            match trade.action {
                TradeAction::Buy => {
                    buy_trades += 1;
                    total_invested += trade.net_amount()?;
                }
                TradeAction::Sell => {
                    sell_trades += 1;
                    let pnl = trade.realized_pnl.unwrap_or_default();
                    realized_pnl += pnl;
                    if pnl > Decimal::ZERO {
                        trades_won += 1;
                    } else if pnl < Decimal::ZERO {
                        trades_lost += 1;
                    }
                }
            }
        }

        let win_rate = if sell_trades > 0 {
            (Decimal::from(trades_won) / Decimal::from(sell_trades) * Decimal::ONE_HUNDRED)
                .round_dp(2)
        } else {
            Decimal::ZERO
        };

        let profit_pct = if total_invested > Decimal::ZERO {
            (realized_pnl / total_invested * Decimal::ONE_HUNDRED).round_dp(2)
        } else {
            Decimal::ZERO
        };

        Ok(PortfolioSummary {
            portfolio_id: portfolio.id,
            current_balance: portfolio.current_balance,
            initial_balance: portfolio.initial_balance,
            open_positions: portfolio.position_count(),
            total_trades: trades.len(),
            buy_trades,
            sell_trades,
            total_invested,
            realized_pnl,
            trades_won,
            trades_lost,
            win_rate,
            profit_pct,
        })
    }
}
