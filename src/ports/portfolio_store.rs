//! Portfolio persistence port trait.

use crate::domain::error::TraderError;
use crate::domain::portfolio::{Portfolio, TradeReceipt};
use crate::domain::position::Position;
use crate::domain::signal::Signal;
use crate::domain::symbol::{Quote, Symbol};
use crate::domain::trade::Trade;
use rust_decimal::Decimal;

pub trait PortfolioStore {
    fn create_portfolio(&self, name: &str, initial_balance: Decimal) -> Result<i64, TraderError>;

    fn set_portfolio_active(&self, portfolio_id: i64, active: bool) -> Result<(), TraderError>;

    fn get_active_portfolios(&self) -> Result<Vec<i64>, TraderError>;

    /// Portfolio with its open positions loaded.
    fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, TraderError>;

    fn get_positions(&self, portfolio_id: i64) -> Result<Vec<Position>, TraderError>;

    /// The only mutation path for balance and positions. Records the trade
    /// and applies it atomically; a trade id seen before is rejected with
    /// [`TraderError::DuplicateTrade`] and changes nothing.
    fn apply_trade(&self, portfolio_id: i64, trade: &Trade) -> Result<TradeReceipt, TraderError>;

    fn record_signal(
        &self,
        portfolio_id: i64,
        signal: &Signal,
        executed: bool,
    ) -> Result<(), TraderError>;

    /// Most recent first.
    fn list_trades(&self, portfolio_id: i64, limit: usize) -> Result<Vec<Trade>, TraderError>;

    fn refresh_symbols(&self, quotes: &[Quote]) -> Result<(), TraderError>;

    fn get_symbol(&self, ticker: &str) -> Result<Option<Symbol>, TraderError>;
}
