#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use smallcap_trader::domain::advice::Advice;
use smallcap_trader::domain::error::TraderError;
use smallcap_trader::domain::portfolio::{Portfolio, TradeReceipt};
use smallcap_trader::domain::position::Position;
use smallcap_trader::domain::scheduler::ShutdownFlag;
use smallcap_trader::domain::signal::Signal;
use smallcap_trader::domain::symbol::{Quote, Symbol};
use smallcap_trader::domain::trade::Trade;
use smallcap_trader::ports::advisor_port::{AdviceRequest, AdvisorPort};
use smallcap_trader::ports::clock::Clock;
use smallcap_trader::ports::market_data_port::MarketDataPort;
use smallcap_trader::ports::portfolio_store::PortfolioStore;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 10:30 IST on Thursday 3 July 2025.
pub fn market_open_utc() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 7, 3, 5, 0, 0).unwrap()
}

pub fn utc(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

pub fn position(portfolio_id: i64, symbol: &str, quantity: u32, average: Decimal) -> Position {
    Position {
        portfolio_id,
        symbol: symbol.to_string(),
        quantity,
        average_price: average,
        invested_amount: average * Decimal::from(quantity),
        opened_at: utc(2025, 7, 1, 5, 0),
    }
}

// ---------------------------------------------------------------------------
// Market data
// ---------------------------------------------------------------------------

pub struct MockMarketData {
    prices: Mutex<HashMap<String, Decimal>>,
    error: Mutex<Option<String>>,
    pub calls: AtomicUsize,
    pub requested: Mutex<Vec<Vec<String>>>,
}

impl MockMarketData {
    pub fn new() -> Self {
        Self {
            prices: Mutex::new(HashMap::new()),
            error: Mutex::new(None),
            calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
        }
    }

    pub fn with_quote(self, symbol: &str, price: Decimal) -> Self {
        self.set_price(symbol, price);
        self
    }

    pub fn with_error(self, reason: &str) -> Self {
        *self.error.lock().unwrap() = Some(reason.to_string());
        self
    }

    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.prices.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn clear_error(&self) {
        *self.error.lock().unwrap() = None;
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl MarketDataPort for MockMarketData {
    fn get_quotes(&self, symbols: &[String]) -> Result<HashMap<String, Quote>, TraderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requested.lock().unwrap().push(symbols.to_vec());
        if let Some(reason) = self.error.lock().unwrap().clone() {
            return Err(TraderError::GatewayUnavailable { reason });
        }
        let prices = self.prices.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| {
                prices
                    .get(s)
                    .map(|&p| (s.clone(), Quote::new(s, p, market_open_utc())))
            })
            .collect())
    }
}

// ---------------------------------------------------------------------------
// Advisor
// ---------------------------------------------------------------------------

pub struct MockAdvisor {
    advice: HashMap<String, Advice>,
    failing: HashSet<String>,
    default: Option<Advice>,
    pub calls: Mutex<Vec<String>>,
}

impl MockAdvisor {
    pub fn new() -> Self {
        Self {
            advice: HashMap::new(),
            failing: HashSet::new(),
            default: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_advice(mut self, symbol: &str, advice: Advice) -> Self {
        self.advice.insert(symbol.to_string(), advice);
        self
    }

    pub fn with_default(mut self, advice: Advice) -> Self {
        self.default = Some(advice);
        self
    }

    pub fn with_error(mut self, symbol: &str) -> Self {
        self.failing.insert(symbol.to_string());
        self
    }

    pub fn asked(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl AdvisorPort for MockAdvisor {
    fn advise(&self, request: &AdviceRequest) -> Result<Advice, TraderError> {
        let symbol = &request.quote.symbol;
        self.calls.lock().unwrap().push(symbol.clone());
        if self.failing.contains(symbol) {
            return Err(TraderError::Advisor {
                reason: format!("{symbol}: timed out"),
            });
        }
        self.advice
            .get(symbol)
            .or(self.default.as_ref())
            .cloned()
            .ok_or_else(|| TraderError::Advisor {
                reason: format!("{symbol}: no advice"),
            })
    }
}

// ---------------------------------------------------------------------------
// In-memory store
// ---------------------------------------------------------------------------

#[derive(Default)]
struct MemoryInner {
    portfolios: BTreeMap<i64, Portfolio>,
    trades: Vec<Trade>,
    trade_ids: HashSet<String>,
    signals: Vec<(i64, Signal, bool)>,
    symbols: HashMap<String, Symbol>,
    next_id: i64,
    failing_writes: HashSet<i64>,
    unreadable: bool,
}

/// Store backed by [`Portfolio::apply`] and a mutex.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_portfolio(self, name: &str, balance: Decimal) -> Self {
        self.create_portfolio(name, balance).unwrap();
        self
    }

    /// Seed a position directly and debit its cost.
    pub fn seed_position(&self, portfolio_id: i64, pos: Position) {
        let mut inner = self.inner.lock().unwrap();
        let portfolio = inner.portfolios.get_mut(&portfolio_id).unwrap();
        portfolio.current_balance -= pos.invested_amount;
        portfolio.positions.insert(pos.symbol.clone(), pos);
    }

    pub fn set_balance(&self, portfolio_id: i64, balance: Decimal) {
        let mut inner = self.inner.lock().unwrap();
        inner.portfolios.get_mut(&portfolio_id).unwrap().current_balance = balance;
    }

    /// Make every subsequent write for this portfolio fail.
    pub fn fail_writes_for(&self, portfolio_id: i64) {
        self.inner.lock().unwrap().failing_writes.insert(portfolio_id);
    }

    /// Make listing portfolios fail, as if the database went away.
    pub fn make_unreadable(&self) {
        self.inner.lock().unwrap().unreadable = true;
    }

    pub fn trades(&self) -> Vec<Trade> {
        self.inner.lock().unwrap().trades.clone()
    }

    pub fn trades_for(&self, portfolio_id: i64) -> Vec<Trade> {
        self.trades()
            .into_iter()
            .filter(|t| t.portfolio_id == portfolio_id)
            .collect()
    }

    pub fn signals(&self) -> Vec<(i64, Signal, bool)> {
        self.inner.lock().unwrap().signals.clone()
    }

    pub fn balance(&self, portfolio_id: i64) -> Decimal {
        self.inner.lock().unwrap().portfolios[&portfolio_id].current_balance
    }

    fn check_write(inner: &MemoryInner, portfolio_id: i64) -> Result<(), TraderError> {
        if inner.failing_writes.contains(&portfolio_id) {
            return Err(TraderError::StoreWrite {
                reason: format!("disk full writing portfolio {portfolio_id}"),
            });
        }
        Ok(())
    }
}

impl PortfolioStore for MemoryStore {
    fn create_portfolio(&self, name: &str, initial_balance: Decimal) -> Result<i64, TraderError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let id = inner.next_id;
        inner
            .portfolios
            .insert(id, Portfolio::new(id, name, initial_balance));
        Ok(id)
    }

    fn set_portfolio_active(&self, portfolio_id: i64, active: bool) -> Result<(), TraderError> {
        let mut inner = self.inner.lock().unwrap();
        let portfolio = inner
            .portfolios
            .get_mut(&portfolio_id)
            .ok_or(TraderError::PortfolioNotFound { id: portfolio_id })?;
        portfolio.is_active = active;
        Ok(())
    }

    fn get_active_portfolios(&self) -> Result<Vec<i64>, TraderError> {
        let inner = self.inner.lock().unwrap();
        if inner.unreadable {
            return Err(TraderError::DatabaseQuery {
                reason: "no such table: portfolios".into(),
            });
        }
        Ok(inner
            .portfolios
            .values()
            .filter(|p| p.is_active)
            .map(|p| p.id)
            .collect())
    }

    fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, TraderError> {
        let inner = self.inner.lock().unwrap();
        inner
            .portfolios
            .get(&portfolio_id)
            .cloned()
            .ok_or(TraderError::PortfolioNotFound { id: portfolio_id })
    }

    fn get_positions(&self, portfolio_id: i64) -> Result<Vec<Position>, TraderError> {
        Ok(self
            .get_portfolio(portfolio_id)?
            .positions
            .into_values()
            .filter(|p| p.is_open())
            .collect())
    }

    fn apply_trade(&self, portfolio_id: i64, trade: &Trade) -> Result<TradeReceipt, TraderError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_write(&inner, portfolio_id)?;
        if inner.trade_ids.contains(trade.id.as_str()) {
            return Err(TraderError::DuplicateTrade {
                id: trade.id.to_string(),
            });
        }
        let mut portfolio = inner
            .portfolios
            .get(&portfolio_id)
            .cloned()
            .ok_or(TraderError::PortfolioNotFound { id: portfolio_id })?;
        let receipt = portfolio.apply(trade)?;

        let mut recorded = trade.clone();
        recorded.realized_pnl = receipt.realized_pnl;
        inner.trade_ids.insert(trade.id.to_string());
        inner.trades.push(recorded);
        inner.portfolios.insert(portfolio_id, portfolio);
        Ok(receipt)
    }

    fn record_signal(
        &self,
        portfolio_id: i64,
        signal: &Signal,
        executed: bool,
    ) -> Result<(), TraderError> {
        let mut inner = self.inner.lock().unwrap();
        Self::check_write(&inner, portfolio_id)?;
        inner.signals.push((portfolio_id, signal.clone(), executed));
        Ok(())
    }

    fn list_trades(&self, portfolio_id: i64, limit: usize) -> Result<Vec<Trade>, TraderError> {
        let mut trades = self.trades_for(portfolio_id);
        trades.reverse();
        trades.truncate(limit);
        Ok(trades)
    }

    fn refresh_symbols(&self, quotes: &[Quote]) -> Result<(), TraderError> {
        let mut inner = self.inner.lock().unwrap();
        for quote in quotes {
            inner
                .symbols
                .entry(quote.symbol.clone())
                .or_insert_with(|| Symbol::new(&quote.symbol))
                .refresh(quote);
        }
        Ok(())
    }

    fn get_symbol(&self, ticker: &str) -> Result<Option<Symbol>, TraderError> {
        Ok(self.inner.lock().unwrap().symbols.get(ticker).cloned())
    }
}

// ---------------------------------------------------------------------------
// Clock
// ---------------------------------------------------------------------------

/// Manual clock: `sleep` advances time instantly. Optionally requests
/// shutdown once time reaches `stop_at`.
pub struct FakeClock {
    now: Mutex<DateTime<Utc>>,
    stop_at: Option<(DateTime<Utc>, ShutdownFlag)>,
    pub sleeps: Mutex<Vec<Duration>>,
}

impl FakeClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
            stop_at: None,
            sleeps: Mutex::new(Vec::new()),
        }
    }

    pub fn stopping_at(mut self, at: DateTime<Utc>, flag: &ShutdownFlag) -> Self {
        self.stop_at = Some((at, flag.clone()));
        self
    }
}

impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap();
        if let Some((at, flag)) = &self.stop_at {
            if *now >= *at {
                flag.request();
            }
        }
    }
}
