//! Scheduled strategy runner.
//!
//! A tick reads every active portfolio fresh from the store, prices the
//! tracked symbols with one batched gateway call, evaluates held symbols for
//! exits and in-band candidates for entries, and applies the resulting
//! trades one at a time through [`PortfolioStore::apply_trade`].
//!
//! Failures are contained: a missing quote skips that symbol, a gateway
//! outage skips the tick, and a store failure abandons only the portfolio it
//! happened in. Nothing is retried inside a tick.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::advice::Advice;
use super::error::TraderError;
use super::evaluator::{EvaluationInput, apply_affordability, evaluate};
use super::market_hours::MarketHours;
use super::position::Position;
use super::screen::filter_by_price_range;
use super::signal::Signal;
use super::strategy::StrategyConfig;
use super::symbol::Quote;
use super::trade::{Trade, TradeId, brokerage_for};
use crate::ports::advisor_port::{AdviceRequest, AdvisorPort};
use crate::ports::clock::Clock;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::portfolio_store::PortfolioStore;

#[derive(Debug, Clone, PartialEq)]
pub struct SchedulerConfig {
    pub tick_interval: Duration,
    /// Upper bound on a single sleep between gate checks.
    pub poll_interval: Duration,
    pub market_hours: MarketHours,
    pub universe: Vec<String>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            tick_interval: Duration::from_secs(10 * 60),
            poll_interval: Duration::from_secs(30),
            market_hours: MarketHours::default(),
            universe: Vec::new(),
        }
    }
}

/// Cooperative stop request shared between the loop and a signal handler.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
    pub fn new() -> Self {
        ShutdownFlag::default()
    }

    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PortfolioSignal {
    pub portfolio_id: i64,
    pub signal: Signal,
    pub executed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub portfolio_id: i64,
    pub symbol: String,
    pub reason: String,
}

/// What one tick did.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    pub tick_stamp: String,
    pub started_at: DateTime<Utc>,
    pub portfolios: usize,
    pub quotes_received: usize,
    pub skipped_symbols: Vec<String>,
    pub signals: Vec<PortfolioSignal>,
    pub trades: Vec<Trade>,
    pub rejections: Vec<Rejection>,
    pub failed_portfolios: Vec<(i64, String)>,
    pub gateway_error: Option<String>,
    /// Set when active portfolios could not be listed at all.
    pub store_error: Option<String>,
    pub interrupted: bool,
}

impl TickReport {
    fn new(started_at: DateTime<Utc>) -> Self {
        TickReport {
            tick_stamp: tick_stamp(started_at),
            started_at,
            portfolios: 0,
            quotes_received: 0,
            skipped_symbols: Vec::new(),
            signals: Vec::new(),
            trades: Vec::new(),
            rejections: Vec::new(),
            failed_portfolios: Vec::new(),
            gateway_error: None,
            store_error: None,
            interrupted: false,
        }
    }

    pub fn signals_for(&self, portfolio_id: i64) -> impl Iterator<Item = &Signal> {
        self.signals
            .iter()
            .filter(move |s| s.portfolio_id == portfolio_id)
            .map(|s| &s.signal)
    }
}

/// Stamp identifying a tick, used in trade ids. Carries the tick's start
/// time to the microsecond, so only a replay of the same tick reuses it.
pub fn tick_stamp(at: DateTime<Utc>) -> String {
    at.format("%Y%m%dT%H%M%S%.6fZ").to_string()
}

/// A tick is due when none has run yet or a full interval has elapsed.
pub fn is_due(last_tick: Option<DateTime<Utc>>, now: DateTime<Utc>, interval: Duration) -> bool {
    match last_tick {
        None => true,
        Some(last) => match (now - last).to_std() {
            Ok(elapsed) => elapsed >= interval,
            Err(_) => false,
        },
    }
}

pub struct Scheduler<'a> {
    store: &'a dyn PortfolioStore,
    market_data: &'a dyn MarketDataPort,
    advisor: &'a dyn AdvisorPort,
    strategy: &'a StrategyConfig,
    config: &'a SchedulerConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(
        store: &'a dyn PortfolioStore,
        market_data: &'a dyn MarketDataPort,
        advisor: &'a dyn AdvisorPort,
        strategy: &'a StrategyConfig,
        config: &'a SchedulerConfig,
    ) -> Self {
        Scheduler {
            store,
            market_data,
            advisor,
            strategy,
            config,
        }
    }

    /// Loop until `shutdown` is requested. Ticks only while the market gate
    /// is open; an in-flight tick finishes its current portfolio first.
    pub fn run_forever(&self, clock: &dyn Clock, shutdown: &ShutdownFlag) -> SchedulerState {
        info!(
            interval_secs = self.config.tick_interval.as_secs(),
            open = %self.config.market_hours.open,
            close = %self.config.market_hours.close,
            timezone = %self.config.market_hours.timezone,
            market_hours_only = self.config.market_hours.market_hours_only,
            weekdays_only = self.config.market_hours.weekdays_only,
            "scheduler started"
        );

        let mut state = SchedulerState::Idle;
        let mut last_tick: Option<DateTime<Utc>> = None;

        while !shutdown.is_requested() {
            let now = clock.now();
            if is_due(last_tick, now, self.config.tick_interval)
                && self.config.market_hours.is_open(now)
            {
                state = SchedulerState::Running;
                debug!(?state, tick = %tick_stamp(now), "tick starting");
                let report = self.run_tick(now, shutdown);
                log_report(&report);
                last_tick = Some(now);
                state = SchedulerState::Idle;
            }

            if shutdown.is_requested() {
                break;
            }
            clock.sleep(self.sleep_for(last_tick, clock.now()));
        }

        debug!(?state, "leaving scheduler loop");
        info!("scheduler stopped");
        SchedulerState::Stopped
    }

    fn sleep_for(&self, last_tick: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Duration {
        let poll = self.config.poll_interval;
        let Some(last) = last_tick else {
            return poll;
        };
        let Ok(interval) = chrono::Duration::from_std(self.config.tick_interval) else {
            return poll;
        };
        match (last + interval - now).to_std() {
            Ok(until_due) if !until_due.is_zero() => until_due.min(poll),
            _ => poll,
        }
    }

    /// Run one tick at `now` regardless of the market gate.
    pub fn run_tick(&self, now: DateTime<Utc>, shutdown: &ShutdownFlag) -> TickReport {
        let mut report = TickReport::new(now);

        let portfolio_ids = match self.store.get_active_portfolios() {
            Ok(ids) => ids,
            Err(e) => {
                error!(error = %e, "could not list active portfolios");
                report.store_error = Some(e.to_string());
                return report;
            }
        };
        report.portfolios = portfolio_ids.len();
        if portfolio_ids.is_empty() {
            warn!("no active portfolios");
            return report;
        }

        let tracked = self.tracked_symbols(&portfolio_ids);
        let quotes = match self.market_data.get_quotes(&tracked) {
            Ok(quotes) => quotes,
            Err(e) => {
                warn!(error = %e, symbols = tracked.len(), "skipping tick, gateway unavailable");
                report.gateway_error = Some(e.to_string());
                return report;
            }
        };
        report.quotes_received = quotes.len();

        for symbol in &tracked {
            if !quotes.contains_key(symbol) {
                warn!(%symbol, "no quote this tick, skipping");
                report.skipped_symbols.push(symbol.clone());
            }
        }

        let mut snapshot: Vec<Quote> = quotes.values().cloned().collect();
        snapshot.sort_by(|a, b| a.symbol.cmp(&b.symbol));
        if let Err(e) = self.store.refresh_symbols(&snapshot) {
            warn!(error = %e, "could not refresh symbol prices");
        }

        for portfolio_id in portfolio_ids {
            if shutdown.is_requested() {
                info!(portfolio_id, "shutdown requested, ending tick early");
                report.interrupted = true;
                break;
            }
            if let Err(e) = self.run_portfolio(portfolio_id, &quotes, now, &mut report) {
                error!(portfolio_id, error = %e, "portfolio tick aborted, will retry next tick");
                report.failed_portfolios.push((portfolio_id, e.to_string()));
            }
        }

        report
    }

    /// Configured universe plus anything an active portfolio holds.
    fn tracked_symbols(&self, portfolio_ids: &[i64]) -> Vec<String> {
        let mut tracked: BTreeSet<String> = self.config.universe.iter().cloned().collect();
        for &portfolio_id in portfolio_ids {
            match self.store.get_positions(portfolio_id) {
                Ok(positions) => {
                    tracked.extend(
                        positions
                            .into_iter()
                            .filter(Position::is_open)
                            .map(|p| p.symbol),
                    );
                }
                Err(e) => warn!(portfolio_id, error = %e, "could not read positions"),
            }
        }
        tracked.into_iter().collect()
    }

    fn run_portfolio(
        &self,
        portfolio_id: i64,
        quotes: &HashMap<String, Quote>,
        now: DateTime<Utc>,
        report: &mut TickReport,
    ) -> Result<(), TraderError> {
        let portfolio = self.store.get_portfolio(portfolio_id)?;
        info!(
            portfolio_id,
            name = %portfolio.name,
            balance = %portfolio.current_balance,
            positions = portfolio.position_count(),
            "running strategy"
        );

        let mut available = portfolio.current_balance;

        let mut held: Vec<&Position> = portfolio.positions.values().filter(|p| p.is_open()).collect();
        held.sort_by(|a, b| a.symbol.cmp(&b.symbol));

        for position in held {
            let Some(quote) = quotes.get(&position.symbol) else {
                continue;
            };
            let advice = if self.strategy.advisor_exits {
                self.ask_advisor(quote, Some(position))
            } else {
                None
            };
            let input = EvaluationInput {
                symbol: &position.symbol,
                price: quote.price,
                position: Some(position),
                advice: advice.as_ref(),
                at: now,
            };
            match evaluate(&input, self.strategy) {
                Ok(signal) => self.execute(portfolio_id, signal, &mut available, report)?,
                Err(e) => warn!(portfolio_id, symbol = %position.symbol, error = %e, "evaluation rejected"),
            }
        }

        if available <= Decimal::ZERO {
            info!(portfolio_id, balance = %available, "no cash, managing existing positions only");
            return Ok(());
        }

        let candidates: Vec<&Quote> = filter_by_price_range(
            quotes.values(),
            self.strategy.min_price,
            self.strategy.max_price,
        )
        .into_iter()
        .filter(|q| !portfolio.has_position(&q.symbol))
        .take(self.strategy.max_buys_per_tick)
        .collect();
        debug!(portfolio_id, candidates = candidates.len(), "entry candidates");

        for quote in candidates {
            if available <= Decimal::ZERO {
                break;
            }
            let advice = self.ask_advisor(quote, None);
            let input = EvaluationInput {
                symbol: &quote.symbol,
                price: quote.price,
                position: None,
                advice: advice.as_ref(),
                at: now,
            };
            let mut signal = match evaluate(&input, self.strategy) {
                Ok(signal) => signal,
                Err(e) => {
                    warn!(portfolio_id, symbol = %quote.symbol, error = %e, "evaluation rejected");
                    continue;
                }
            };
            if let Some(rejection) = apply_affordability(&mut signal, available, self.strategy) {
                info!(portfolio_id, symbol = %quote.symbol, reason = %rejection, "buy downgraded to hold");
            }
            self.execute(portfolio_id, signal, &mut available, report)?;
        }

        Ok(())
    }

    fn ask_advisor(&self, quote: &Quote, position: Option<&Position>) -> Option<Advice> {
        let request = AdviceRequest { quote, position };
        match self.advisor.advise(&request) {
            Ok(advice) => {
                debug!(
                    symbol = %quote.symbol,
                    action = %advice.action,
                    confidence = advice.confidence,
                    "advice received"
                );
                Some(advice)
            }
            Err(e) => {
                warn!(symbol = %quote.symbol, error = %e, "advisor failed, treating as no advice");
                None
            }
        }
    }

    /// Apply an actionable signal as a trade, then record the signal.
    fn execute(
        &self,
        portfolio_id: i64,
        signal: Signal,
        available: &mut Decimal,
        report: &mut TickReport,
    ) -> Result<(), TraderError> {
        let mut executed = false;

        if let Some(action) = signal.action.trade_action().filter(|_| signal.is_actionable()) {
            let id = TradeId::new(portfolio_id, &report.tick_stamp, &signal.symbol, action);
            let applied = brokerage_for(signal.price, signal.quantity, self.strategy.brokerage_pct)
                .and_then(|brokerage| {
                    let trade = Trade {
                        id: id.clone(),
                        portfolio_id,
                        symbol: signal.symbol.clone(),
                        action,
                        quantity: signal.quantity,
                        price: signal.price,
                        brokerage,
                        executed_at: signal.created_at,
                        reason: signal.rationale.clone(),
                        realized_pnl: None,
                    };
                    self.store
                        .apply_trade(portfolio_id, &trade)
                        .map(|receipt| (trade, receipt))
                });

            match applied {
                Ok((mut trade, receipt)) => {
                    executed = true;
                    *available = receipt.balance_after;
                    trade.realized_pnl = receipt.realized_pnl;
                    info!(
                        portfolio_id,
                        trade_id = %trade.id,
                        action = %trade.action,
                        symbol = %trade.symbol,
                        quantity = trade.quantity,
                        price = %trade.price,
                        balance = %receipt.balance_after,
                        "trade applied"
                    );
                    report.trades.push(trade);
                }
                Err(e) if e.is_trade_rejection() => {
                    warn!(portfolio_id, trade_id = %id, error = %e, "trade rejected");
                    report.rejections.push(Rejection {
                        portfolio_id,
                        symbol: signal.symbol.clone(),
                        reason: e.to_string(),
                    });
                }
                Err(e) => return Err(e),
            }
        } else {
            debug!(portfolio_id, symbol = %signal.symbol, rationale = %signal.rationale, "hold");
        }

        self.store.record_signal(portfolio_id, &signal, executed)?;
        report.signals.push(PortfolioSignal {
            portfolio_id,
            signal,
            executed,
        });
        Ok(())
    }
}

fn log_report(report: &TickReport) {
    info!(
        tick = %report.tick_stamp,
        portfolios = report.portfolios,
        quotes = report.quotes_received,
        skipped = report.skipped_symbols.len(),
        signals = report.signals.len(),
        trades = report.trades.len(),
        rejections = report.rejections.len(),
        failed = report.failed_portfolios.len(),
        "tick complete"
    );
}
