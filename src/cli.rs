//! CLI definition and dispatch.

use chrono::Utc;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::adapters::csv_adapter::CsvQuoteAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::sqlite_adapter::SqlitePortfolioStore;
use crate::adapters::static_advisor::StaticAdvisor;
use crate::domain::config_validation::{validate_scheduler_config, validate_strategy_config};
use crate::domain::error::TraderError;
use crate::domain::market_hours::{MarketHours, parse_time, parse_weekdays};
use crate::domain::scheduler::{Scheduler, SchedulerConfig, ShutdownFlag, TickReport};
use crate::domain::screen::filter_by_price_range;
use crate::domain::strategy::StrategyConfig;
use crate::domain::summary::PortfolioSummary;
use crate::domain::symbol::parse_tickers;
use crate::ports::advisor_port::AdvisorPort;
use crate::ports::clock::{Clock, SystemClock};
use crate::ports::config_port::ConfigPort;
use crate::ports::market_data_port::MarketDataPort;
use crate::ports::portfolio_store::PortfolioStore;

const DEFAULT_BALANCE: i64 = 50_000;

#[derive(Parser, Debug)]
#[command(
    name = "smallcap-trader",
    about = "Scheduled small-cap paper trading strategy runner"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the database schema and a default portfolio
    Init {
        #[arg(short, long)]
        config: PathBuf,
        /// Starting balance of the default portfolio
        #[arg(long)]
        balance: Option<Decimal>,
    },
    /// Create an additional portfolio
    CreatePortfolio {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        name: String,
        #[arg(long)]
        balance: Decimal,
    },
    /// Run the scheduler until interrupted
    Run {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Run a single tick now
    Tick {
        #[arg(short, long)]
        config: PathBuf,
        /// Ignore the market-hours gate
        #[arg(long)]
        force: bool,
    },
    /// List universe symbols currently inside the price band
    Screen {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show balances, positions and trade statistics
    Status {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        portfolio: Option<i64>,
    },
    /// List recent trades of a portfolio
    Trades {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        portfolio: i64,
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Init { config, balance } => run_init(&config, balance),
        Command::CreatePortfolio {
            config,
            name,
            balance,
        } => run_create_portfolio(&config, &name, balance),
        Command::Run { config } => run_scheduler(&config),
        Command::Tick { config, force } => run_single_tick(&config, force),
        Command::Screen { config } => run_screen(&config),
        Command::Status { config, portfolio } => run_status(&config, portfolio),
        Command::Trades {
            config,
            portfolio,
            limit,
        } => run_trades(&config, portfolio, limit),
        Command::Validate { config } => run_validate(&config),
    }
}

fn fail(e: TraderError) -> ExitCode {
    eprintln!("error: {e}");
    (&e).into()
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(fail)
}

/// Install the global subscriber. `RUST_LOG` wins over `[logging] level`.
pub fn init_logging(config: &dyn ConfigPort) {
    let level = config
        .get_string("logging", "level")
        .unwrap_or_else(|| "info".to_string());
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.trim()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_target(true)
        .with_level(true)
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

pub fn build_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, TraderError> {
    validate_strategy_config(config)?;
    let defaults = StrategyConfig::default();

    Ok(StrategyConfig {
        min_price: config.get_decimal("strategy", "min_price", defaults.min_price)?,
        max_price: config.get_decimal("strategy", "max_price", defaults.max_price)?,
        price_change_threshold: config.get_decimal(
            "strategy",
            "price_change_threshold",
            defaults.price_change_threshold,
        )?,
        lot_size: config.get_int("strategy", "lot_size", i64::from(defaults.lot_size)) as u32,
        min_confidence: config.get_int(
            "strategy",
            "min_confidence",
            i64::from(defaults.min_confidence),
        ) as u8,
        brokerage_pct: config.get_decimal("strategy", "brokerage_pct", defaults.brokerage_pct)?,
        max_buys_per_tick: config.get_int(
            "strategy",
            "max_buys_per_tick",
            defaults.max_buys_per_tick as i64,
        ) as usize,
        advisor_exits: config.get_bool("strategy", "advisor_exits", defaults.advisor_exits),
    })
}

pub fn build_scheduler_config(config: &dyn ConfigPort) -> Result<SchedulerConfig, TraderError> {
    validate_scheduler_config(config)?;
    let defaults = MarketHours::default();

    let market_hours = MarketHours {
        timezone: match config.get_string("scheduler", "timezone") {
            Some(tz) => tz.trim().parse().map_err(|_| TraderError::ConfigInvalid {
                section: "scheduler".into(),
                key: "timezone".into(),
                reason: "unknown IANA timezone".into(),
            })?,
            None => defaults.timezone,
        },
        open: config
            .get_string("scheduler", "market_open")
            .and_then(|s| parse_time(&s))
            .unwrap_or(defaults.open),
        close: config
            .get_string("scheduler", "market_close")
            .and_then(|s| parse_time(&s))
            .unwrap_or(defaults.close),
        weekdays: match config.get_string("scheduler", "active_weekdays") {
            Some(s) => parse_weekdays(&s)?,
            None => defaults.weekdays,
        },
        market_hours_only: config.get_bool("scheduler", "market_hours_only", true),
        weekdays_only: config.get_bool("scheduler", "weekdays_only", true),
    };

    let minutes = config.get_int("scheduler", "tick_interval_minutes", 10) as u64;
    let poll = config.get_int("scheduler", "poll_seconds", 30) as u64;

    Ok(SchedulerConfig {
        tick_interval: Duration::from_secs(minutes.saturating_mul(60)),
        poll_interval: Duration::from_secs(poll),
        market_hours,
        universe: resolve_universe(config),
    })
}

pub fn resolve_universe(config: &dyn ConfigPort) -> Vec<String> {
    config
        .get_string("universe", "symbols")
        .map(|s| parse_tickers(&s))
        .unwrap_or_default()
}

pub fn build_advisor(config: &dyn ConfigPort) -> Result<Box<dyn AdvisorPort + Send>, TraderError> {
    let kind = config
        .get_string("advisor", "kind")
        .unwrap_or_else(|| "static".to_string());

    match kind.trim().to_lowercase().as_str() {
        "static" => Ok(Box::new(StaticAdvisor::from_config(config)?)),
        #[cfg(feature = "llm")]
        "llm" => Ok(Box::new(
            crate::adapters::llm_advisor::LlmAdvisor::from_config(config)?,
        )),
        #[cfg(not(feature = "llm"))]
        "llm" => Err(TraderError::ConfigInvalid {
            section: "advisor".into(),
            key: "kind".into(),
            reason: "built without the llm feature".into(),
        }),
        other => Err(TraderError::ConfigInvalid {
            section: "advisor".into(),
            key: "kind".into(),
            reason: format!("unknown advisor kind '{other}'"),
        }),
    }
}

pub fn build_market_data(config: &dyn ConfigPort) -> Result<CsvQuoteAdapter, TraderError> {
    let path = config
        .get_string("market_data", "quotes_path")
        .ok_or_else(|| TraderError::ConfigMissing {
            section: "market_data".into(),
            key: "quotes_path".into(),
        })?;
    Ok(CsvQuoteAdapter::new(PathBuf::from(path.trim())))
}

pub fn open_store(config: &dyn ConfigPort) -> Result<SqlitePortfolioStore, TraderError> {
    let store = SqlitePortfolioStore::from_config(config)?;
    store.initialize_schema()?;
    Ok(store)
}

/// Everything a scheduler needs, owned so it can move onto a worker thread.
pub struct Services {
    pub store: SqlitePortfolioStore,
    pub market_data: CsvQuoteAdapter,
    pub advisor: Box<dyn AdvisorPort + Send>,
    pub strategy: StrategyConfig,
    pub scheduler: SchedulerConfig,
}

pub fn build_services(config: &dyn ConfigPort) -> Result<Services, TraderError> {
    Ok(Services {
        strategy: build_strategy_config(config)?,
        scheduler: build_scheduler_config(config)?,
        advisor: build_advisor(config)?,
        market_data: build_market_data(config)?,
        store: open_store(config)?,
    })
}

fn run_init(config_path: &Path, balance: Option<Decimal>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };

    let existing = match store.get_active_portfolios() {
        Ok(ids) => ids,
        Err(e) => return fail(e),
    };
    if !existing.is_empty() {
        eprintln!(
            "Schema ready, {} active portfolio(s) already present",
            existing.len()
        );
        return ExitCode::SUCCESS;
    }

    let balance = balance.unwrap_or(Decimal::from(DEFAULT_BALANCE));
    match store.create_portfolio("Default Portfolio", balance) {
        Ok(id) => {
            println!("{id}");
            eprintln!("Created portfolio {id} with balance {balance}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn run_create_portfolio(config_path: &Path, name: &str, balance: Decimal) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    match store.create_portfolio(name, balance) {
        Ok(id) => {
            println!("{id}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

/// System clock whose sleeps end early once shutdown is requested.
struct InterruptibleClock {
    shutdown: ShutdownFlag,
}

impl Clock for InterruptibleClock {
    fn now(&self) -> chrono::DateTime<Utc> {
        SystemClock.now()
    }

    fn sleep(&self, duration: Duration) {
        let step = Duration::from_millis(250);
        let mut remaining = duration;
        while !remaining.is_zero() && !self.shutdown.is_requested() {
            let slice = remaining.min(step);
            SystemClock.sleep(slice);
            remaining -= slice;
        }
    }
}

fn run_scheduler(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let services = match build_services(&config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };
    if services.scheduler.universe.is_empty() {
        warn!("universe is empty, only held positions will be evaluated");
    }

    let tokio_rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => return fail(TraderError::Io(e)),
    };

    let shutdown = ShutdownFlag::new();
    tokio_rt.block_on(async {
        let loop_flag = shutdown.clone();
        let worker = tokio::task::spawn_blocking(move || {
            let clock = InterruptibleClock {
                shutdown: loop_flag.clone(),
            };
            let scheduler = Scheduler::new(
                &services.store,
                &services.market_data,
                services.advisor.as_ref(),
                &services.strategy,
                &services.scheduler,
            );
            scheduler.run_forever(&clock, &loop_flag)
        });

        let signal_flag = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, stopping after the current step");
                signal_flag.request();
            }
        });

        match worker.await {
            Ok(state) => {
                info!(?state, "scheduler exited");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("error: scheduler thread failed: {e}");
                ExitCode::from(1)
            }
        }
    })
}

fn print_tick_report(report: &TickReport) {
    if let Some(reason) = &report.store_error {
        eprintln!("Tick {} aborted: {}", report.tick_stamp, reason);
        return;
    }
    if let Some(reason) = &report.gateway_error {
        eprintln!("Tick {} skipped: {}", report.tick_stamp, reason);
        return;
    }
    eprintln!(
        "Tick {}: {} portfolio(s), {} quote(s), {} signal(s), {} trade(s)",
        report.tick_stamp,
        report.portfolios,
        report.quotes_received,
        report.signals.len(),
        report.trades.len()
    );
    for symbol in &report.skipped_symbols {
        eprintln!("  no quote: {symbol}");
    }
    for entry in &report.signals {
        let s = &entry.signal;
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            entry.portfolio_id,
            s.symbol,
            s.action,
            s.quantity,
            s.price,
            if entry.executed { "executed" } else { "-" },
            s.rationale
        );
    }
    for rejection in &report.rejections {
        eprintln!(
            "  rejected {} in portfolio {}: {}",
            rejection.symbol, rejection.portfolio_id, rejection.reason
        );
    }
    for (id, reason) in &report.failed_portfolios {
        eprintln!("  portfolio {id} failed: {reason}");
    }
}

fn run_single_tick(config_path: &Path, force: bool) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let services = match build_services(&config) {
        Ok(r) => r,
        Err(e) => return fail(e),
    };

    let now = Utc::now();
    if !force && !services.scheduler.market_hours.is_open(now) {
        eprintln!("Market closed, nothing to do (use --force to tick anyway)");
        return ExitCode::SUCCESS;
    }

    let scheduler = Scheduler::new(
        &services.store,
        &services.market_data,
        services.advisor.as_ref(),
        &services.strategy,
        &services.scheduler,
    );
    let report = scheduler.run_tick(now, &ShutdownFlag::new());
    print_tick_report(&report);

    if report.store_error.is_some() {
        return ExitCode::from(3);
    }
    match &report.gateway_error {
        Some(reason) => fail(TraderError::GatewayUnavailable {
            reason: reason.clone(),
        }),
        None if !report.failed_portfolios.is_empty() => ExitCode::from(3),
        None => ExitCode::SUCCESS,
    }
}

fn run_screen(config_path: &Path) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let strategy = match build_strategy_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let market_data = match build_market_data(&config) {
        Ok(m) => m,
        Err(e) => return fail(e),
    };
    let universe = resolve_universe(&config);
    if universe.is_empty() {
        return fail(TraderError::ConfigMissing {
            section: "universe".into(),
            key: "symbols".into(),
        });
    }

    let quotes = match market_data.get_quotes(&universe) {
        Ok(q) => q,
        Err(e) => return fail(e),
    };
    let in_band = filter_by_price_range(quotes.values(), strategy.min_price, strategy.max_price);
    for quote in &in_band {
        println!("{}\t{}\t{}", quote.symbol, quote.price, quote.volume);
    }
    eprintln!(
        "{} of {} symbol(s) priced between {} and {}",
        in_band.len(),
        universe.len(),
        strategy.min_price,
        strategy.max_price
    );
    ExitCode::SUCCESS
}

fn run_status(config_path: &Path, portfolio: Option<i64>) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let ids = match portfolio {
        Some(id) => vec![id],
        None => match store.get_active_portfolios() {
            Ok(ids) => ids,
            Err(e) => return fail(e),
        },
    };
    if ids.is_empty() {
        eprintln!("No active portfolios (run init first)");
        return ExitCode::SUCCESS;
    }

    for id in ids {
        if let Err(e) = print_status(&store, id) {
            return fail(e);
        }
    }
    ExitCode::SUCCESS
}

fn print_status(store: &SqlitePortfolioStore, portfolio_id: i64) -> Result<(), TraderError> {
    let portfolio = store.get_portfolio(portfolio_id)?;
    let trades = store.list_trades(portfolio_id, usize::MAX)?;
    let summary = PortfolioSummary::compute(&portfolio, &trades)?;

    let mut last_prices = HashMap::new();
    for symbol in portfolio.positions.keys() {
        if let Some(price) = store.get_symbol(symbol)?.and_then(|s| s.last_price) {
            last_prices.insert(symbol.clone(), price);
        }
    }

    println!("Portfolio {} ({})", portfolio.id, portfolio.name);
    println!(
        "  balance {} (initial {})",
        summary.current_balance, summary.initial_balance
    );
    match portfolio.total_value(&last_prices) {
        Ok(total) => println!(
            "  total value {} ({} of {} positions priced)",
            total,
            last_prices.len(),
            summary.open_positions
        ),
        Err(e) => println!("  total value - ({e})"),
    }
    println!(
        "  trades {} ({} buy, {} sell), won {}, lost {}, win rate {}%",
        summary.total_trades,
        summary.buy_trades,
        summary.sell_trades,
        summary.trades_won,
        summary.trades_lost,
        summary.win_rate
    );
    println!(
        "  realized P&L {} on {} invested ({}%)",
        summary.realized_pnl, summary.total_invested, summary.profit_pct
    );

    let mut positions: Vec<_> = portfolio.positions.values().collect();
    positions.sort_by(|a, b| a.symbol.cmp(&b.symbol));
    for pos in positions {
        match last_prices.get(&pos.symbol) {
            Some(&price) => println!(
                "  {:<12} {:>6} @ {:<10} last {:<10} P&L {} ({}%)",
                pos.symbol,
                pos.quantity,
                pos.average_price,
                price,
                pos.unrealized_pnl(price)
                    .map(|p| p.round_dp(2).to_string())
                    .unwrap_or_else(|| "-".into()),
                pos.unrealized_pnl_pct(price)
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "-".into())
            ),
            None => println!(
                "  {:<12} {:>6} @ {:<10} last -",
                pos.symbol, pos.quantity, pos.average_price
            ),
        }
    }
    Ok(())
}

fn run_trades(config_path: &Path, portfolio_id: i64, limit: usize) -> ExitCode {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };
    init_logging(&config);

    let store = match open_store(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    if let Err(e) = store.get_portfolio(portfolio_id) {
        return fail(e);
    }
    let trades = match store.list_trades(portfolio_id, limit) {
        Ok(t) => t,
        Err(e) => return fail(e),
    };

    for trade in &trades {
        println!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            trade.executed_at.format("%Y-%m-%d %H:%M"),
            trade.action,
            trade.symbol,
            trade.quantity,
            trade.price,
            trade
                .realized_pnl
                .map(|p| p.to_string())
                .unwrap_or_else(|| "-".into()),
            trade.reason
        );
    }
    eprintln!("{} trade(s)", trades.len());
    ExitCode::SUCCESS
}

fn run_validate(config_path: &Path) -> ExitCode {
    eprintln!("Validating config: {}", config_path.display());
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(code) => return code,
    };

    let strategy = match build_strategy_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    let scheduler = match build_scheduler_config(&config) {
        Ok(s) => s,
        Err(e) => return fail(e),
    };
    if let Err(e) = build_advisor(&config) {
        return fail(e);
    }
    if let Err(e) = build_market_data(&config) {
        return fail(e);
    }
    if config.get_string("sqlite", "path").is_none() {
        return fail(TraderError::ConfigMissing {
            section: "sqlite".into(),
            key: "path".into(),
        });
    }

    eprintln!(
        "  price band {} - {}, exit at +/-{}, lot {}, min confidence {}",
        strategy.min_price,
        strategy.max_price,
        strategy.price_change_threshold,
        strategy.lot_size,
        strategy.min_confidence
    );
    eprintln!(
        "  every {} min, {} - {} {}, {} symbol(s)",
        scheduler.tick_interval.as_secs() / 60,
        scheduler.market_hours.open.format("%H:%M"),
        scheduler.market_hours.close.format("%H:%M"),
        scheduler.market_hours.timezone,
        scheduler.universe.len()
    );
    eprintln!("\nConfiguration is valid");
    ExitCode::SUCCESS
}
