//! SQLite portfolio store.
//!
//! Money columns are stored as TEXT so decimals round-trip exactly.
//! Timestamps are RFC 3339 strings in UTC.

use crate::domain::error::TraderError;
use crate::domain::portfolio::{Portfolio, TradeReceipt};
use crate::domain::position::Position;
use crate::domain::signal::Signal;
use crate::domain::symbol::{Quote, Symbol};
use crate::domain::trade::{Trade, TradeAction, TradeId};
use crate::ports::config_port::ConfigPort;
use crate::ports::portfolio_store::PortfolioStore;
use chrono::{DateTime, SecondsFormat, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, TransactionBehavior, params};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;

pub struct SqlitePortfolioStore {
    pool: Pool<SqliteConnectionManager>,
}

fn query_err(e: rusqlite::Error) -> TraderError {
    TraderError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn write_err(e: rusqlite::Error) -> TraderError {
    TraderError::StoreWrite {
        reason: e.to_string(),
    }
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

fn decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let raw: String = row.get(idx)?;
    Decimal::from_str(&raw)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn opt_decimal_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    match row.get::<_, Option<String>>(idx)? {
        None => Ok(None),
        Some(raw) => Decimal::from_str(&raw).map(Some).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        }),
    }
}

fn time_col(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn position_from_row(row: &Row<'_>) -> rusqlite::Result<Position> {
    Ok(Position {
        portfolio_id: row.get(0)?,
        symbol: row.get(1)?,
        quantity: row.get(2)?,
        average_price: decimal_col(row, 3)?,
        invested_amount: decimal_col(row, 4)?,
        opened_at: time_col(row, 5)?,
    })
}

fn trade_from_row(row: &Row<'_>) -> rusqlite::Result<Trade> {
    let action: String = row.get(3)?;
    let action = TradeAction::from_str(&action)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, Type::Text, Box::new(e)))?;
    Ok(Trade {
        id: TradeId::from_raw(row.get::<_, String>(0)?),
        portfolio_id: row.get(1)?,
        symbol: row.get(2)?,
        action,
        quantity: row.get(4)?,
        price: decimal_col(row, 5)?,
        brokerage: decimal_col(row, 6)?,
        executed_at: time_col(row, 7)?,
        reason: row.get(8)?,
        realized_pnl: opt_decimal_col(row, 9)?,
    })
}

fn load_positions(conn: &Connection, portfolio_id: i64) -> Result<Vec<Position>, TraderError> {
    let mut stmt = conn
        .prepare(
            "SELECT portfolio_id, symbol, quantity, average_price, invested_amount, opened_at
             FROM positions
             WHERE portfolio_id = ?1 AND quantity > 0
             ORDER BY symbol",
        )
        .map_err(query_err)?;
    let rows = stmt
        .query_map(params![portfolio_id], position_from_row)
        .map_err(query_err)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
}

fn load_portfolio(conn: &Connection, portfolio_id: i64) -> Result<Portfolio, TraderError> {
    let header = conn
        .query_row(
            "SELECT id, name, initial_balance, current_balance, is_active
             FROM portfolios WHERE id = ?1",
            params![portfolio_id],
            |row| {
                Ok(Portfolio {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    initial_balance: decimal_col(row, 2)?,
                    current_balance: decimal_col(row, 3)?,
                    is_active: row.get(4)?,
                    positions: HashMap::new(),
                })
            },
        )
        .optional()
        .map_err(query_err)?;

    let mut portfolio = header.ok_or(TraderError::PortfolioNotFound { id: portfolio_id })?;
    portfolio.positions = load_positions(conn, portfolio_id)?
        .into_iter()
        .map(|p| (p.symbol.clone(), p))
        .collect();
    Ok(portfolio)
}

impl SqlitePortfolioStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| TraderError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).clamp(1, 64) as u32;

        let manager = SqliteConnectionManager::file(&db_path).with_init(|c| {
            c.execute_batch("PRAGMA foreign_keys = ON; PRAGMA busy_timeout = 5000;")
        });
        let pool =
            Pool::builder()
                .max_size(pool_size)
                .build(manager)
                .map_err(|e: r2d2::Error| TraderError::Database {
                    reason: e.to_string(),
                })?;

        Ok(Self { pool })
    }

    pub fn in_memory() -> Result<Self, TraderError> {
        let manager =
            SqliteConnectionManager::memory().with_init(|c| c.execute_batch("PRAGMA foreign_keys = ON;"));
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e: r2d2::Error| TraderError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, TraderError> {
        self.pool.get().map_err(|e: r2d2::Error| TraderError::Database {
            reason: e.to_string(),
        })
    }

    pub fn initialize_schema(&self) -> Result<(), TraderError> {
        let conn = self.conn()?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS portfolios (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL,
                initial_balance TEXT NOT NULL,
                current_balance TEXT NOT NULL,
                is_active INTEGER NOT NULL DEFAULT 1,
                created_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS positions (
                portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
                symbol TEXT NOT NULL,
                quantity INTEGER NOT NULL CHECK (quantity >= 0),
                average_price TEXT NOT NULL,
                invested_amount TEXT NOT NULL,
                opened_at TEXT NOT NULL,
                PRIMARY KEY (portfolio_id, symbol)
            );
            CREATE TABLE IF NOT EXISTS trades (
                id TEXT PRIMARY KEY,
                portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                brokerage TEXT NOT NULL,
                executed_at TEXT NOT NULL,
                reason TEXT NOT NULL,
                realized_pnl TEXT
            );
            CREATE INDEX IF NOT EXISTS idx_trades_portfolio ON trades(portfolio_id, executed_at);
            CREATE TABLE IF NOT EXISTS signals (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                portfolio_id INTEGER NOT NULL REFERENCES portfolios(id),
                symbol TEXT NOT NULL,
                action TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                confidence INTEGER,
                rationale TEXT NOT NULL,
                exit_reason TEXT,
                executed INTEGER NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_signals_portfolio ON signals(portfolio_id, created_at);
            CREATE TABLE IF NOT EXISTS symbols (
                ticker TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                last_price TEXT,
                updated_at TEXT
            );",
        )
        .map_err(query_err)?;

        Ok(())
    }

    /// Number of signals recorded for a portfolio.
    pub fn count_signals(&self, portfolio_id: i64) -> Result<usize, TraderError> {
        let conn = self.conn()?;
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM signals WHERE portfolio_id = ?1",
                params![portfolio_id],
                |row| row.get(0),
            )
            .map_err(query_err)?;
        Ok(count as usize)
    }
}

impl PortfolioStore for SqlitePortfolioStore {
    fn create_portfolio(&self, name: &str, initial_balance: Decimal) -> Result<i64, TraderError> {
        if name.trim().is_empty() {
            return Err(TraderError::InvalidInput {
                reason: "portfolio name must not be empty".into(),
            });
        }
        if initial_balance <= Decimal::ZERO {
            return Err(TraderError::InvalidInput {
                reason: format!("initial balance must be positive, got {initial_balance}"),
            });
        }

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO portfolios (name, initial_balance, current_balance, is_active, created_at)
             VALUES (?1, ?2, ?2, 1, ?3)",
            params![
                name.trim(),
                initial_balance.to_string(),
                timestamp(&Utc::now())
            ],
        )
        .map_err(write_err)?;
        Ok(conn.last_insert_rowid())
    }

    fn set_portfolio_active(&self, portfolio_id: i64, active: bool) -> Result<(), TraderError> {
        let conn = self.conn()?;
        let changed = conn
            .execute(
                "UPDATE portfolios SET is_active = ?1 WHERE id = ?2",
                params![active, portfolio_id],
            )
            .map_err(write_err)?;
        if changed == 0 {
            return Err(TraderError::PortfolioNotFound { id: portfolio_id });
        }
        Ok(())
    }

    fn get_active_portfolios(&self) -> Result<Vec<i64>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id FROM portfolios WHERE is_active = 1 ORDER BY id")
            .map_err(query_err)?;
        let rows = stmt.query_map([], |row| row.get(0)).map_err(query_err)?;
        rows.collect::<Result<Vec<i64>, _>>().map_err(query_err)
    }

    fn get_portfolio(&self, portfolio_id: i64) -> Result<Portfolio, TraderError> {
        let conn = self.conn()?;
        load_portfolio(&conn, portfolio_id)
    }

    fn get_positions(&self, portfolio_id: i64) -> Result<Vec<Position>, TraderError> {
        let conn = self.conn()?;
        load_positions(&conn, portfolio_id)
    }

    fn apply_trade(&self, portfolio_id: i64, trade: &Trade) -> Result<TradeReceipt, TraderError> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(query_err)?;

        let seen: Option<i64> = tx
            .query_row(
                "SELECT 1 FROM trades WHERE id = ?1",
                params![trade.id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(query_err)?;
        if seen.is_some() {
            return Err(TraderError::DuplicateTrade {
                id: trade.id.to_string(),
            });
        }

        let mut portfolio = load_portfolio(&tx, portfolio_id)?;
        let receipt = portfolio.apply(trade)?;

        tx.execute(
            "INSERT INTO trades (id, portfolio_id, symbol, action, quantity, price, brokerage,
                                 executed_at, reason, realized_pnl)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                trade.id.as_str(),
                portfolio_id,
                trade.symbol,
                trade.action.as_str(),
                trade.quantity,
                trade.price.to_string(),
                trade.brokerage.to_string(),
                timestamp(&trade.executed_at),
                trade.reason,
                receipt.realized_pnl.map(|p| p.to_string()),
            ],
        )
        .map_err(write_err)?;

        tx.execute(
            "UPDATE portfolios SET current_balance = ?1 WHERE id = ?2",
            params![receipt.balance_after.to_string(), portfolio_id],
        )
        .map_err(write_err)?;

        match &receipt.position_after {
            Some(pos) => {
                tx.execute(
                    "INSERT INTO positions (portfolio_id, symbol, quantity, average_price,
                                            invested_amount, opened_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                     ON CONFLICT (portfolio_id, symbol) DO UPDATE SET
                        quantity = excluded.quantity,
                        average_price = excluded.average_price,
                        invested_amount = excluded.invested_amount",
                    params![
                        portfolio_id,
                        pos.symbol,
                        pos.quantity,
                        pos.average_price.to_string(),
                        pos.invested_amount.to_string(),
                        timestamp(&pos.opened_at),
                    ],
                )
                .map_err(write_err)?;
            }
            None => {
                tx.execute(
                    "DELETE FROM positions WHERE portfolio_id = ?1 AND symbol = ?2",
                    params![portfolio_id, trade.symbol],
                )
                .map_err(write_err)?;
            }
        }

        tx.commit().map_err(write_err)?;
        Ok(receipt)
    }

    fn record_signal(
        &self,
        portfolio_id: i64,
        signal: &Signal,
        executed: bool,
    ) -> Result<(), TraderError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO signals (portfolio_id, symbol, action, quantity, price, confidence,
                                  rationale, exit_reason, executed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                portfolio_id,
                signal.symbol,
                signal.action.as_str(),
                signal.quantity,
                signal.price.to_string(),
                signal.confidence,
                signal.rationale,
                signal.exit_reason.map(|r| r.as_str()),
                executed,
                timestamp(&signal.created_at),
            ],
        )
        .map_err(write_err)?;
        Ok(())
    }

    fn list_trades(&self, portfolio_id: i64, limit: usize) -> Result<Vec<Trade>, TraderError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT id, portfolio_id, symbol, action, quantity, price, brokerage,
                        executed_at, reason, realized_pnl
                 FROM trades
                 WHERE portfolio_id = ?1
                 ORDER BY executed_at DESC, rowid DESC
                 LIMIT ?2",
            )
            .map_err(query_err)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = stmt
            .query_map(params![portfolio_id, limit], trade_from_row)
            .map_err(query_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(query_err)
    }

    fn refresh_symbols(&self, quotes: &[Quote]) -> Result<(), TraderError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_err)?;
        for quote in quotes {
            tx.execute(
                "INSERT INTO symbols (ticker, name, last_price, updated_at)
                 VALUES (?1, ?1, ?2, ?3)
                 ON CONFLICT (ticker) DO UPDATE SET
                    last_price = excluded.last_price,
                    updated_at = excluded.updated_at",
                params![
                    quote.symbol,
                    quote.price.to_string(),
                    timestamp(&quote.timestamp)
                ],
            )
            .map_err(write_err)?;
        }
        tx.commit().map_err(write_err)?;
        Ok(())
    }

    fn get_symbol(&self, ticker: &str) -> Result<Option<Symbol>, TraderError> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT ticker, name, last_price, updated_at FROM symbols WHERE ticker = ?1",
            params![ticker],
            |row| {
                let updated_at = match row.get::<_, Option<String>>(3)? {
                    None => None,
                    Some(_) => Some(time_col(row, 3)?),
                };
                Ok(Symbol {
                    ticker: row.get(0)?,
                    name: row.get(1)?,
                    last_price: opt_decimal_col(row, 2)?,
                    updated_at,
                })
            },
        )
        .optional()
        .map_err(query_err)
    }
}
