//! Configuration validation.
//!
//! Checks every recognised key before the scheduler or a one-shot command
//! runs, so a bad value fails fast with the section and key named.

use crate::domain::error::TraderError;
use crate::domain::market_hours::{MarketHours, parse_time, parse_weekdays};
use crate::ports::config_port::ConfigPort;
use chrono_tz::Tz;
use rust_decimal::Decimal;

pub fn validate_strategy_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_price_band(config)?;
    validate_threshold(config)?;
    validate_lot_size(config)?;
    validate_min_confidence(config)?;
    validate_brokerage(config)?;
    validate_max_buys(config)?;
    Ok(())
}

pub fn validate_scheduler_config(config: &dyn ConfigPort) -> Result<(), TraderError> {
    validate_interval(config)?;
    validate_session(config)?;
    validate_weekdays(config)?;
    validate_timezone(config)?;
    Ok(())
}

fn invalid(section: &str, key: &str, reason: &str) -> TraderError {
    TraderError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn validate_price_band(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let min = config.get_decimal("strategy", "min_price", Decimal::from(75))?;
    let max = config.get_decimal("strategy", "max_price", Decimal::from(150))?;
    if min <= Decimal::ZERO {
        return Err(invalid("strategy", "min_price", "min_price must be positive"));
    }
    if max < min {
        return Err(invalid(
            "strategy",
            "max_price",
            "max_price must not be below min_price",
        ));
    }
    Ok(())
}

fn validate_threshold(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_decimal("strategy", "price_change_threshold", Decimal::from(2))?;
    if value <= Decimal::ZERO {
        return Err(invalid(
            "strategy",
            "price_change_threshold",
            "price_change_threshold must be positive",
        ));
    }
    Ok(())
}

fn validate_lot_size(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_int("strategy", "lot_size", 20);
    if value < 1 || value > i64::from(u32::MAX) {
        return Err(invalid("strategy", "lot_size", "lot_size must be at least 1"));
    }
    Ok(())
}

fn validate_min_confidence(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_int("strategy", "min_confidence", 60);
    if !(0..=100).contains(&value) {
        return Err(invalid(
            "strategy",
            "min_confidence",
            "min_confidence must be between 0 and 100",
        ));
    }
    Ok(())
}

fn validate_brokerage(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let value = config.get_decimal("strategy", "brokerage_pct", Decimal::ZERO)?;
    if value < Decimal::ZERO || value >= Decimal::ONE_HUNDRED {
        return Err(invalid(
            "strategy",
            "brokerage_pct",
            "brokerage_pct must be between 0 and 100",
        ));
    }
    Ok(())
}

fn validate_max_buys(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_int("strategy", "max_buys_per_tick", 3) < 0 {
        return Err(invalid(
            "strategy",
            "max_buys_per_tick",
            "max_buys_per_tick must be non-negative",
        ));
    }
    Ok(())
}

fn validate_interval(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if config.get_int("scheduler", "tick_interval_minutes", 10) < 1 {
        return Err(invalid(
            "scheduler",
            "tick_interval_minutes",
            "tick_interval_minutes must be at least 1",
        ));
    }
    if config.get_int("scheduler", "poll_seconds", 30) < 1 {
        return Err(invalid(
            "scheduler",
            "poll_seconds",
            "poll_seconds must be at least 1",
        ));
    }
    Ok(())
}

/// Open must precede close once defaults fill whichever side is unset.
fn validate_session(config: &dyn ConfigPort) -> Result<(), TraderError> {
    let defaults = MarketHours::default();
    let open = match config.get_string("scheduler", "market_open") {
        None => defaults.open,
        Some(s) => parse_time(&s).ok_or_else(|| {
            invalid("scheduler", "market_open", "expected HH:MM")
        })?,
    };
    let close = match config.get_string("scheduler", "market_close") {
        None => defaults.close,
        Some(s) => parse_time(&s).ok_or_else(|| {
            invalid("scheduler", "market_close", "expected HH:MM")
        })?,
    };
    if close <= open {
        return Err(invalid(
            "scheduler",
            "market_close",
            &format!("market_close {close} must be after market_open {open}"),
        ));
    }
    Ok(())
}

fn validate_weekdays(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(s) = config.get_string("scheduler", "active_weekdays") {
        parse_weekdays(&s)?;
    }
    Ok(())
}

fn validate_timezone(config: &dyn ConfigPort) -> Result<(), TraderError> {
    if let Some(s) = config.get_string("scheduler", "timezone") {
        s.trim()
            .parse::<Tz>()
            .map_err(|_| invalid("scheduler", "timezone", "unknown IANA timezone"))?;
    }
    Ok(())
}
