//! Signal evaluation.
//!
//! Held symbols are checked against the exit rules, unheld symbols against
//! the entry rule. A held symbol never produces a BUY.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

use super::advice::{Advice, AdviceAction};
use super::error::TraderError;
use super::position::Position;
use super::signal::{ExitReason, Signal, SignalAction};
use super::strategy::StrategyConfig;
use super::trade::{brokerage_for, notional, overflow};

/// Everything one evaluation looks at.
#[derive(Debug, Clone)]
pub struct EvaluationInput<'a> {
    pub symbol: &'a str,
    pub price: Decimal,
    pub position: Option<&'a Position>,
    pub advice: Option<&'a Advice>,
    pub at: DateTime<Utc>,
}

pub fn evaluate(input: &EvaluationInput, config: &StrategyConfig) -> Result<Signal, TraderError> {
    if input.symbol.trim().is_empty() {
        return Err(TraderError::InvalidInput {
            reason: "symbol is empty".into(),
        });
    }
    if input.price <= Decimal::ZERO {
        return Err(TraderError::InvalidInput {
            reason: format!("{}: price must be positive, got {}", input.symbol, input.price),
        });
    }

    let signal = match input.position.filter(|p| p.is_open()) {
        Some(position) => evaluate_exit(input, position, config)?,
        None => evaluate_entry(input, config),
    };
    if signal.is_actionable() {
        buy_cost(&signal, config)?;
    }
    Ok(signal)
}

fn evaluate_exit(
    input: &EvaluationInput,
    position: &Position,
    config: &StrategyConfig,
) -> Result<Signal, TraderError> {
    if position.average_price <= Decimal::ZERO {
        return Err(TraderError::InvalidInput {
            reason: format!(
                "{}: average price must be positive, got {}",
                input.symbol, position.average_price
            ),
        });
    }

    let delta = input
        .price
        .checked_sub(position.average_price)
        .ok_or_else(|| overflow(&format!("{} move from average", input.symbol)))?;
    if delta.abs() >= config.price_change_threshold {
        return Ok(Signal {
            symbol: input.symbol.to_string(),
            action: SignalAction::Sell,
            quantity: position.quantity,
            price: input.price,
            confidence: input.advice.map(|a| a.confidence),
            rationale: format!(
                "moved {} from average {} (threshold {})",
                delta, position.average_price, config.price_change_threshold
            ),
            exit_reason: Some(ExitReason::PriceRule),
            created_at: input.at,
        });
    }

    if let Some(advice) = input.advice {
        if advice.action == AdviceAction::Sell && advice.confidence >= config.min_confidence {
            return Ok(Signal {
                symbol: input.symbol.to_string(),
                action: SignalAction::Sell,
                quantity: position.quantity,
                price: input.price,
                confidence: Some(advice.confidence),
                rationale: format!("advisor SELL at {}%: {}", advice.confidence, advice.reasoning),
                exit_reason: Some(ExitReason::Advisor),
                created_at: input.at,
            });
        }
    }

    let mut signal = Signal::hold(
        input.symbol,
        input.price,
        format!(
            "moved {} from average {}, below threshold {}",
            delta, position.average_price, config.price_change_threshold
        ),
        input.at,
    );
    signal.confidence = input.advice.map(|a| a.confidence);
    Ok(signal)
}

fn evaluate_entry(input: &EvaluationInput, config: &StrategyConfig) -> Signal {
    if !config.in_price_band(input.price) {
        return Signal::hold(
            input.symbol,
            input.price,
            format!(
                "price {} outside band {}-{}",
                input.price, config.min_price, config.max_price
            ),
            input.at,
        );
    }

    let Some(advice) = input.advice else {
        return Signal::hold(
            input.symbol,
            input.price,
            "no confidence score".into(),
            input.at,
        );
    };

    if advice.action == AdviceAction::Buy && advice.confidence >= config.min_confidence {
        return Signal {
            symbol: input.symbol.to_string(),
            action: SignalAction::Buy,
            quantity: config.lot_size,
            price: input.price,
            confidence: Some(advice.confidence),
            rationale: format!(
                "in band, advisor BUY at {}% (min {}%)",
                advice.confidence, config.min_confidence
            ),
            exit_reason: None,
            created_at: input.at,
        };
    }

    let mut signal = Signal::hold(
        input.symbol,
        input.price,
        format!(
            "advisor {} at {}% (min {}%)",
            advice.action, advice.confidence, config.min_confidence
        ),
        input.at,
    );
    signal.confidence = Some(advice.confidence);
    signal
}

/// Cost of filling a BUY signal, brokerage included. Fails when the fill
/// value is out of range.
pub fn buy_cost(signal: &Signal, config: &StrategyConfig) -> Result<Decimal, TraderError> {
    let gross = notional(signal.price, signal.quantity)?;
    let brokerage = brokerage_for(signal.price, signal.quantity, config.brokerage_pct)?;
    gross
        .checked_add(brokerage)
        .ok_or_else(|| overflow(&format!("cost of {} {}", signal.quantity, signal.symbol)))
}

/// Downgrade a BUY to HOLD when `available` cannot cover it. Returns the
/// rejection as an error value for logging; the signal itself is mutated.
pub fn apply_affordability(
    signal: &mut Signal,
    available: Decimal,
    config: &StrategyConfig,
) -> Option<TraderError> {
    if signal.action != SignalAction::Buy {
        return None;
    }
    let required = match buy_cost(signal, config) {
        Ok(required) => required,
        Err(e) => {
            signal.downgrade(&e.to_string());
            return Some(e);
        }
    };
    if required <= available {
        return None;
    }
    signal.downgrade(&format!(
        "insufficient balance: need {required}, available {available}"
    ));
    Some(TraderError::InsufficientBalance {
        required,
        available,
    })
}
