//! Core domain types and logic.

pub mod advice;
pub mod config_validation;
pub mod error;
pub mod evaluator;
pub mod market_hours;
pub mod portfolio;
pub mod position;
pub mod scheduler;
pub mod screen;
pub mod signal;
pub mod strategy;
pub mod summary;
pub mod symbol;
pub mod trade;
