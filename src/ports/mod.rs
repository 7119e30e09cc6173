//! Port traits at the edges of the domain.

pub mod advisor_port;
pub mod clock;
pub mod config_port;
pub mod market_data_port;
pub mod portfolio_store;
