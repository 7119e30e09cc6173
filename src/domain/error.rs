//! Domain error types.

use rust_decimal::Decimal;

/// Top-level error type for smallcap-trader.
#[derive(Debug, thiserror::Error)]
pub enum TraderError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("store write failed: {reason}")]
    StoreWrite { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("market data unavailable: {reason}")]
    GatewayUnavailable { reason: String },

    #[error("advisor error: {reason}")]
    Advisor { reason: String },

    #[error("insufficient balance: need {required}, available {available}")]
    InsufficientBalance {
        required: Decimal,
        available: Decimal,
    },

    #[error("insufficient quantity for {symbol}: hold {held}, requested {requested}")]
    InsufficientQuantity {
        symbol: String,
        held: u32,
        requested: u32,
    },

    #[error("no open position for {symbol}")]
    NoPosition { symbol: String },

    #[error("trade {id} already applied")]
    DuplicateTrade { id: String },

    #[error("portfolio {id} not found")]
    PortfolioNotFound { id: i64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl TraderError {
    /// Rejections of a single trade that leave the portfolio untouched.
    pub fn is_trade_rejection(&self) -> bool {
        matches!(
            self,
            TraderError::InsufficientBalance { .. }
                | TraderError::InsufficientQuantity { .. }
                | TraderError::NoPosition { .. }
                | TraderError::DuplicateTrade { .. }
                | TraderError::InvalidInput { .. }
        )
    }
}

impl From<&TraderError> for std::process::ExitCode {
    fn from(err: &TraderError) -> Self {
        let code: u8 = match err {
            TraderError::Io(_) => 1,
            TraderError::ConfigParse { .. }
            | TraderError::ConfigMissing { .. }
            | TraderError::ConfigInvalid { .. } => 2,
            TraderError::Database { .. }
            | TraderError::DatabaseQuery { .. }
            | TraderError::StoreWrite { .. }
            | TraderError::PortfolioNotFound { .. } => 3,
            TraderError::InvalidInput { .. }
            | TraderError::InsufficientBalance { .. }
            | TraderError::InsufficientQuantity { .. }
            | TraderError::NoPosition { .. }
            | TraderError::DuplicateTrade { .. } => 4,
            TraderError::GatewayUnavailable { .. } | TraderError::Advisor { .. } => 5,
        };
        std::process::ExitCode::from(code)
    }
}
