//! Configuration access port trait.

use crate::domain::error::TraderError;
use rust_decimal::Decimal;
use std::str::FromStr;

/// Sectioned key/value settings. Blank values read as absent.
pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str, default: i64) -> i64;
    fn get_bool(&self, section: &str, key: &str, default: bool) -> bool;

    /// Money and thresholds are read as exact decimals. A present but
    /// unparseable value is an error rather than the default.
    fn get_decimal(
        &self,
        section: &str,
        key: &str,
        default: Decimal,
    ) -> Result<Decimal, TraderError> {
        match self.get_string(section, key) {
            None => Ok(default),
            Some(s) => Decimal::from_str(s.trim()).map_err(|_| TraderError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("'{}' is not a decimal number", s.trim()),
            }),
        }
    }
}
