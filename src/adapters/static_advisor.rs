//! Advisor that answers every request with the same configured advice.

use crate::domain::advice::{Advice, AdviceAction};
use crate::domain::error::TraderError;
use crate::ports::advisor_port::{AdviceRequest, AdvisorPort};
use crate::ports::config_port::ConfigPort;

pub struct StaticAdvisor {
    advice: Advice,
}

impl StaticAdvisor {
    pub fn new(action: AdviceAction, confidence: u8) -> Self {
        Self {
            advice: Advice::new(action, confidence, "static advisor"),
        }
    }

    /// Reads `[advisor] action` (default HOLD) and `confidence` (default 0).
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let action = match config.get_string("advisor", "action") {
            None => AdviceAction::Hold,
            Some(s) => AdviceAction::parse(&s).map_err(|_| TraderError::ConfigInvalid {
                section: "advisor".into(),
                key: "action".into(),
                reason: format!("'{}' is not BUY, SELL or HOLD", s.trim()),
            })?,
        };

        let confidence = config.get_int("advisor", "confidence", 0);
        if !(0..=100).contains(&confidence) {
            return Err(TraderError::ConfigInvalid {
                section: "advisor".into(),
                key: "confidence".into(),
                reason: "confidence must be between 0 and 100".into(),
            });
        }

        Ok(Self::new(action, confidence as u8))
    }
}

impl AdvisorPort for StaticAdvisor {
    fn advise(&self, _request: &AdviceRequest) -> Result<Advice, TraderError> {
        Ok(self.advice.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;
    use crate::domain::symbol::Quote;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn answers_with_configured_advice() {
        let config =
            FileConfigAdapter::from_string("[advisor]\naction = buy\nconfidence = 80\n").unwrap();
        let advisor = StaticAdvisor::from_config(&config).unwrap();
        let quote = Quote::new("VMART", dec!(100), Utc::now());

        let advice = advisor
            .advise(&AdviceRequest {
                quote: &quote,
                position: None,
            })
            .unwrap();
        assert_eq!(advice.action, AdviceAction::Buy);
        assert_eq!(advice.confidence, 80);
    }

    #[test]
    fn defaults_to_hold_zero() {
        let config = FileConfigAdapter::from_string("[advisor]\nkind = static\n").unwrap();
        let advisor = StaticAdvisor::from_config(&config).unwrap();
        assert_eq!(advisor.advice.action, AdviceAction::Hold);
        assert_eq!(advisor.advice.confidence, 0);
    }

    #[test]
    fn rejects_bad_values() {
        let config = FileConfigAdapter::from_string("[advisor]\naction = maybe\n").unwrap();
        assert!(matches!(
            StaticAdvisor::from_config(&config),
            Err(TraderError::ConfigInvalid { .. })
        ));

        let config = FileConfigAdapter::from_string("[advisor]\nconfidence = 150\n").unwrap();
        assert!(matches!(
            StaticAdvisor::from_config(&config),
            Err(TraderError::ConfigInvalid { .. })
        ));
    }
}
