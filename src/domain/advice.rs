//! External confidence advice and parsing of free-form advisor replies.

use serde::Deserialize;
use std::fmt;

use super::error::TraderError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdviceAction {
    Buy,
    Sell,
    Hold,
}

impl AdviceAction {
    pub fn parse(s: &str) -> Result<Self, TraderError> {
        match s.trim().to_uppercase().as_str() {
            "BUY" => Ok(AdviceAction::Buy),
            "SELL" => Ok(AdviceAction::Sell),
            "HOLD" => Ok(AdviceAction::Hold),
            other => Err(TraderError::InvalidInput {
                reason: format!("unknown advice action '{other}'"),
            }),
        }
    }
}

impl fmt::Display for AdviceAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AdviceAction::Buy => "BUY",
            AdviceAction::Sell => "SELL",
            AdviceAction::Hold => "HOLD",
        };
        f.write_str(s)
    }
}

/// A recommendation with a confidence score in `0..=100`.
#[derive(Debug, Clone, PartialEq)]
pub struct Advice {
    pub action: AdviceAction,
    pub confidence: u8,
    pub reasoning: String,
}

impl Advice {
    pub fn new(action: AdviceAction, confidence: u8, reasoning: &str) -> Self {
        Advice {
            action,
            confidence: confidence.min(100),
            reasoning: reasoning.to_string(),
        }
    }

    pub fn buy(confidence: u8) -> Self {
        Advice::new(AdviceAction::Buy, confidence, "")
    }

    pub fn sell(confidence: u8) -> Self {
        Advice::new(AdviceAction::Sell, confidence, "")
    }

    pub fn hold(confidence: u8) -> Self {
        Advice::new(AdviceAction::Hold, confidence, "")
    }
}

#[derive(Deserialize)]
struct RawAdvice {
    #[serde(alias = "recommendation")]
    action: Option<String>,
    confidence: Option<serde_json::Value>,
    #[serde(alias = "reasons")]
    reasoning: Option<serde_json::Value>,
}

/// Turn an advisor's free-text reply into [`Advice`].
///
/// The first `{...}` span is read as JSON. Without one, the text is scanned
/// for BUY/SELL keywords. A JSON span that fails to parse yields HOLD at 0.
pub fn parse_advice(text: &str) -> Advice {
    let span = match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&text[start..=end]),
        _ => None,
    };

    let Some(json) = span else {
        let upper = text.to_uppercase();
        return if upper.contains("BUY") {
            Advice::new(AdviceAction::Buy, 60, "keyword fallback")
        } else if upper.contains("SELL") {
            Advice::new(AdviceAction::Sell, 60, "keyword fallback")
        } else {
            Advice::new(AdviceAction::Hold, 30, "keyword fallback")
        };
    };

    let raw: RawAdvice = match serde_json::from_str(json) {
        Ok(raw) => raw,
        Err(_) => return Advice::new(AdviceAction::Hold, 0, "unparseable advice"),
    };

    let action = raw
        .action
        .as_deref()
        .and_then(|a| AdviceAction::parse(a).ok())
        .unwrap_or(AdviceAction::Hold);
    let confidence = raw.confidence.as_ref().map_or(50, confidence_from_json);

    let reasoning = match raw.reasoning {
        Some(serde_json::Value::String(s)) => s,
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .map(|v| v.as_str().map_or_else(|| v.to_string(), str::to_string))
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => "advisor analysis".to_string(),
    };

    Advice::new(action, confidence, &reasoning)
}

fn confidence_from_json(value: &serde_json::Value) -> u8 {
    let n = match value {
        serde_json::Value::Number(n) => n.as_f64().unwrap_or(0.0),
        serde_json::Value::String(s) => s.trim().trim_end_matches('%').parse().unwrap_or(0.0),
        _ => 0.0,
    };
    n.clamp(0.0, 100.0) as u8
}
