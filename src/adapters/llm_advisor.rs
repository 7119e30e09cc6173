//! Advisor backed by an OpenAI-compatible chat completions endpoint.

use crate::domain::advice::{Advice, parse_advice};
use crate::domain::error::TraderError;
use crate::ports::advisor_port::{AdviceRequest, AdvisorPort};
use crate::ports::config_port::ConfigPort;
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    content: Option<String>,
}

pub struct LlmAdvisor {
    client: Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl LlmAdvisor {
    /// Reads `[advisor] endpoint`, `model`, `api_key_env` and
    /// `timeout_seconds`. The key itself comes from the named environment
    /// variable and is optional for local endpoints.
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, TraderError> {
        let endpoint = config
            .get_string("advisor", "endpoint")
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let model = config
            .get_string("advisor", "model")
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let api_key = config
            .get_string("advisor", "api_key_env")
            .and_then(|var| std::env::var(var.trim()).ok())
            .filter(|k| !k.is_empty());
        let timeout = config.get_int("advisor", "timeout_seconds", 30).max(1) as u64;

        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .build()
            .map_err(|e| TraderError::Advisor {
                reason: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            endpoint,
            model,
            api_key,
        })
    }

    fn prompt(request: &AdviceRequest) -> String {
        let quote = request.quote;
        let mut prompt = format!(
            "Analyze this small cap Indian stock for a trading decision.\n\
             Stock: {}\nCurrent price: {}\nVolume: {}\n",
            quote.symbol, quote.price, quote.volume
        );
        if let (Some(open), Some(high), Some(low)) = (quote.open, quote.high, quote.low) {
            prompt.push_str(&format!("Session open {open}, high {high}, low {low}\n"));
        }
        if let Some(pos) = request.position {
            prompt.push_str(&format!(
                "Currently held: {} shares at average {}\n",
                pos.quantity, pos.average_price
            ));
        }
        prompt.push_str(
            "Respond in JSON with keys: action (BUY, SELL or HOLD), \
             confidence (0-100), reasoning.",
        );
        prompt
    }
}

impl AdvisorPort for LlmAdvisor {
    fn advise(&self, request: &AdviceRequest) -> Result<Advice, TraderError> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: Self::prompt(request),
            }],
            max_tokens: 500,
            temperature: 0.3,
        };

        let mut http = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            http = http.bearer_auth(key);
        }

        let response = http
            .send()
            .and_then(|r| r.error_for_status())
            .map_err(|e| TraderError::Advisor {
                reason: format!("{}: {e}", request.quote.symbol),
            })?;
        let reply: ChatResponse = response.json().map_err(|e| TraderError::Advisor {
            reason: format!("{}: unreadable response: {e}", request.quote.symbol),
        })?;

        let content = reply
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| TraderError::Advisor {
                reason: format!("{}: empty completion", request.quote.symbol),
            })?;
        debug!(symbol = %request.quote.symbol, reply = %content, "advisor reply");

        Ok(parse_advice(&content))
    }
}
