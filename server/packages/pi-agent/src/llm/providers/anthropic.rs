use pi_agent_universal_schema::agents::anthropic::{response_text, AnthropicStreamDecoder};
use pi_agent_universal_schema::ModelConfig;
use serde_json::{json, Value};

use super::ProviderAdapter;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone)]
pub struct AnthropicAdapter {
    base_url: String,
}

impl AnthropicAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ProviderAdapter for AnthropicAdapter {
    type Decoder = AnthropicStreamDecoder;

    fn label(&self) -> &'static str {
        "Anthropic"
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        prompt: &str,
        model: &ModelConfig,
        api_key: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let mut body = json!({
            "model": model.model,
            "max_tokens": model.max_tokens(),
            "messages": [{"role": "user", "content": prompt}],
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        client
            .post(format!("{}/v1/messages", self.base_url.trim_end_matches('/')))
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
    }

    fn response_text(&self, body: &Value) -> String {
        response_text(body)
    }
}
