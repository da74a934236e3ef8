use pi_agent_universal_schema::agents::openai::{response_text, OpenAiStreamDecoder};
use pi_agent_universal_schema::ModelConfig;
use serde_json::{json, Value};

use super::{ProviderAdapter, TEMPERATURE};

#[derive(Debug, Clone)]
pub struct OpenAiAdapter {
    base_url: String,
}

impl OpenAiAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }
}

impl ProviderAdapter for OpenAiAdapter {
    type Decoder = OpenAiStreamDecoder;

    fn label(&self) -> &'static str {
        "OpenAI"
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
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": model.max_tokens(),
            "temperature": TEMPERATURE,
        });
        if stream {
            body["stream"] = Value::Bool(true);
        }
        client
            .post(format!(
                "{}/v1/chat/completions",
                self.base_url.trim_end_matches('/')
            ))
            .bearer_auth(api_key)
            .json(&body)
    }

    fn response_text(&self, body: &Value) -> String {
        response_text(body)
    }
}
