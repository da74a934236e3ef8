use pi_agent_universal_schema::agents::google::{response_text, GoogleStreamDecoder};
use pi_agent_universal_schema::ModelConfig;
use serde_json::{json, Value};

use super::{ProviderAdapter, TEMPERATURE};

#[derive(Debug, Clone)]
pub struct GoogleAdapter {
    base_url: String,
}

impl GoogleAdapter {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
        }
    }

    fn url(&self, model: &str, stream: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        if stream {
            format!("{base}/v1beta/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/v1beta/models/{model}:generateContent")
        }
    }
}

impl ProviderAdapter for GoogleAdapter {
    type Decoder = GoogleStreamDecoder;

    fn label(&self) -> &'static str {
        "Google"
    }

    fn build_request(
        &self,
        client: &reqwest::Client,
        prompt: &str,
        model: &ModelConfig,
        api_key: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder {
        let body = json!({
            "contents": [{"role": "user", "parts": [{"text": prompt}]}],
            "generationConfig": {
                "maxOutputTokens": model.max_tokens(),
                "temperature": TEMPERATURE,
            },
        });
        client
            .post(self.url(&model.model, stream))
            .header("x-goog-api-key", api_key)
            .json(&body)
    }

    fn response_text(&self, body: &Value) -> String {
        response_text(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_url_requests_sse_framing() {
        let adapter = GoogleAdapter::new("http://localhost:9/");
        assert_eq!(
            adapter.url("gemini-1.5-flash", true),
            "http://localhost:9/v1beta/models/gemini-1.5-flash:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            adapter.url("gemini-1.5-flash", false),
            "http://localhost:9/v1beta/models/gemini-1.5-flash:generateContent"
        );
    }
}
