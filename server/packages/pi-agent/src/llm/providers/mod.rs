//! HTTP side of the provider adapters.
//!
//! Each backend supplies request construction and a payload decoder; the
//! one-shot and streaming drivers here are shared.

use std::time::Duration;

use futures::StreamExt;
use pi_agent_universal_schema::{ModelConfig, ProviderEvent, StreamDecoder};
use serde_json::Value;

use crate::llm::errors::{
    call_failed, classify_api_error, missing_api_key, read_error_body, transport_failed,
};
use crate::llm::sse::{extract_sse_data, frame_lines, is_sse_field_line, DONE_SENTINEL};
use crate::llm::{EventSink, SinkClosed};

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicAdapter;
pub use google::GoogleAdapter;
pub use openai::OpenAiAdapter;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_GOOGLE_BASE_URL: &str = "https://generativelanguage.googleapis.com";

pub(crate) const TEMPERATURE: f64 = 0.2;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub openai: String,
    pub anthropic: String,
    pub google: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            openai: DEFAULT_OPENAI_BASE_URL.to_string(),
            anthropic: DEFAULT_ANTHROPIC_BASE_URL.to_string(),
            google: DEFAULT_GOOGLE_BASE_URL.to_string(),
        }
    }
}

impl ProviderEndpoints {
    /// Point every backend at one base URL.
    pub fn all(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into();
        Self {
            openai: base_url.clone(),
            anthropic: base_url.clone(),
            google: base_url,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    /// Whole-request limit for one-shot calls, and time-to-headers for streams.
    pub request: Duration,
    /// Longest allowed gap between two stream reads.
    pub idle: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(10),
            request: Duration::from_secs(120),
            idle: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    timeouts: Timeouts,
}

impl HttpTransport {
    pub fn new(timeouts: Timeouts) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeouts.connect)
            .build()?;
        Ok(Self { client, timeouts })
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    pub fn timeouts(&self) -> Timeouts {
        self.timeouts
    }

    async fn send_once(
        &self,
        label: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<Value, String> {
        let response = request
            .timeout(self.timeouts.request)
            .send()
            .await
            .map_err(|err| transport_failed(label, &err))?;
        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(call_failed(label, &classify_api_error(status.as_u16(), &body)));
        }
        response
            .json::<Value>()
            .await
            .map_err(|err| call_failed(label, &format!("unreadable response ({err})")))
    }

    async fn open_stream(
        &self,
        label: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, String> {
        let response = match tokio::time::timeout(self.timeouts.request, request.send()).await {
            Ok(Ok(response)) => response,
            Ok(Err(err)) => return Err(transport_failed(label, &err)),
            Err(_) => return Err(transport_failed(label, &"timed out waiting for a response")),
        };
        let status = response.status();
        if !status.is_success() {
            let body = read_error_body(response).await;
            return Err(call_failed(label, &classify_api_error(status.as_u16(), &body)));
        }
        Ok(response)
    }
}

/// One backend's wire format.
pub trait ProviderAdapter {
    type Decoder: StreamDecoder + Default + Send;

    /// Name used in user-facing failure text.
    fn label(&self) -> &'static str;

    fn build_request(
        &self,
        client: &reqwest::Client,
        prompt: &str,
        model: &ModelConfig,
        api_key: &str,
        stream: bool,
    ) -> reqwest::RequestBuilder;

    fn response_text(&self, body: &Value) -> String;
}

/// Single-response call. Failures come back as explanatory text.
pub async fn generate<A: ProviderAdapter>(
    adapter: &A,
    http: &HttpTransport,
    prompt: &str,
    model: &ModelConfig,
) -> String {
    let label = adapter.label();
    let Some(api_key) = model.api_key() else {
        return missing_api_key(label);
    };
    let request = adapter.build_request(http.client(), prompt, model, api_key, false);
    match http.send_once(label, request).await {
        Ok(body) => adapter.response_text(&body),
        Err(message) => {
            tracing::warn!(provider = label, model = %model.model, error = %message, "generation failed");
            message
        }
    }
}

/// Streaming call. Every decoded event goes to `sink` before the next line is
/// read; the return value is the concatenated delta text. A sink that stops
/// accepting chunks ends the call with [`SinkClosed`].
pub async fn generate_stream<A, S>(
    adapter: &A,
    http: &HttpTransport,
    prompt: &str,
    model: &ModelConfig,
    sink: &mut S,
) -> Result<String, SinkClosed>
where
    A: ProviderAdapter,
    S: EventSink,
{
    let label = adapter.label();
    let Some(api_key) = model.api_key() else {
        return Ok(missing_api_key(label));
    };
    let request = adapter.build_request(http.client(), prompt, model, api_key, true);
    let response = match http.open_stream(label, request).await {
        Ok(response) => response,
        Err(message) => {
            tracing::warn!(provider = label, model = %model.model, error = %message, "stream failed to open");
            return Ok(message);
        }
    };

    let lines = frame_lines(response.bytes_stream(), http.timeouts().idle);
    futures::pin_mut!(lines);
    let mut decoder = A::Decoder::default();
    let mut text = String::new();
    let mut skipped = 0usize;

    while let Some(line) = lines.next().await {
        if is_sse_field_line(&line) {
            continue;
        }
        let payload = extract_sse_data(&line);
        if payload.is_empty() || payload == DONE_SENTINEL {
            continue;
        }
        let value: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                skipped += 1;
                tracing::debug!(provider = label, error = %err, "skipping malformed stream payload");
                continue;
            }
        };
        for event in decoder.decode(&value) {
            let delta = match &event {
                ProviderEvent::Delta(delta) => Some(delta.clone()),
                ProviderEvent::Tool { .. } => None,
            };
            if let Err(closed) = sink.emit(event.into()).await {
                tracing::debug!(provider = label, "receiver closed, dropping upstream stream");
                return Err(closed);
            }
            if let Some(delta) = delta {
                text.push_str(&delta);
            }
        }
    }

    if skipped > 0 {
        tracing::debug!(provider = label, skipped, "stream finished with skipped payloads");
    }
    Ok(text)
}
