//! Generation orchestration.

use std::future::Future;

use pi_agent_universal_schema::{
    GenerationRequest, GenerationResult, ModelConfig, ModelProvider, StreamChunk,
};
use thiserror::Error;

pub mod errors;
pub mod prompt;
pub mod providers;
pub mod sse;
pub mod stream;

use providers::{
    AnthropicAdapter, GoogleAdapter, HttpTransport, OpenAiAdapter, ProviderEndpoints, Timeouts,
};

pub const UNSUPPORTED_MODEL: &str = "Unsupported model.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("stream receiver closed")]
pub struct SinkClosed;

/// Receiver of normalized stream chunks, in order.
pub trait EventSink: Send {
    fn emit(&mut self, chunk: StreamChunk) -> impl Future<Output = Result<(), SinkClosed>> + Send;
}

impl EventSink for Vec<StreamChunk> {
    fn emit(&mut self, chunk: StreamChunk) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        self.push(chunk);
        std::future::ready(Ok(()))
    }
}

#[derive(Debug, Clone)]
pub struct Orchestrator {
    http: HttpTransport,
    openai: OpenAiAdapter,
    anthropic: AnthropicAdapter,
    google: GoogleAdapter,
}

impl Orchestrator {
    pub fn new(endpoints: ProviderEndpoints, timeouts: Timeouts) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http: HttpTransport::new(timeouts)?,
            openai: OpenAiAdapter::new(endpoints.openai),
            anthropic: AnthropicAdapter::new(endpoints.anthropic),
            google: GoogleAdapter::new(endpoints.google),
        })
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
    ) -> GenerationResult {
        if model.provider == ModelProvider::Mock {
            return GenerationResult::message(mock_summary(request, model));
        }

        let prompt = prompt::build_prompt(&request.prompt, request.context.as_ref());
        let text = match &model.provider {
            ModelProvider::OpenAi => {
                providers::generate(&self.openai, &self.http, &prompt, model).await
            }
            ModelProvider::Anthropic => {
                providers::generate(&self.anthropic, &self.http, &prompt, model).await
            }
            ModelProvider::Google => {
                providers::generate(&self.google, &self.http, &prompt, model).await
            }
            ModelProvider::Mock | ModelProvider::Other(_) => unsupported(model),
        };
        GenerationResult::message(text)
    }

    /// Streams deltas and tool events into `sink`. Returns [`SinkClosed`] as
    /// soon as the sink refuses a chunk, so a partial reply is never reported
    /// as the result.
    pub async fn generate_stream<S: EventSink>(
        &self,
        request: &GenerationRequest,
        model: &ModelConfig,
        sink: &mut S,
    ) -> Result<GenerationResult, SinkClosed> {
        if model.provider == ModelProvider::Mock {
            let summary = mock_summary(request, model);
            for piece in stream::chunk_text(&summary, stream::CHUNK_CHARS) {
                let chunk = StreamChunk::Delta {
                    content: piece.to_string(),
                };
                sink.emit(chunk).await?;
            }
            return Ok(GenerationResult::message(summary));
        }

        let prompt = prompt::build_prompt(&request.prompt, request.context.as_ref());
        let text = match &model.provider {
            ModelProvider::OpenAi => {
                providers::generate_stream(&self.openai, &self.http, &prompt, model, sink).await?
            }
            ModelProvider::Anthropic => {
                providers::generate_stream(&self.anthropic, &self.http, &prompt, model, sink)
                    .await?
            }
            ModelProvider::Google => {
                providers::generate_stream(&self.google, &self.http, &prompt, model, sink).await?
            }
            ModelProvider::Mock | ModelProvider::Other(_) => unsupported(model),
        };
        Ok(GenerationResult::message(text))
    }
}

fn unsupported(model: &ModelConfig) -> String {
    tracing::warn!(provider = %model.provider, model = %model.model, "unsupported provider");
    UNSUPPORTED_MODEL.to_string()
}

/// Deterministic reply used by the `mock` provider.
pub fn mock_summary(request: &GenerationRequest, model: &ModelConfig) -> String {
    let file = request.file().unwrap_or("none");
    format!(
        "Request received. Model: {}/{} File: {file}\n\nPrompt: {}",
        model.provider, model.model, request.prompt
    )
}
