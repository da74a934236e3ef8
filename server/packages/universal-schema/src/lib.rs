//! Provider-neutral data model for the agent server.
//!
//! Every upstream backend speaks its own streaming grammar. The decoders in
//! [`agents`] turn those payloads into [`ProviderEvent`]s, which the server
//! re-emits to callers as [`StreamChunk`]s.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub mod agents;
pub mod rpc;

pub const DEFAULT_MAX_TOKENS: u32 = 512;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    OpenAi,
    Anthropic,
    Google,
    Mock,
    /// Any provider name this server does not know how to reach.
    #[serde(untagged)]
    Other(String),
}

impl ModelProvider {
    pub fn as_str(&self) -> &str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Google => "google",
            Self::Mock => "mock",
            Self::Other(name) => name.as_str(),
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub provider: ModelProvider,
    pub model: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
}

impl ModelConfig {
    pub fn new(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            api_key: None,
            max_tokens: None,
        }
    }

    pub fn mock() -> Self {
        Self::new(ModelProvider::Mock, "mock-1")
    }

    /// The credential, if one is set and non-empty.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|key| !key.is_empty())
    }

    pub fn max_tokens(&self) -> u32 {
        self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)
    }

    /// Copy suitable for persisting alongside a session.
    pub fn without_credentials(&self) -> Self {
        Self {
            api_key: None,
            ..self.clone()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection: Option<String>,
    /// Half-open character range `[start, end)` within `file`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<(u64, u64)>,
}

impl RequestContext {
    pub fn file(&self) -> Option<&str> {
        self.file.as_deref().filter(|file| !file.is_empty())
    }

    pub fn selection(&self) -> Option<&str> {
        self.selection.as_deref().filter(|selection| !selection.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    #[serde(default)]
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<RequestContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<ModelConfig>,
    #[serde(default)]
    pub stream: bool,
}

impl GenerationRequest {
    pub fn file(&self) -> Option<&str> {
        self.context.as_ref().and_then(RequestContext::file)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditChange {
    pub range: (u64, u64),
    #[serde(rename = "newText")]
    pub new_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum GenerationResult {
    Message { content: String },
    Edit { file: String, changes: Vec<EditChange> },
}

impl GenerationResult {
    pub fn message(content: impl Into<String>) -> Self {
        Self::Message {
            content: content.into(),
        }
    }

    /// Text stored in the session log for this result.
    pub fn transcript_text(&self) -> String {
        match self {
            Self::Message { content } => content.clone(),
            Self::Edit { .. } => serde_json::to_string(self).unwrap_or_default(),
        }
    }
}

/// One line of the normalized streaming surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StreamChunk {
    Start {
        #[serde(rename = "sessionId")]
        session_id: String,
    },
    Delta {
        content: String,
    },
    Tool {
        name: String,
        arguments: String,
    },
    Final {
        result: GenerationResult,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMessage {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl SessionMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

/// Uniform event produced by a provider decoder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    Delta(String),
    /// `arguments` is everything seen so far for `index`, never a lone fragment.
    Tool {
        index: u64,
        name: String,
        arguments: String,
    },
}

impl From<ProviderEvent> for StreamChunk {
    fn from(event: ProviderEvent) -> Self {
        match event {
            ProviderEvent::Delta(content) => StreamChunk::Delta { content },
            ProviderEvent::Tool {
                name, arguments, ..
            } => StreamChunk::Tool { name, arguments },
        }
    }
}

/// Stateful decoder for one provider stream.
pub trait StreamDecoder {
    fn decode(&mut self, payload: &Value) -> Vec<ProviderEvent>;
}

const DEFAULT_TOOL_NAME: &str = "tool";

#[derive(Debug, Default)]
struct ToolCallBuffer {
    name: String,
    arguments: String,
}

/// Per-stream tool call accumulation keyed by the provider's call index.
#[derive(Debug, Default)]
pub struct ToolCallBuffers {
    calls: BTreeMap<u64, ToolCallBuffer>,
}

impl ToolCallBuffers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.calls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.calls.is_empty()
    }

    /// Register a call announced by a start event, seeding its buffer.
    pub fn start(&mut self, index: u64, name: &str, seed: &str) -> ProviderEvent {
        let call = self.calls.entry(index).or_default();
        call.name = non_empty_name(name);
        call.arguments.push_str(seed);
        Self::event(index, call)
    }

    /// Append an argument fragment to `index`.
    pub fn append(&mut self, index: u64, name: Option<&str>, fragment: &str) -> ProviderEvent {
        let call = self.calls.entry(index).or_insert_with(|| ToolCallBuffer {
            name: DEFAULT_TOOL_NAME.to_string(),
            arguments: String::new(),
        });
        if let Some(name) = name.filter(|name| !name.is_empty()) {
            call.name = name.to_string();
        }
        call.arguments.push_str(fragment);
        Self::event(index, call)
    }

    /// Record a call whose arguments arrived whole.
    pub fn complete(&mut self, index: u64, name: &str, arguments: String) -> ProviderEvent {
        let call = self.calls.entry(index).or_default();
        call.name = non_empty_name(name);
        call.arguments = arguments;
        Self::event(index, call)
    }

    pub fn arguments(&self, index: u64) -> Option<&str> {
        self.calls.get(&index).map(|call| call.arguments.as_str())
    }

    fn event(index: u64, call: &ToolCallBuffer) -> ProviderEvent {
        ProviderEvent::Tool {
            index,
            name: call.name.clone(),
            arguments: call.arguments.clone(),
        }
    }
}

fn non_empty_name(name: &str) -> String {
    if name.is_empty() {
        DEFAULT_TOOL_NAME.to_string()
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn unknown_provider_round_trips_as_other() {
        let config: ModelConfig =
            serde_json::from_value(json!({"provider": "mistral", "model": "m"})).expect("parse");
        assert_eq!(config.provider, ModelProvider::Other("mistral".to_string()));
        let value = serde_json::to_value(&config).expect("serialize");
        assert_eq!(value["provider"], "mistral");
    }

    #[test]
    fn known_providers_use_lowercase_names() {
        let config: ModelConfig = serde_json::from_value(
            json!({"provider": "openai", "model": "gpt-4o-mini", "apiKey": "k", "maxTokens": 64}),
        )
        .expect("parse");
        assert_eq!(config.provider, ModelProvider::OpenAi);
        assert_eq!(config.api_key(), Some("k"));
        assert_eq!(config.max_tokens(), 64);
        assert!(config.without_credentials().api_key.is_none());
    }

    #[test]
    fn stream_chunks_are_type_tagged() {
        let start = serde_json::to_value(StreamChunk::Start {
            session_id: "s1".to_string(),
        })
        .expect("serialize");
        assert_eq!(start, json!({"type": "start", "sessionId": "s1"}));

        let fin = serde_json::to_value(StreamChunk::Final {
            result: GenerationResult::message("hi"),
        })
        .expect("serialize");
        assert_eq!(
            fin,
            json!({"type": "final", "result": {"type": "message", "content": "hi"}})
        );
    }

    #[test]
    fn edit_result_uses_new_text_field() {
        let result = GenerationResult::Edit {
            file: "src/main.rs".to_string(),
            changes: vec![EditChange {
                range: (3, 7),
                new_text: "abc".to_string(),
            }],
        };
        let value = serde_json::to_value(&result).expect("serialize");
        assert_eq!(value["changes"][0]["range"], json!([3, 7]));
        assert_eq!(value["changes"][0]["newText"], "abc");
        assert!(result.transcript_text().contains("\"type\":\"edit\""));
    }

    #[test]
    fn request_context_treats_empty_strings_as_absent() {
        let request: GenerationRequest = serde_json::from_value(json!({
            "prompt": "p",
            "context": {"file": "", "selection": "x"}
        }))
        .expect("parse");
        assert_eq!(request.file(), None);
        assert_eq!(
            request.context.as_ref().and_then(RequestContext::selection),
            Some("x")
        );
    }

    #[test]
    fn tool_buffers_concatenate_per_index() {
        let mut buffers = ToolCallBuffers::new();
        buffers.append(0, Some("search"), "{\"q\":");
        buffers.append(1, Some("open"), "{}");
        let event = buffers.append(0, None, "\"rust\"}");
        assert_eq!(
            event,
            ProviderEvent::Tool {
                index: 0,
                name: "search".to_string(),
                arguments: "{\"q\":\"rust\"}".to_string(),
            }
        );
        assert_eq!(buffers.arguments(1), Some("{}"));
        assert_eq!(buffers.len(), 2);
    }

    #[test]
    fn fragment_without_start_gets_default_name() {
        let mut buffers = ToolCallBuffers::new();
        let event = buffers.append(4, None, "{");
        assert!(matches!(event, ProviderEvent::Tool { name, .. } if name == "tool"));
    }
}
