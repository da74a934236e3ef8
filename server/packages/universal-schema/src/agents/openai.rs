use serde_json::Value;

use crate::{ProviderEvent, StreamDecoder, ToolCallBuffers};

/// Decodes `chat.completion.chunk` payloads.
#[derive(Debug, Default)]
pub struct OpenAiStreamDecoder {
    tools: ToolCallBuffers,
}

impl OpenAiStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamDecoder for OpenAiStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Vec<ProviderEvent> {
        let Some(delta) = payload.pointer("/choices/0/delta") else {
            return Vec::new();
        };
        let mut events = Vec::new();

        if let Some(text) = delta.get("content").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(ProviderEvent::Delta(text.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(Value::as_array) {
            for call in calls {
                let index = call.get("index").and_then(Value::as_u64).unwrap_or(0);
                let name = call.pointer("/function/name").and_then(Value::as_str);
                let fragment = call
                    .pointer("/function/arguments")
                    .and_then(Value::as_str)
                    .unwrap_or("");
                events.push(self.tools.append(index, name, fragment));
            }
        }

        events
    }
}

/// Text of a non-streaming chat completion.
pub fn response_text(body: &Value) -> String {
    body.pointer("/choices/0/message/content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
