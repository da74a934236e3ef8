use serde_json::Value;

use crate::{ProviderEvent, StreamDecoder, ToolCallBuffers};

/// Decodes `GenerateContentResponse` stream payloads.
///
/// Function calls arrive whole, so each one gets the next ordinal index.
#[derive(Debug, Default)]
pub struct GoogleStreamDecoder {
    tools: ToolCallBuffers,
}

impl GoogleStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StreamDecoder for GoogleStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Vec<ProviderEvent> {
        let Some(parts) = payload
            .pointer("/candidates/0/content/parts")
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        let mut events = Vec::new();
        for part in parts {
            if let Some(text) = part.get("text").and_then(Value::as_str) {
                if !text.is_empty() {
                    events.push(ProviderEvent::Delta(text.to_string()));
                }
            }
            if let Some(call) = part.get("functionCall") {
                let name = call.get("name").and_then(Value::as_str).unwrap_or_default();
                let arguments = match call.get("args") {
                    None | Some(Value::Null) => String::new(),
                    Some(args) => args.to_string(),
                };
                let index = self.tools.len() as u64;
                events.push(self.tools.complete(index, name, arguments));
            }
        }
        events
    }
}

/// Text of a non-streaming `generateContent` response.
pub fn response_text(body: &Value) -> String {
    body.pointer("/candidates/0/content/parts/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
