use serde_json::Value;

use crate::{ProviderEvent, StreamDecoder, ToolCallBuffers};

/// Decodes Messages API stream events.
#[derive(Debug, Default)]
pub struct AnthropicStreamDecoder {
    tools: ToolCallBuffers,
}

impl AnthropicStreamDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn content_block_start(&mut self, payload: &Value) -> Vec<ProviderEvent> {
        let Some(block) = payload.get("content_block") else {
            return Vec::new();
        };
        if block.get("type").and_then(Value::as_str) != Some("tool_use") {
            return Vec::new();
        }
        let index = block_index(payload);
        let name = block.get("name").and_then(Value::as_str).unwrap_or_default();
        // An empty input object is a placeholder; the real input follows as partial_json.
        let seed = match block.get("input") {
            None | Some(Value::Null) => String::new(),
            Some(Value::Object(map)) if map.is_empty() => String::new(),
            Some(input) => input.to_string(),
        };
        vec![self.tools.start(index, name, &seed)]
    }

    fn content_block_delta(&mut self, payload: &Value) -> Vec<ProviderEvent> {
        let Some(delta) = payload.get("delta") else {
            return Vec::new();
        };
        let mut events = Vec::new();
        if let Some(text) = delta.get("text").and_then(Value::as_str) {
            if !text.is_empty() {
                events.push(ProviderEvent::Delta(text.to_string()));
            }
        }
        if let Some(partial) = delta.get("partial_json").and_then(Value::as_str) {
            events.push(self.tools.append(block_index(payload), None, partial));
        }
        events
    }
}

impl StreamDecoder for AnthropicStreamDecoder {
    fn decode(&mut self, payload: &Value) -> Vec<ProviderEvent> {
        match payload.get("type").and_then(Value::as_str) {
            Some("content_block_start") => self.content_block_start(payload),
            Some("content_block_delta") => self.content_block_delta(payload),
            _ => Vec::new(),
        }
    }
}

fn block_index(payload: &Value) -> u64 {
    payload.get("index").and_then(Value::as_u64).unwrap_or(0)
}

/// Text of a non-streaming Messages API response.
pub fn response_text(body: &Value) -> String {
    body.pointer("/content/0/text")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn text_delta() {
        let mut decoder = AnthropicStreamDecoder::new();
        let events = decoder.decode(&json!({
            "type": "content_block_delta",
            "index": 0,
            "delta": {"type": "text_delta", "text": "Hi"}
        }));
        assert_eq!(events, vec![ProviderEvent::Delta("Hi".to_string())]);
    }

    #[test]
    fn tool_use_with_empty_input_then_partial_json() {
        let mut decoder = AnthropicStreamDecoder::new();
        let start = decoder.decode(&json!({
            "type": "content_block_start",
            "index": 1,
            "content_block": {"type": "tool_use", "id": "t1", "name": "read_file", "input": {}}
        }));
        assert_eq!(
            start,
            vec![ProviderEvent::Tool {
                index: 1,
                name: "read_file".to_string(),
                arguments: String::new(),
            }]
        );

        decoder.decode(&json!({
            "type": "content_block_delta",
            "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "{\"path\":"}
        }));
        let events = decoder.decode(&json!({
            "type": "content_block_delta",
            "index": 1,
            "delta": {"type": "input_json_delta", "partial_json": "\"a.rs\"}"}
        }));
        assert_eq!(
            events,
            vec![ProviderEvent::Tool {
                index: 1,
                name: "read_file".to_string(),
                arguments: "{\"path\":\"a.rs\"}".to_string(),
            }]
        );
    }

    #[test]
    fn populated_start_input_seeds_the_buffer() {
        let mut decoder = AnthropicStreamDecoder::new();
        let events = decoder.decode(&json!({
            "type": "content_block_start",
            "index": 0,
            "content_block": {"type": "tool_use", "name": "ls", "input": {"dir": "."}}
        }));
        assert!(matches!(
            &events[..],
            [ProviderEvent::Tool { arguments, .. }] if arguments == "{\"dir\":\".\"}"
        ));
    }

    #[test]
    fn lifecycle_events_are_ignored() {
        let mut decoder = AnthropicStreamDecoder::new();
        for kind in ["message_start", "message_delta", "message_stop", "ping"] {
            assert!(decoder.decode(&json!({"type": kind})).is_empty());
        }
        assert!(decoder
            .decode(&json!({
                "type": "content_block_start",
                "index": 0,
                "content_block": {"type": "text", "text": ""}
            }))
            .is_empty());
    }

    #[test]
    fn one_shot_text() {
        let body = json!({"content": [{"type": "text", "text": "ok"}]});
        assert_eq!(response_text(&body), "ok");
    }
}
