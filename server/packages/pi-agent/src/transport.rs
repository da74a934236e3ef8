//! Chunked NDJSON delivery of stream chunks as JSON-RPC success envelopes.

use std::convert::Infallible;
use std::future::Future;

use axum::body::Body;
use pi_agent_universal_schema::rpc::JsonRpcSuccess;
use pi_agent_universal_schema::StreamChunk;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

use crate::llm::{EventSink, SinkClosed};

pub const NDJSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

type Line = Result<String, Infallible>;

/// Write half of a streaming response.
///
/// The channel holds a single line, so a slow reader applies backpressure
/// all the way to the upstream provider read.
#[derive(Debug)]
pub struct RpcStreamEmitter {
    id: Value,
    tx: mpsc::Sender<Line>,
}

pub fn channel(id: Value) -> (RpcStreamEmitter, Body) {
    let (tx, rx) = mpsc::channel::<Line>(1);
    let body = Body::from_stream(ReceiverStream::new(rx));
    (RpcStreamEmitter { id, tx }, body)
}

impl RpcStreamEmitter {
    pub async fn send(&self, chunk: &StreamChunk) -> Result<(), SinkClosed> {
        let line = encode_line(&self.id, chunk).map_err(|err| {
            tracing::error!(error = %err, "failed to encode stream chunk");
            SinkClosed
        })?;
        self.tx.send(Ok(line)).await.map_err(|_| SinkClosed)
    }

    /// Resolves once the response body has been dropped.
    pub fn closed(&self) -> impl Future<Output = ()> + Send + 'static {
        let tx = self.tx.clone();
        async move { tx.closed().await }
    }
}

impl EventSink for RpcStreamEmitter {
    fn emit(&mut self, chunk: StreamChunk) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        async move { self.send(&chunk).await }
    }
}

pub fn encode_line(id: &Value, chunk: &StreamChunk) -> Result<String, serde_json::Error> {
    let mut line = serde_json::to_string(&JsonRpcSuccess::new(id.clone(), chunk))?;
    line.push('\n');
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use pi_agent_universal_schema::GenerationResult;
    use serde_json::json;

    #[test]
    fn line_is_one_envelope_plus_newline() {
        let line = encode_line(
            &json!(3),
            &StreamChunk::Delta {
                content: "hi".to_string(),
            },
        )
        .expect("encode");
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let value: Value = serde_json::from_str(line.trim_end()).expect("json");
        assert_eq!(
            value,
            json!({"jsonrpc": "2.0", "result": {"type": "delta", "content": "hi"}, "id": 3})
        );
    }

    #[tokio::test]
    async fn emitted_lines_arrive_in_order() {
        let (mut emitter, body) = channel(json!("req-1"));
        let reader = tokio::spawn(async move {
            let mut stream = body.into_data_stream();
            let mut text = String::new();
            while let Some(chunk) = stream.next().await {
                text.push_str(&String::from_utf8_lossy(&chunk.expect("chunk")));
            }
            text
        });

        emitter
            .emit(StreamChunk::Start {
                session_id: "s".to_string(),
            })
            .await
            .expect("start");
        emitter
            .emit(StreamChunk::Final {
                result: GenerationResult::message("done"),
            })
            .await
            .expect("final");
        drop(emitter);

        let text = reader.await.expect("join");
        let types: Vec<String> = text
            .lines()
            .map(|line| {
                let value: Value = serde_json::from_str(line).expect("json");
                value["result"]["type"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(types, vec!["start", "final"]);
    }

    #[tokio::test]
    async fn dropped_body_closes_the_emitter() {
        let (mut emitter, body) = channel(Value::Null);
        let closed = emitter.closed();
        drop(body);
        closed.await;
        let result = emitter
            .emit(StreamChunk::Delta {
                content: "late".to_string(),
            })
            .await;
        assert_eq!(result, Err(SinkClosed));
    }
}
