//! JSON-RPC 2.0 envelopes.

use pi_agent_error::RpcErrorObject;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcRequest {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub method: Option<String>,
    #[serde(default)]
    pub params: Option<Value>,
    #[serde(default)]
    pub id: Value,
}

impl JsonRpcRequest {
    pub fn is_valid(&self) -> bool {
        self.jsonrpc.as_deref() == Some(JSONRPC_VERSION) && self.method.is_some()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcSuccess<T> {
    pub jsonrpc: &'static str,
    pub result: T,
    pub id: Value,
}

impl<T> JsonRpcSuccess<T> {
    pub fn new(id: Value, result: T) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            result,
            id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcErrorResponse {
    pub jsonrpc: &'static str,
    pub error: RpcErrorObject,
    pub id: Value,
}

impl JsonRpcErrorResponse {
    pub fn new(id: Value, error: RpcErrorObject) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            error,
            id,
        }
    }
}
