use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

/// JSON-RPC 2.0 reserved error codes.
pub mod rpc_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    ParseError,
    InvalidRequest,
    MethodNotFound,
    InvalidParams,
    SessionNotFound,
    TerminalRequestNotFound,
    Internal,
}

impl ErrorType {
    pub fn as_urn(&self) -> &'static str {
        match self {
            Self::ParseError => "urn:pi-agent:error:parse_error",
            Self::InvalidRequest => "urn:pi-agent:error:invalid_request",
            Self::MethodNotFound => "urn:pi-agent:error:method_not_found",
            Self::InvalidParams => "urn:pi-agent:error:invalid_params",
            Self::SessionNotFound => "urn:pi-agent:error:session_not_found",
            Self::TerminalRequestNotFound => "urn:pi-agent:error:terminal_request_not_found",
            Self::Internal => "urn:pi-agent:error:internal",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Self::ParseError => "Parse Error",
            Self::InvalidRequest => "Invalid Request",
            Self::MethodNotFound => "Method Not Found",
            Self::InvalidParams => "Invalid Params",
            Self::SessionNotFound => "Session Not Found",
            Self::TerminalRequestNotFound => "Terminal Request Not Found",
            Self::Internal => "Internal Error",
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::ParseError => 400,
            Self::InvalidRequest => 400,
            Self::MethodNotFound => 404,
            Self::InvalidParams => 400,
            Self::SessionNotFound => 404,
            Self::TerminalRequestNotFound => 404,
            Self::Internal => 500,
        }
    }

    pub fn rpc_code(&self) -> i64 {
        match self {
            Self::ParseError => rpc_codes::PARSE_ERROR,
            Self::InvalidRequest => rpc_codes::INVALID_REQUEST,
            Self::MethodNotFound => rpc_codes::METHOD_NOT_FOUND,
            Self::InvalidParams => rpc_codes::INVALID_PARAMS,
            Self::SessionNotFound | Self::TerminalRequestNotFound => rpc_codes::INVALID_PARAMS,
            Self::Internal => rpc_codes::INTERNAL_ERROR,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type")]
    pub type_: String,
    pub title: String,
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instance: Option<String>,
    #[serde(flatten, default, skip_serializing_if = "Map::is_empty")]
    pub extensions: Map<String, Value>,
}

impl ProblemDetails {
    pub fn new(error_type: ErrorType, detail: Option<String>) -> Self {
        Self {
            type_: error_type.as_urn().to_string(),
            title: error_type.title().to_string(),
            status: error_type.status_code(),
            detail,
            instance: None,
            extensions: Map::new(),
        }
    }
}

/// The `error` member of a JSON-RPC error response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Parse error")]
    ParseError { message: String },
    #[error("Invalid Request")]
    InvalidRequest { message: Option<String> },
    #[error("Method not found")]
    MethodNotFound { method: String },
    #[error("{message}")]
    InvalidParams { message: String },
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },
    #[error("terminal request not found: {request_id}")]
    TerminalRequestNotFound { request_id: String },
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ServerError {
    pub fn invalid_params(message: impl Into<String>) -> Self {
        Self::InvalidParams {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn error_type(&self) -> ErrorType {
        match self {
            Self::ParseError { .. } => ErrorType::ParseError,
            Self::InvalidRequest { .. } => ErrorType::InvalidRequest,
            Self::MethodNotFound { .. } => ErrorType::MethodNotFound,
            Self::InvalidParams { .. } => ErrorType::InvalidParams,
            Self::SessionNotFound { .. } => ErrorType::SessionNotFound,
            Self::TerminalRequestNotFound { .. } => ErrorType::TerminalRequestNotFound,
            Self::Internal { .. } => ErrorType::Internal,
        }
    }

    fn details(&self) -> Map<String, Value> {
        let mut map = Map::new();
        match self {
            Self::ParseError { message } => {
                map.insert("message".to_string(), Value::String(message.clone()));
            }
            Self::InvalidRequest { message } => {
                if let Some(message) = message {
                    map.insert("message".to_string(), Value::String(message.clone()));
                }
            }
            Self::MethodNotFound { method } => {
                map.insert("method".to_string(), Value::String(method.clone()));
            }
            Self::InvalidParams { .. } | Self::Internal { .. } => {}
            Self::SessionNotFound { session_id } => {
                map.insert("sessionId".to_string(), Value::String(session_id.clone()));
            }
            Self::TerminalRequestNotFound { request_id } => {
                map.insert("requestId".to_string(), Value::String(request_id.clone()));
            }
        }
        map
    }

    pub fn to_problem_details(&self) -> ProblemDetails {
        let mut problem = ProblemDetails::new(self.error_type(), Some(self.to_string()));
        problem.extensions = self.details();
        problem
    }

    pub fn to_rpc_error(&self) -> RpcErrorObject {
        let details = self.details();
        RpcErrorObject {
            code: self.error_type().rpc_code(),
            message: self.to_string(),
            data: if details.is_empty() {
                None
            } else {
                Some(Value::Object(details))
            },
        }
    }
}

impl From<ServerError> for ProblemDetails {
    fn from(value: ServerError) -> Self {
        value.to_problem_details()
    }
}

impl From<&ServerError> for ProblemDetails {
    fn from(value: &ServerError) -> Self {
        value.to_problem_details()
    }
}

impl From<&ServerError> for RpcErrorObject {
    fn from(value: &ServerError) -> Self {
        value.to_rpc_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_not_found_maps_to_rpc_and_http() {
        let err = ServerError::MethodNotFound {
            method: "agent.unknown".to_string(),
        };
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, -32601);
        assert_eq!(rpc.message, "Method not found");
        assert_eq!(err.error_type().status_code(), 404);
    }

    #[test]
    fn problem_details_flatten_extensions() {
        let err = ServerError::SessionNotFound {
            session_id: "abc".to_string(),
        };
        let value = serde_json::to_value(err.to_problem_details()).expect("serialize");
        assert_eq!(value["type"], "urn:pi-agent:error:session_not_found");
        assert_eq!(value["status"], 404);
        assert_eq!(value["sessionId"], "abc");
    }

    #[test]
    fn invalid_params_has_no_data() {
        let err = ServerError::invalid_params("prompt is required");
        let rpc = err.to_rpc_error();
        assert_eq!(rpc.code, -32602);
        assert_eq!(rpc.message, "prompt is required");
        assert!(rpc.data.is_none());
    }
}
