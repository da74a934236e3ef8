use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{header, Request, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use pi_agent_credentials::CredentialResolver;
use pi_agent_error::{ProblemDetails, ServerError};
use pi_agent_universal_schema::rpc::{JsonRpcErrorResponse, JsonRpcRequest, JsonRpcSuccess};
use pi_agent_universal_schema::{
    GenerationRequest, GenerationResult, ModelConfig, Role, SessionMessage, StreamChunk,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::llm::{Orchestrator, SinkClosed};
use crate::session_store::{SessionRecord, SessionStore, SessionStoreError};
use crate::terminal::{CommandOutput, TerminalRegistry};
use crate::transport::{self, NDJSON_CONTENT_TYPE};

mod types;

pub use types::*;

pub const PROCESS_METHOD: &str = "agent.process";
const PROBLEM_CONTENT_TYPE: &str = "application/problem+json";

#[derive(Debug)]
pub struct AppState {
    credentials: CredentialResolver,
    sessions: SessionStore,
    llm: Orchestrator,
    terminal: TerminalRegistry,
}

impl AppState {
    pub fn new(
        credentials: CredentialResolver,
        sessions: SessionStore,
        llm: Orchestrator,
        terminal: TerminalRegistry,
    ) -> Self {
        Self {
            credentials,
            sessions,
            llm,
            terminal,
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let shared = Arc::new(state);
    Router::new()
        .route("/health", get(get_health))
        .route("/rpc", post(post_rpc))
        .route("/api/agent/process", post(post_process))
        .route("/api/agent/sessions", get(list_sessions))
        .route("/api/agent/sessions/:session_id", get(get_session))
        .route("/api/agent/sessions/:session_id/messages", post(post_session_message))
        .route("/api/agent/terminal/request", post(post_terminal_request))
        .route("/api/agent/terminal/execute", post(post_terminal_execute))
        .with_state(shared)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<_>| {
                tracing::info_span!("http.request", method = %req.method(), uri = %req.uri())
            }),
        )
        .layer(CorsLayer::permissive())
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Server(#[from] ServerError),
}

impl From<SessionStoreError> for ApiError {
    fn from(err: SessionStoreError) -> Self {
        ApiError::Server(ServerError::internal(err.to_string()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let problem: ProblemDetails = match &self {
            ApiError::Server(err) => err.to_problem_details(),
        };
        let status =
            StatusCode::from_u16(problem.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, [(header::CONTENT_TYPE, PROBLEM_CONTENT_TYPE)], Json(problem)).into_response()
    }
}

async fn get_health() -> Json<HealthResponse> {
    Json(HealthResponse { ok: true })
}

async fn post_process(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ProcessResponse>, ApiError> {
    let request: GenerationRequest = parse_body(&body)?;
    let (model, mut session) = begin_turn(&state, &request).await?;
    let result = state.llm.generate(&request, &model).await;
    record_reply(&state, &mut session, &result).await?;
    Ok(Json(ProcessResponse {
        session_id: session.id().to_string(),
        result,
    }))
}

async fn post_rpc(State(state): State<Arc<AppState>>, body: Bytes) -> Response {
    let value: Value = match serde_json::from_slice(&body) {
        Ok(value) => value,
        Err(err) => {
            return rpc_error(
                Value::Null,
                ServerError::ParseError {
                    message: err.to_string(),
                },
            )
        }
    };
    let rpc = match serde_json::from_value::<JsonRpcRequest>(value) {
        Ok(rpc) if rpc.is_valid() => rpc,
        Ok(_) => return rpc_error(Value::Null, ServerError::InvalidRequest { message: None }),
        Err(err) => {
            return rpc_error(
                Value::Null,
                ServerError::InvalidRequest {
                    message: Some(err.to_string()),
                },
            )
        }
    };

    let method = rpc.method.unwrap_or_default();
    if method != PROCESS_METHOD {
        return rpc_error(rpc.id, ServerError::MethodNotFound { method });
    }

    let request = match rpc_params(rpc.params) {
        Ok(request) => request,
        Err(err) => return rpc_error(rpc.id, err),
    };
    let (model, session) = match begin_turn(&state, &request).await {
        Ok(turn) => turn,
        Err(err) => return rpc_error(rpc.id, err),
    };

    if request.stream {
        return stream_turn(state, rpc.id, request, model, session);
    }

    let mut session = session;
    let result = state.llm.generate(&request, &model).await;
    if let Err(err) = record_reply(&state, &mut session, &result).await {
        return rpc_error(rpc.id, err);
    }
    Json(JsonRpcSuccess::new(
        rpc.id,
        ProcessResponse {
            session_id: session.id().to_string(),
            result,
        },
    ))
    .into_response()
}

fn rpc_params(params: Option<Value>) -> Result<GenerationRequest, ServerError> {
    match params {
        None | Some(Value::Null) => Ok(GenerationRequest::default()),
        Some(params) => serde_json::from_value(params)
            .map_err(|err| ServerError::invalid_params(format!("invalid params: {err}"))),
    }
}

fn rpc_error(id: Value, err: ServerError) -> Response {
    let status = StatusCode::from_u16(err.error_type().status_code())
        .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "rpc request failed");
    }
    (status, Json(JsonRpcErrorResponse::new(id, err.to_rpc_error()))).into_response()
}

/// Resolve the model, find or open the session, and log the user turn.
async fn begin_turn(
    state: &AppState,
    request: &GenerationRequest,
) -> Result<(ModelConfig, SessionRecord), ServerError> {
    if request.prompt.is_empty() {
        return Err(ServerError::invalid_params("prompt is required"));
    }
    let model = state.credentials.resolve(request.model.as_ref());

    let existing = match request.session_id.as_deref() {
        Some(id) => state.sessions.load(id).await,
        None => None,
    };
    let mut session = match existing {
        Some(session) => session,
        None => state
            .sessions
            .create(model.without_credentials())
            .await
            .map_err(store_error)?,
    };
    state
        .sessions
        .append_message(&mut session, SessionMessage::new(Role::User, &request.prompt))
        .await
        .map_err(store_error)?;
    tracing::info!(
        session_id = %session.id(),
        provider = %model.provider,
        model = %model.model,
        stream = request.stream,
        "processing prompt"
    );
    Ok((model, session))
}

async fn record_reply(
    state: &AppState,
    session: &mut SessionRecord,
    result: &GenerationResult,
) -> Result<(), ServerError> {
    state
        .sessions
        .append_message(
            session,
            SessionMessage::new(Role::Assistant, result.transcript_text()),
        )
        .await
        .map_err(store_error)
}

fn store_error(err: SessionStoreError) -> ServerError {
    ServerError::internal(err.to_string())
}

fn stream_turn(
    state: Arc<AppState>,
    id: Value,
    request: GenerationRequest,
    model: ModelConfig,
    mut session: SessionRecord,
) -> Response {
    let (mut emitter, body) = transport::channel(id);
    tokio::spawn(async move {
        let session_id = session.id().to_string();
        let start = StreamChunk::Start {
            session_id: session_id.clone(),
        };
        if emitter.send(&start).await.is_err() {
            return;
        }

        let closed = emitter.closed();
        let generated = tokio::select! {
            biased;
            _ = closed => Err(SinkClosed),
            generated = state.llm.generate_stream(&request, &model, &mut emitter) => generated,
        };
        let result = match generated {
            Ok(result) => result,
            Err(SinkClosed) => {
                tracing::info!(session_id = %session_id, "client disconnected mid-stream");
                return;
            }
        };

        if let Err(err) = record_reply(&state, &mut session, &result).await {
            tracing::warn!(session_id = %session_id, error = %err, "failed to record reply");
        }
        let _ = emitter.send(&StreamChunk::Final { result }).await;
    });

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, NDJSON_CONTENT_TYPE)],
        body,
    )
        .into_response()
}

async fn list_sessions(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<SessionRecord>>, ApiError> {
    Ok(Json(state.sessions.list().await?))
}

async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionRecord>, ApiError> {
    let session = state
        .sessions
        .load(&session_id)
        .await
        .ok_or(ServerError::SessionNotFound { session_id })?;
    Ok(Json(session))
}

async fn post_session_message(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    body: Bytes,
) -> Result<Json<SessionRecord>, ApiError> {
    let request: AppendMessageRequest = parse_body(&body)?;
    if request.content.is_empty() {
        return Err(ServerError::invalid_params("content is required").into());
    }
    let mut session = state
        .sessions
        .load(&session_id)
        .await
        .ok_or(ServerError::SessionNotFound { session_id })?;
    state
        .sessions
        .append_message(&mut session, SessionMessage::new(request.role, request.content))
        .await?;
    Ok(Json(session))
}

async fn post_terminal_request(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<crate::terminal::TerminalRequest>, ApiError> {
    let request: TerminalCommandRequest = parse_body(&body)?;
    let command = request
        .command
        .filter(|command| !command.is_empty())
        .ok_or_else(|| ServerError::invalid_params("command is required"))?;
    Ok(Json(state.terminal.create(command)))
}

async fn post_terminal_execute(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<TerminalExecuteResponse>, ApiError> {
    let request: TerminalExecuteRequest = parse_body(&body)?;
    let request_id = request
        .request_id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ServerError::invalid_params("requestId is required"))?;
    let pending = state
        .terminal
        .take(&request_id)
        .ok_or(ServerError::TerminalRequestNotFound { request_id })?;

    if !request.approve {
        tracing::info!(request_id = %pending.id, "terminal command declined");
        return Ok(Json(TerminalExecuteResponse::declined()));
    }
    let output = state
        .terminal
        .execute(&pending)
        .await
        .map_err(|err| ServerError::internal(err.to_string()))?;
    Ok(Json(TerminalExecuteResponse::ran(output)))
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, ServerError> {
    let value: Value = serde_json::from_slice(body).map_err(|err| ServerError::ParseError {
        message: err.to_string(),
    })?;
    serde_json::from_value(value)
        .map_err(|err| ServerError::invalid_params(format!("invalid request body: {err}")))
}
