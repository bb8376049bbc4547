//! JSON/HTTP front door for the client operations.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::error::TaskforgeError;
use crate::grpc::client_service::ACCEPTED;
use crate::scheduler::{Dispatcher, StatusView};

#[derive(Clone)]
pub struct GatewayState {
    pub dispatcher: Arc<Dispatcher>,
}

#[derive(Deserialize)]
struct RegisterFunctionBody {
    name: String,
    language: String,
    code: String,
}

#[derive(Serialize)]
struct RegisterFunctionReply {
    function_id: String,
}

#[derive(Serialize)]
struct TriggerReply {
    execution_id: String,
    status: String,
}

#[derive(Serialize)]
struct JobReply {
    status: String,
    output: Value,
    error: String,
}

#[derive(Serialize)]
struct WorkerReply {
    worker_id: String,
    running_tasks: u32,
}

#[derive(Serialize)]
struct ErrorReply {
    error: String,
}

struct GatewayError(TaskforgeError);

impl From<TaskforgeError> for GatewayError {
    fn from(err: TaskforgeError) -> Self {
        Self(err)
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            TaskforgeError::NoWorkersAvailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(status = %status, error = %self.0, "Gateway request failed");
        (
            status,
            Json(ErrorReply {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/functions", post(register_function_handler))
        .route("/invoke/{function_id}", post(invoke_handler))
        .route("/jobs/{execution_id}", get(job_status_handler))
        .route("/workers", get(list_workers_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

pub async fn run_gateway(addr: SocketAddr, state: GatewayState, shutdown: CancellationToken) {
    tracing::info!(addr = %addr, "Starting HTTP gateway");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!(addr = %addr, error = %e, "Failed to bind HTTP gateway");
            return;
        }
    };

    if let Err(e) = axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
    {
        tracing::error!(error = %e, "HTTP gateway failed");
    }
}

async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "gateway alive" }))
}

async fn register_function_handler(
    State(state): State<GatewayState>,
    Json(body): Json<RegisterFunctionBody>,
) -> Result<Json<RegisterFunctionReply>, GatewayError> {
    let function = state
        .dispatcher
        .register_function(body.name, body.language, body.code.into_bytes())
        .await?;
    Ok(Json(RegisterFunctionReply {
        function_id: function.id,
    }))
}

async fn invoke_handler(
    State(state): State<GatewayState>,
    Path(function_id): Path<String>,
    body: Bytes,
) -> Result<Json<TriggerReply>, GatewayError> {
    let payload = if body.is_empty() {
        b"{}".to_vec()
    } else {
        body.to_vec()
    };
    let execution = state
        .dispatcher
        .trigger_execution(&function_id, payload)
        .await?;
    Ok(Json(TriggerReply {
        execution_id: execution.id,
        status: ACCEPTED.to_string(),
    }))
}

async fn job_status_handler(
    State(state): State<GatewayState>,
    Path(execution_id): Path<String>,
) -> Result<Json<JobReply>, GatewayError> {
    let view = state.dispatcher.get_execution_status(&execution_id).await?;
    let status = view.status_str().to_string();
    let reply = match view {
        StatusView::Found(execution) => JobReply {
            status,
            output: render_output(&execution.output),
            error: execution.error,
        },
        StatusView::NotFound => JobReply {
            status,
            output: Value::Null,
            error: String::new(),
        },
    };
    Ok(Json(reply))
}

async fn list_workers_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    let workers: Vec<WorkerReply> = state
        .dispatcher
        .registry()
        .snapshot()
        .await
        .into_iter()
        .map(|w| WorkerReply {
            worker_id: w.worker_id,
            running_tasks: w.running_tasks,
        })
        .collect();
    Json(workers)
}

/// JSON output is returned as JSON, anything else as text, nothing as null.
fn render_output(output: &[u8]) -> Value {
    if output.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(output)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(output).into_owned()))
}
