//! HTTP transport.
//!
//! | Path | Method | Description |
//! |------|--------|-------------|
//! | /health | GET | Liveness plus schema version |
//! | /api/commands | GET | Names accepted by `/api/invoke` |
//! | /api/invoke/{command} | POST | Run one command with a JSON payload |
//!
//! Errors come back as `{ "code": "...", "message": "..." }`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, warn};

use crate::commands;
use crate::config::AppConfig;
use crate::db::{DbState, CURRENT_SCHEMA_VERSION};
use crate::error::{EngineError, EngineResult};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DbState>,
    pub config: Arc<AppConfig>,
}

#[derive(Serialize)]
struct ErrorBody {
    code: &'static str,
    message: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let status = match &self {
            EngineError::Validation(_) => StatusCode::BAD_REQUEST,
            EngineError::NotFound { .. } => StatusCode::NOT_FOUND,
            EngineError::IllegalTransition { .. } | EngineError::Conflict(_) => {
                StatusCode::CONFLICT
            }
            EngineError::Storage(_) | EngineError::Serialization(_) | EngineError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!(target: "engine", code = self.code(), error = %self, "Request failed");
            "Internal server error".to_string()
        } else {
            self.to_string()
        };
        let body = ErrorBody {
            code: self.code(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/commands", get(list_commands))
        .route("/api/invoke/{command}", post(invoke))
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "schemaVersion": CURRENT_SCHEMA_VERSION,
    }))
}

async fn list_commands() -> Json<&'static [&'static str]> {
    Json(commands::COMMANDS)
}

fn parse_body(body: &[u8]) -> EngineResult<Value> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(body)
        .map_err(|e| EngineError::validation(format!("Request body is not valid JSON: {e}")))
}

async fn invoke(
    State(state): State<AppState>,
    Path(command): Path<String>,
    body: Bytes,
) -> Result<Json<Value>, EngineError> {
    let payload = parse_body(&body)?;
    let AppState { db, config } = state;

    let result = tokio::task::spawn_blocking(move || {
        commands::dispatch(&db, &config, &command, payload).inspect_err(|e| {
            if !matches!(
                e,
                EngineError::Storage(_) | EngineError::Serialization(_) | EngineError::Internal(_)
            ) {
                warn!(command = %command, code = e.code(), error = %e, "Command rejected");
            }
        })
    })
    .await
    .map_err(|e| EngineError::Internal(format!("command task failed: {e}")))??;

    Ok(Json(result))
}
