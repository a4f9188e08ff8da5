//! JSON-RPC request handlers.

use crate::server::AppState;
use crate::wrapper::wrap_response;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use dat_desk::{format_size, Dat};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
#[allow(dead_code)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<Value>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
    pub id: Option<Value>,
}

/// JSON-RPC 2.0 error structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcResponse {
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            result: None,
            error: Some(JsonRpcError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// Health check endpoint.
pub async fn handle_health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Main JSON-RPC handler.
pub async fn handle_rpc(
    State(state): State<Arc<AppState>>,
    Json(request): Json<JsonRpcRequest>,
) -> impl IntoResponse {
    let method = &request.method;
    let params = request.params.unwrap_or(Value::Object(Default::default()));
    let id = request.id.clone();

    debug!("RPC call: {}({:?})", method, params);

    // Handle built-in methods
    if method == "health_check" {
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "ok"}))),
        );
    }

    if method == "shutdown" {
        // Main waits on this signal and runs the bounded session teardown
        // before the process exits
        let _ = state.shutdown_tx.send(true);
        return (
            StatusCode::OK,
            Json(JsonRpcResponse::success(id, json!({"status": "shutting_down"}))),
        );
    }

    // Dispatch to registry methods
    let result = dispatch_method(&state, method, &params).await;

    match result {
        Ok(value) => {
            let wrapped = wrap_response(method, value);
            (StatusCode::OK, Json(JsonRpcResponse::success(id, wrapped)))
        }
        Err(e) => {
            error!("RPC error for {}: {}", method, e);
            let code = e.to_rpc_error_code();
            (
                StatusCode::OK,
                Json(JsonRpcResponse::error(id, code, e.to_string())),
            )
        }
    }
}

// ============================================================================
// Helper macros for extracting parameters
// ============================================================================

/// Extract an optional string parameter.
macro_rules! get_str_param {
    ($params:expr, $name:literal) => {
        $params.get($name).and_then(|v| v.as_str())
    };
}

/// Extract a required string parameter or return an error.
macro_rules! require_str_param {
    ($params:expr, $name:literal) => {
        match get_str_param!($params, $name) {
            Some(s) => s.to_string(),
            None => {
                return Err(dat_desk::DeskError::InvalidParams {
                    message: format!("Missing required parameter: {}", $name),
                });
            }
        }
    };
}

/// Extract an optional u64 parameter, supporting both snake_case and camelCase.
macro_rules! get_u64_param {
    ($params:expr, $snake:literal, $camel:literal) => {
        $params
            .get($snake)
            .or_else(|| $params.get($camel))
            .and_then(|v| v.as_u64())
    };
}

// ============================================================================
// Method dispatcher
// ============================================================================

/// Dispatch a method call to the appropriate registry handler.
async fn dispatch_method(
    state: &AppState,
    method: &str,
    params: &Value,
) -> dat_desk::Result<Value> {
    match method {
        // ====================================================================
        // Registry
        // ====================================================================
        "list_dats" => {
            let dats = state.desk.registry().list().await;
            let payload = dats
                .iter()
                .map(dat_to_json)
                .collect::<dat_desk::Result<Vec<Value>>>()?;
            Ok(Value::Array(payload))
        }

        "get_dat" => {
            let id = require_str_param!(params, "id");
            let dat = state.desk.registry().get(&id).await?;
            dat_to_json(&dat)
        }

        "create_dat" => {
            let path = require_str_param!(params, "path");
            let author = get_str_param!(params, "author")
                .unwrap_or(&state.default_author)
                .to_string();
            let dat = state.desk.registry().create(&path, &author).await?;
            dat_to_json(&dat)
        }

        "import_dat" => {
            let path = require_str_param!(params, "path");
            let author = get_str_param!(params, "author")
                .unwrap_or(&state.default_author)
                .to_string();
            let dat = state.desk.registry().import(&path, &author).await?;
            dat_to_json(&dat)
        }

        "delete_dat" => {
            let id = require_str_param!(params, "id");
            state.desk.registry().delete(&id).await?;
            Ok(json!(true))
        }

        "share_link" => {
            let id = require_str_param!(params, "id");
            let link = state.desk.registry().share_link(&id).await?;
            Ok(json!(link))
        }

        // ====================================================================
        // View state & change feed
        // ====================================================================
        "get_view_state" => {
            let view = state.desk.state().current();
            Ok(serde_json::to_value(view)?)
        }

        "wait_for_change" => {
            let since = get_u64_param!(params, "since", "since").unwrap_or(0);
            let wait_ms =
                get_u64_param!(params, "timeout_ms", "timeoutMs").unwrap_or(25_000);
            let seq = state
                .changes
                .wait_beyond(since, Duration::from_millis(wait_ms))
                .await;
            Ok(json!({ "seq": seq }))
        }

        // ====================================================================
        // Unknown
        // ====================================================================
        _ => {
            warn!("Method not found: {}", method);
            Err(dat_desk::DeskError::Other(format!(
                "Method not found: {}",
                method
            )))
        }
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Serialize a dat for the frontend: the persisted camelCase fields plus a
/// human-readable `size` the renderer shows as-is.
fn dat_to_json(dat: &Dat) -> dat_desk::Result<Value> {
    let mut value = serde_json::to_value(dat)?;
    if let Some(map) = value.as_object_mut() {
        map.insert("size".to_string(), json!(format_size(dat.size_bytes)));
    }
    Ok(value)
}
