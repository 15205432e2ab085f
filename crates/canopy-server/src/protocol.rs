//! JSON-RPC protocol types.
//!
//! Requests and responses follow JSON-RPC 2.0. Change batches and log
//! messages are pushed as notifications (no `id`).

use canopy_core::{FileChange, LogMessage, WatchRequest};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Notification carrying one normalized batch.
pub const ON_CHANGE_BATCH: &str = "onChangeBatch";

/// Notification carrying one diagnostic.
pub const ON_LOG_MESSAGE: &str = "onLogMessage";

/// A JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct Request {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,

    /// Request ID for matching responses. Absent for notifications.
    pub id: Option<Value>,

    /// Method name to invoke.
    pub method: String,

    /// Method parameters.
    #[serde(default)]
    pub params: Value,
}

/// A JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct Response {
    /// JSON-RPC version.
    pub jsonrpc: &'static str,

    /// Request ID this is responding to.
    pub id: Option<Value>,

    /// Result on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// Error on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

impl Response {
    /// Creates a success response.
    pub fn success(id: Option<Value>, result: impl Serialize) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(serde_json::to_value(result).unwrap_or(Value::Null)),
            error: None,
        }
    }

    /// Creates an error response.
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Predefined error: Parse error.
    pub fn parse_error() -> Self {
        Self::error(None, -32700, "Parse error")
    }

    /// Predefined error: Invalid request.
    pub fn invalid_request(id: Option<Value>) -> Self {
        Self::error(id, -32600, "Invalid request")
    }

    /// Predefined error: Method not found.
    pub fn method_not_found(id: Option<Value>, method: &str) -> Self {
        Self::error(id, -32601, format!("Method not found: {}", method))
    }

    /// Predefined error: Invalid params.
    pub fn invalid_params(id: Option<Value>, message: impl Into<String>) -> Self {
        Self::error(id, -32602, message)
    }
}

/// A JSON-RPC error.
#[derive(Debug, Serialize)]
pub struct RpcError {
    /// Error code.
    pub code: i32,

    /// Error message.
    pub message: String,

    /// Optional additional data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// A server-initiated message.
#[derive(Debug, Serialize)]
pub struct Notification {
    pub jsonrpc: &'static str,
    pub method: &'static str,
    pub params: Value,
}

impl Notification {
    pub fn change_batch(events: &[FileChange]) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: ON_CHANGE_BATCH,
            params: serde_json::json!({ "events": events }),
        }
    }

    pub fn log_message(message: &LogMessage) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            method: ON_LOG_MESSAGE,
            params: serde_json::to_value(message).unwrap_or(Value::Null),
        }
    }
}

/// Params for the watch method.
#[derive(Debug, Deserialize)]
pub struct WatchParams {
    pub requests: Vec<WatchRequest>,
}

/// Params for the setVerboseLogging method.
#[derive(Debug, Deserialize)]
pub struct SetVerboseParams {
    pub enabled: bool,
}
