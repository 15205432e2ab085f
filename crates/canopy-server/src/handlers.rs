//! Request handlers.

use crate::protocol::{Request, Response, SetVerboseParams, WatchParams, JSONRPC_VERSION};
use canopy_watcher::WatcherService;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::debug;

/// Dispatches one request. Returns `None` for notifications, which get
/// no response.
pub async fn handle(service: &WatcherService, request: Request) -> Option<Response> {
    let id = request.id.clone();

    if request.jsonrpc != JSONRPC_VERSION {
        return Some(Response::invalid_request(id));
    }

    debug!("Handling {}", request.method);

    let response = match request.method.as_str() {
        "watch" => match params::<WatchParams>(request.params) {
            Ok(params) => {
                let summary = service.watch(params.requests).await;
                Response::success(id.clone(), summary)
            }
            Err(message) => Response::invalid_params(id.clone(), message),
        },
        "stop" => {
            let stopped = service.stop().await;
            Response::success(id.clone(), json!({ "stopped": stopped }))
        }
        "setVerboseLogging" => match params::<SetVerboseParams>(request.params) {
            Ok(params) => {
                service.set_verbose_logging(params.enabled);
                Response::success(id.clone(), Value::Null)
            }
            Err(message) => Response::invalid_params(id.clone(), message),
        },
        "watchers" => {
            let watchers = service.watchers().await;
            Response::success(id.clone(), watchers)
        }
        method => Response::method_not_found(id.clone(), method),
    };

    id.map(|_| response)
}

fn params<T: DeserializeOwned>(params: Value) -> Result<T, String> {
    serde_json::from_value(params).map_err(|e| format!("Invalid params: {}", e))
}
