//! `POST /_hwapi/{func}` dispatch.
//!
//! The compiled API module exports an ordered list of named handlers. A
//! request names one of them; its JSON array body is spread into the
//! handler's arguments.
//!
//! | outcome          | status | body                                                   |
//! |------------------|--------|--------------------------------------------------------|
//! | success          | 200    | `{"error": null, "result": <value>}`                   |
//! | unknown function | 200    | `{"error": "Function not found", "result": "HWERR: Function not found"}` |
//! | handler threw    | 500    | `{"error": "<exception>"}`                             |
//! | body not array   | 400    | `{"error": "Invalid arguments", "result": null}`       |

use axum::http::StatusCode;
use futures::future::BoxFuture;
use hostweb_common::{HostwebError, Result};
use serde_json::{json, Value as JsonValue};
use std::future::Future;
use std::sync::Arc;

pub const FUNCTION_NOT_FOUND: &str = "Function not found";

/// A callable server function.
pub trait RpcHandler: Send + Sync {
    fn call(&self, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>>;
}

impl<F, Fut> RpcHandler for F
where
    F: Fn(Vec<JsonValue>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<JsonValue>> + Send + 'static,
{
    fn call(&self, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>> {
        Box::pin(self(args))
    }
}

#[derive(Clone)]
pub struct RpcEntry {
    pub name: String,
    pub handler: Arc<dyn RpcHandler>,
}

impl std::fmt::Debug for RpcEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcEntry").field("name", &self.name).finish()
    }
}

/// Ordered handler list, searched front to back.
#[derive(Debug, Clone, Default)]
pub struct RpcRegistry {
    entries: Vec<RpcEntry>,
}

impl RpcRegistry {
    pub fn new(entries: Vec<RpcEntry>) -> Self {
        Self { entries }
    }

    pub fn register(&mut self, name: impl Into<String>, handler: impl RpcHandler + 'static) {
        self.entries.push(RpcEntry {
            name: name.into(),
            handler: Arc::new(handler),
        });
    }

    /// First entry named `name`.
    pub fn find(&self, name: &str) -> Option<&RpcEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|entry| entry.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Turns a compiled API module into a registry.
pub trait ApiLoader: Send + Sync {
    fn load(&self, module: &str) -> Result<RpcRegistry>;
}

/// Runs one dispatch request against `registry`.
///
/// # Arguments
/// * `func` - Function name taken from the request path
/// * `body` - Raw request body, expected to be a JSON array of arguments
///
/// # Returns
/// The status and JSON body to send. Failures are reported in the body,
/// never as an `Err`.
pub async fn dispatch(registry: &RpcRegistry, func: &str, body: &[u8]) -> (StatusCode, JsonValue) {
    let args = match serde_json::from_slice::<JsonValue>(body) {
        Ok(JsonValue::Array(args)) => args,
        _ => {
            tracing::warn!("Rejected call to {}: body is not a JSON array", func);
            return (
                StatusCode::BAD_REQUEST,
                json!({ "error": "Invalid arguments", "result": null }),
            );
        }
    };

    let Some(entry) = registry.find(func) else {
        tracing::error!("HWAPI function not found: {}", func);
        return (
            StatusCode::OK,
            json!({
                "error": FUNCTION_NOT_FOUND,
                "result": format!("HWERR: {}", FUNCTION_NOT_FOUND),
            }),
        );
    };

    tracing::debug!("Calling {} with {} argument(s)", func, args.len());
    match entry.handler.call(args).await {
        Ok(result) => (StatusCode::OK, json!({ "error": null, "result": result })),
        Err(e) => {
            let message = match e {
                HostwebError::JavaScriptExecution(message) => message,
                other => other.to_string(),
            };
            tracing::error!("HWAPI function {} failed: {}", func, message);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                json!({ "error": message }),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> RpcRegistry {
        let mut registry = RpcRegistry::default();
        registry.register("add", |args: Vec<JsonValue>| async move {
            let sum: i64 = args.iter().filter_map(JsonValue::as_i64).sum();
            Ok::<_, HostwebError>(json!(sum))
        });
        registry.register("fail", |_args: Vec<JsonValue>| async move {
            Err::<JsonValue, _>(HostwebError::JavaScriptExecution("Error: boom".into()))
        });
        registry.register("add", |_args: Vec<JsonValue>| async move {
            Ok::<_, HostwebError>(json!("shadowed"))
        });
        registry
    }

    #[tokio::test]
    async fn test_dispatch_success() {
        let (status, body) = dispatch(&registry(), "add", b"[1, 2]").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "error": null, "result": 3 }));
    }

    #[tokio::test]
    async fn test_dispatch_not_found() {
        let (status, body) = dispatch(&registry(), "doesNotExist", b"[]").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({ "error": "Function not found", "result": "HWERR: Function not found" })
        );
    }

    #[tokio::test]
    async fn test_dispatch_handler_error() {
        let (status, body) = dispatch(&registry(), "fail", b"[]").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "error": "Error: boom" }));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_non_array_body() {
        let bodies: [&[u8]; 4] = [b"{\"a\":1}", b"", b"not json", b"42"];
        for body in bodies {
            let (status, response) = dispatch(&registry(), "add", body).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            assert_eq!(response, json!({ "error": "Invalid arguments", "result": null }));
        }
    }

    #[test]
    fn test_first_entry_wins() {
        let registry = registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.names().collect::<Vec<_>>(), vec!["add", "fail", "add"]);

        let handler = registry.find("add").unwrap().handler.clone();
        let result = futures::executor::block_on(handler.call(vec![json!(2), json!(2)]));
        assert_eq!(result.unwrap(), json!(4));
    }
}
