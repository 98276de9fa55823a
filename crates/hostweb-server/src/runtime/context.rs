use boa_engine::{
    builtins::promise::PromiseState,
    js_string,
    object::{
        builtins::{JsArray, JsPromise},
        JsObject,
    },
    value::JsValue,
    Context, Module, Script, Source,
};
use futures::future::BoxFuture;
use hostweb_common::{HostwebError, Result};
use serde_json::Value as JsonValue;
use std::sync::{mpsc as std_mpsc, Arc};
use tokio::sync::{mpsc, oneshot};

use crate::dispatch::{ApiLoader, RpcEntry, RpcHandler, RpcRegistry};
use crate::runtime::conversions::{js_value_to_json, json_to_js_value};

/// Global the API module exports its accessor under.
pub const ACCESSOR_GLOBAL: &str = "__hwapi";

/// Loads API modules into an embedded JavaScript engine.
///
/// Each loaded module gets its own runtime thread that owns the engine
/// context. Handler calls are queued to that thread and run one at a time.
/// The thread exits once every handler of the registry has been dropped.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScriptLoader;

struct RuntimeCall {
    index: usize,
    args: Vec<JsonValue>,
    reply: oneshot::Sender<Result<JsonValue>>,
}

struct ScriptHandler {
    index: usize,
    calls: mpsc::UnboundedSender<RuntimeCall>,
}

impl RpcHandler for ScriptHandler {
    fn call(&self, args: Vec<JsonValue>) -> BoxFuture<'static, Result<JsonValue>> {
        let (reply, response) = oneshot::channel();
        let sent = self.calls.send(RuntimeCall {
            index: self.index,
            args,
            reply,
        });
        Box::pin(async move {
            sent.map_err(|_| stopped())?;
            response.await.map_err(|_| stopped())?
        })
    }
}

fn stopped() -> HostwebError {
    HostwebError::JavaScriptExecution("API runtime is not running".into())
}

impl ApiLoader for ScriptLoader {
    fn load(&self, module: &str) -> Result<RpcRegistry> {
        let (calls, queue) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = std_mpsc::channel();
        let source = module.to_string();

        std::thread::Builder::new()
            .name("hostweb-api".into())
            .spawn(move || run_runtime(source, queue, ready_tx))?;

        let names = ready_rx.recv().map_err(|_| stopped())??;
        tracing::info!("Loaded {} API function(s): {}", names.len(), names.join(", "));

        let entries = names
            .into_iter()
            .enumerate()
            .map(|(index, name)| RpcEntry {
                name,
                handler: Arc::new(ScriptHandler {
                    index,
                    calls: calls.clone(),
                }),
            })
            .collect();
        Ok(RpcRegistry::new(entries))
    }
}

fn run_runtime(
    source: String,
    mut queue: mpsc::UnboundedReceiver<RuntimeCall>,
    ready: std_mpsc::Sender<Result<Vec<String>>>,
) {
    let mut ctx = Context::default();
    let handlers = match load_handlers(&source, &mut ctx) {
        Ok(handlers) => handlers,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let names = handlers.iter().map(|(name, _)| name.clone()).collect();
    if ready.send(Ok(names)).is_err() {
        return;
    }

    while let Some(call) = queue.blocking_recv() {
        let result = match handlers.get(call.index) {
            Some((_, handler)) => invoke(handler, call.args, &mut ctx),
            None => Err(HostwebError::JavaScriptExecution(format!(
                "no handler at index {}",
                call.index
            ))),
        };
        let _ = call.reply.send(result);
    }

    tracing::debug!("API runtime stopped");
}

/// Evaluates the module and reads `[{ name, handler }]` from its accessor.
///
/// Classic scripts publish the accessor as the global `__hwapi`. ES modules
/// export it, either by that name or as their default export.
fn load_handlers(source: &str, ctx: &mut Context) -> Result<Vec<(String, JsObject)>> {
    let accessor = match Script::parse(Source::from_bytes(source), None, ctx) {
        Ok(script) => {
            script
                .evaluate(ctx)
                .map_err(|e| HostwebError::InvalidModule(format!("evaluation failed: {}", e)))?;
            let _ = ctx.run_jobs();
            global_accessor(ctx)?
        }
        Err(script_error) => {
            let module = Module::parse(Source::from_bytes(source), None, ctx).map_err(|_| {
                HostwebError::InvalidModule(format!("syntax error: {}", script_error))
            })?;
            module_accessor(&module, ctx)?
        }
    };

    let list = accessor
        .call(&JsValue::undefined(), &[], ctx)
        .map_err(|e| HostwebError::InvalidModule(format!("{}() threw: {}", ACCESSOR_GLOBAL, e)))?;
    let list = settle(list, ctx)?;

    let not_a_list = || {
        HostwebError::InvalidModule(format!(
            "{}() must return an array of {{ name, handler }}",
            ACCESSOR_GLOBAL
        ))
    };
    let list = list
        .as_object()
        .filter(|obj| obj.is_array())
        .map(|obj| obj.clone())
        .ok_or_else(not_a_list)?;
    let list = JsArray::from_object(list).map_err(|_| not_a_list())?;
    let length: usize = list
        .length(ctx)
        .map_err(|e| HostwebError::InvalidModule(e.to_string()))?
        .try_into()
        .map_err(|_| not_a_list())?;

    let mut handlers = Vec::new();
    for i in 0..length {
        let item = list
            .get(i, ctx)
            .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
        let item = item.as_object().map(|obj| obj.clone()).ok_or_else(not_a_list)?;

        let name = item
            .get(js_string!("name"), ctx)
            .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
        let name = name
            .as_string()
            .map(|s| s.to_std_string_escaped())
            .ok_or_else(|| HostwebError::InvalidModule(format!("entry {} has no name", i)))?;

        let handler = item
            .get(js_string!("handler"), ctx)
            .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
        let handler = callable(&handler).ok_or_else(|| {
            HostwebError::InvalidModule(format!("handler of '{}' is not a function", name))
        })?;

        handlers.push((name, handler));
    }
    Ok(handlers)
}

fn global_accessor(ctx: &mut Context) -> Result<JsObject> {
    let global = ctx.global_object();
    let exported = global
        .get(js_string!(ACCESSOR_GLOBAL), ctx)
        .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
    resolve_accessor(&exported, ctx)
}

/// Links and runs an ES module, then looks up its accessor: the `__hwapi`
/// export, the default export, and finally the global.
fn module_accessor(module: &Module, ctx: &mut Context) -> Result<JsObject> {
    let evaluated = module.load_link_evaluate(ctx);
    let _ = ctx.run_jobs();
    match evaluated.state() {
        PromiseState::Fulfilled(_) => {}
        PromiseState::Rejected(reason) => {
            return Err(HostwebError::InvalidModule(format!(
                "evaluation failed: {}",
                reason.display()
            )))
        }
        PromiseState::Pending => {
            return Err(HostwebError::InvalidModule(
                "module evaluation never finished".into(),
            ))
        }
    }

    let namespace = module.namespace(ctx);
    for export in [ACCESSOR_GLOBAL, "default"] {
        let value = namespace
            .get(js_string!(export), ctx)
            .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
        if let Some(function) = callable(&value) {
            return Ok(function);
        }
    }
    global_accessor(ctx)
}

/// The accessor is either a function or an object with a callable `default`.
fn resolve_accessor(exported: &JsValue, ctx: &mut Context) -> Result<JsObject> {
    if let Some(function) = callable(exported) {
        return Ok(function);
    }
    if let Some(namespace) = exported.as_object() {
        let default = namespace
            .get(js_string!("default"), ctx)
            .map_err(|e| HostwebError::InvalidModule(e.to_string()))?;
        if let Some(function) = callable(&default) {
            return Ok(function);
        }
    }
    Err(HostwebError::InvalidModule(format!(
        "{} is missing or not a function",
        ACCESSOR_GLOBAL
    )))
}

fn callable(value: &JsValue) -> Option<JsObject> {
    value
        .as_object()
        .filter(|obj| obj.is_callable())
        .map(|obj| obj.clone())
}

fn invoke(handler: &JsObject, args: Vec<JsonValue>, ctx: &mut Context) -> Result<JsonValue> {
    let mut js_args = Vec::with_capacity(args.len());
    for arg in args {
        js_args.push(json_to_js_value(arg, ctx)?);
    }

    let value = handler
        .call(&JsValue::undefined(), &js_args, ctx)
        .map_err(|e| HostwebError::JavaScriptExecution(e.to_string()))?;
    let value = settle(value, ctx)?;
    js_value_to_json(value, ctx)
}

/// Unwraps a promise by draining the job queue. Other values pass through.
fn settle(value: JsValue, ctx: &mut Context) -> Result<JsValue> {
    let Some(obj) = value.as_object().map(|obj| obj.clone()) else {
        return Ok(value);
    };
    let Ok(promise) = JsPromise::from_object(obj) else {
        return Ok(value);
    };

    let _ = ctx.run_jobs();
    match promise.state() {
        PromiseState::Fulfilled(result) => Ok(result),
        PromiseState::Rejected(reason) => {
            let message = reason
                .to_string(ctx)
                .map(|s| s.to_std_string_escaped())
                .unwrap_or_else(|_| "promise rejected".to_string());
            Err(HostwebError::JavaScriptExecution(message))
        }
        PromiseState::Pending => Err(HostwebError::JavaScriptExecution(
            "promise never settled".into(),
        )),
    }
}
