//! Debug bridge.
//!
//! Process-wide channel between the engine and a single host-registered
//! debug handler. Inbound commands are JSON, e.g.
//! `{"id":1,"method":"evaluate","params":{"expression":"1+2"}}`; replies go
//! out through the registered handler as JSON text.

use std::sync::Mutex;

use rquickjs::{Context, Value};
use serde::Deserialize;
use serde_json::json;

use crate::runtime::EngineRuntime;
use crate::scope;

/// Receives serialized debug replies.
pub type DebugHandler = Box<dyn Fn(&str) + Send + 'static>;

struct DebugSession {
    handler: DebugHandler,
    context: Context,
}

static SESSION: Mutex<Option<DebugSession>> = Mutex::new(None);

#[derive(Deserialize)]
struct DebugCommand {
    id: u64,
    method: String,
    #[serde(default)]
    params: serde_json::Value,
}

/// Install or remove the process-wide debug handler. The previous handler,
/// if any, is released first; passing `None` disables debugging.
pub fn set_debug_message_handler(handler: Option<DebugHandler>) {
    let runtime = EngineRuntime::acquire();
    let mut session = SESSION.lock().unwrap();
    if session.take().is_some() {
        tracing::debug!("previous debug handler released");
    }
    let Some(handler) = handler else { return };
    match Context::full(runtime.engine()) {
        Ok(context) => {
            *session = Some(DebugSession { handler, context });
            tracing::info!("debug handler installed");
        }
        Err(err) => tracing::error!("failed to create debug context: {err}"),
    }
}

/// Submit a debug command and pump the engine's job queue before returning.
/// A handler must already be registered; posting without one is host misuse
/// and aborts.
pub fn post_debug_command(command: &str) {
    let runtime = EngineRuntime::acquire();
    let session = SESSION.lock().unwrap();
    let session = session
        .as_ref()
        .expect("debug command posted with no handler registered");
    let reply = dispatch(runtime, &session.context, command);
    (session.handler)(&reply);
    runtime.pump_jobs();
}

fn dispatch(runtime: &EngineRuntime, context: &Context, command: &str) -> String {
    let command: DebugCommand = match serde_json::from_str(command) {
        Ok(command) => command,
        Err(err) => {
            return json!({"id": null, "error": format!("malformed command: {err}")}).to_string();
        }
    };
    match command.method.as_str() {
        "evaluate" => evaluate(context, &command),
        "gc" => {
            runtime.engine().run_gc();
            json!({"id": command.id, "result": "ok"}).to_string()
        }
        "memory" => {
            let usage = runtime.engine().memory_usage();
            json!({
                "id": command.id,
                "result": {
                    "memoryUsedSize": usage.memory_used_size,
                    "mallocSize": usage.malloc_size,
                },
            })
            .to_string()
        }
        other => json!({"id": command.id, "error": format!("unknown method: {other}")}).to_string(),
    }
}

fn evaluate(context: &Context, command: &DebugCommand) -> String {
    let Some(expression) = command.params.get("expression").and_then(|v| v.as_str()) else {
        return json!({"id": command.id, "error": "missing expression"}).to_string();
    };
    let expression = expression.to_owned();
    let id = command.id;
    context.with(|ctx| match ctx.eval::<Value, _>(expression) {
        Ok(value) => {
            let serialized = ctx
                .json_stringify(value)
                .ok()
                .flatten()
                .and_then(|text| text.to_string().ok())
                .unwrap_or_else(|| String::from("null"));
            let result: serde_json::Value =
                serde_json::from_str(&serialized).unwrap_or(serde_json::Value::Null);
            json!({"id": id, "result": result}).to_string()
        }
        Err(rquickjs::Error::Exception) => {
            let caught = ctx.catch();
            let (_, description) = scope::exception_details(&ctx, caught);
            json!({"id": id, "error": description}).to_string()
        }
        Err(err) => json!({"id": id, "error": err.to_string()}).to_string(),
    })
}
