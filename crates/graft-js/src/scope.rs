//! Execution scope.
//!
//! Every entry into script code goes through [`enter`], which locks the
//! engine, enters the script's context, and on the way out converts an
//! uncaught exception into an outbound error message, advances deferred
//! tracer work, and drains the engine's pending-job queue. No script-raised
//! exception ever propagates past this boundary.

use rquickjs::{Coerced, Context, Ctx, FromJs, Value};
use serde::Serialize;

use crate::script::{RUNTIME_PRELUDE_LINES, ScriptShared};

#[derive(Serialize)]
struct ErrorMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    #[serde(rename = "lineNumber")]
    line_number: i32,
    description: &'a str,
}

pub(crate) fn enter<R>(
    shared: &ScriptShared,
    context: &Context,
    body: impl for<'js> FnOnce(Ctx<'js>) -> rquickjs::Result<R>,
) -> Option<R> {
    let result = context.with(|ctx| match body(ctx.clone()) {
        Ok(value) => Some(value),
        Err(rquickjs::Error::Exception) => {
            let caught = ctx.catch();
            let (line, description) = exception_details(&ctx, caught);
            emit_error(shared, (line - RUNTIME_PRELUDE_LINES).max(1), &description);
            None
        }
        Err(err) => {
            tracing::error!("engine fault while running script code: {err}");
            None
        }
    });

    shared.tracer.process_pending();
    shared.runtime.pump_jobs();
    result
}

fn emit_error(shared: &ScriptShared, line_number: i32, description: &str) {
    let message = ErrorMessage {
        kind: "error",
        line_number,
        description,
    };
    if let Ok(json) = serde_json::to_string(&message) {
        shared.sink.emit(&json, None);
    }
}

/// Description (the engine's string coercion of the caught value) and the
/// 1-based line number within the combined source, when recoverable.
pub(crate) fn exception_details<'js>(ctx: &Ctx<'js>, caught: Value<'js>) -> (i32, String) {
    let line = exception_line(&caught).unwrap_or(RUNTIME_PRELUDE_LINES + 1);
    let description = match Coerced::<String>::from_js(ctx, caught) {
        Ok(Coerced(text)) => text,
        Err(_) => String::from("(unprintable exception)"),
    };
    (line, description)
}

fn exception_line(caught: &Value<'_>) -> Option<i32> {
    let object = caught.as_object()?;
    if let Ok(Some(Coerced(line))) = object.get::<_, Option<Coerced<i32>>>("lineNumber") {
        return Some(line);
    }
    let Ok(Some(Coerced(stack))) = object.get::<_, Option<Coerced<String>>>("stack") else {
        return None;
    };
    stack_line_number(&stack)
}

/// First line number mentioned in a stack trace. Frames look like
/// `    at <anonymous> (eval_script:3)`, possibly with a trailing column.
fn stack_line_number(stack: &str) -> Option<i32> {
    for frame in stack.lines() {
        for piece in frame.split(':').skip(1) {
            let digits: String = piece.chars().take_while(|c| c.is_ascii_digit()).collect();
            if let Ok(number) = digits.parse::<i32>() {
                return Some(number);
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_frames() {
        assert_eq!(stack_line_number("    at <eval> (eval_script:7)"), Some(7));
    }

    #[test]
    fn parses_frames_with_columns() {
        assert_eq!(
            stack_line_number("    at run (eval_script:12:5)\n    at <eval> (eval_script:20:1)"),
            Some(12)
        );
    }

    #[test]
    fn ignores_frames_without_positions() {
        assert_eq!(stack_line_number("    at native code"), None);
        assert_eq!(stack_line_number(""), None);
    }

    #[test]
    fn error_message_shape_is_stable() {
        let json = serde_json::to_string(&ErrorMessage {
            kind: "error",
            line_number: 3,
            description: "Error: boom",
        })
        .unwrap();
        assert_eq!(
            json,
            r#"{"type":"error","lineNumber":3,"description":"Error: boom"}"#
        );
    }
}
