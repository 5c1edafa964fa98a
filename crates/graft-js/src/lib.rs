//! graft JavaScript host
//!
//! Embeds a QuickJS runtime inside the host process and exposes a controlled
//! set of instrumentation capabilities to user-supplied scripts.
//!
//! Features:
//! - Process-wide engine runtime bridged to a worker pool and the host
//!   event loop
//! - Per-script execution contexts with a create/compile/load/unload
//!   lifecycle
//! - Uncaught script exceptions converted to structured messages, never
//!   surfaced as host exceptions
//! - Optional debug bridge for host tooling

pub mod bindings;
pub mod debug;
mod runtime;
mod scope;
mod script;

pub use bindings::stalker::TracerHandle;
pub use bindings::{Binding, HostServices, default_bindings};
pub use runtime::EngineRuntime;
pub use script::Script;

/// Outbound message sink callback: serialized message plus optional raw
/// bytes attached by a binding.
pub type MessageHandler = Box<dyn Fn(&str, Option<&[u8]>) + Send + 'static>;

/// Script host error
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// User source failed to compile. The line number is 1-based and
    /// relative to the user's own source; bootstrap lines are never counted.
    #[error("Script(line {line}): {message}")]
    Compile { line: i32, message: String },

    /// The engine itself failed.
    #[error("JavaScript engine error: {0}")]
    Engine(String),
}
