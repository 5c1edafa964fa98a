//! Script lifecycle controller.
//!
//! A [`Script`] owns one execution context inside the shared engine runtime.
//! Context and compiled program are created together and torn down together;
//! the subsystem bindings are initialized in a fixed registration order and
//! disposed in the exact reverse.

use std::sync::{Arc, Mutex};

use rquickjs::{Context, Ctx, Function, Object, Value};

use crate::bindings::core::CoreChannel;
use crate::bindings::stalker::TracerHandle;
use crate::bindings::{self, Binding, HostServices};
use crate::runtime::EngineRuntime;
use crate::scope;
use crate::{MessageHandler, ScriptError};

/// Bootstrap source prepended to every script. Kept to a single line so
/// reported line numbers can be adjusted by a fixed count.
const RUNTIME_PRELUDE: &str = "var NULL=0;function ptr(v){return typeof v===\"string\"?parseInt(v,16):v;}function isNull(v){return ptr(v)===0;}";
pub(crate) const RUNTIME_PRELUDE_LINES: i32 = 1;

/// Global under which the compiled program is stashed. Engine values never
/// leave their context; the host reaches the program through this name.
const PROGRAM_GLOBAL: &str = "__graftMain";

/// Outbound message sink shared between the script handle, the execution
/// scope, and the core binding. Replacing the handler drops the previous one.
#[derive(Clone, Default)]
pub(crate) struct MessageSink(Arc<Mutex<Option<MessageHandler>>>);

impl MessageSink {
    pub(crate) fn replace(&self, handler: Option<MessageHandler>) {
        *self.0.lock().unwrap() = handler;
    }

    pub(crate) fn emit(&self, message: &str, data: Option<&[u8]>) {
        match &*self.0.lock().unwrap() {
            Some(handler) => handler(message, data),
            None => tracing::debug!("no message handler registered; dropping message"),
        }
    }
}

pub(crate) struct ScriptState {
    context: Option<Context>,
    bindings: Vec<Box<dyn Binding>>,
    loaded: bool,
}

pub(crate) struct ScriptShared {
    source: String,
    pub(crate) runtime: &'static EngineRuntime,
    pub(crate) state: Mutex<ScriptState>,
    pub(crate) sink: MessageSink,
    pub(crate) channel: Arc<CoreChannel>,
    pub(crate) tracer: TracerHandle,
}

/// Handle to one script instance. Clones share the instance; dropping the
/// last clone unloads it and releases its execution context.
#[derive(Clone)]
pub struct Script {
    shared: Arc<ScriptShared>,
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script").finish_non_exhaustive()
    }
}

impl Script {
    /// Compile `source` against a fresh execution context with the standard
    /// binding set installed.
    pub fn new(source: impl Into<String>) -> Result<Self, ScriptError> {
        Self::with_bindings(source, bindings::default_bindings())
    }

    /// Compile with a caller-supplied binding set. Registration order is
    /// preserved for init/realize; dispose/finalize run in exact reverse.
    pub fn with_bindings(
        source: impl Into<String>,
        bindings: Vec<Box<dyn Binding>>,
    ) -> Result<Self, ScriptError> {
        let runtime = EngineRuntime::acquire();
        let shared = Arc::new(ScriptShared {
            source: source.into(),
            runtime,
            state: Mutex::new(ScriptState {
                context: None,
                bindings,
                loaded: false,
            }),
            sink: MessageSink::default(),
            channel: Arc::new(CoreChannel::default()),
            tracer: TracerHandle::default(),
        });
        {
            let mut state = shared.state.lock().unwrap();
            create_context(&shared, &mut state)?;
        }
        Ok(Self { shared })
    }

    pub fn source(&self) -> &str {
        &self.shared.source
    }

    /// Register the outbound message sink; the previous handler is released.
    pub fn set_message_handler<F>(&self, handler: F)
    where
        F: Fn(&str, Option<&[u8]>) + Send + 'static,
    {
        self.shared.sink.replace(Some(Box::new(handler)));
    }

    pub fn clear_message_handler(&self) {
        self.shared.sink.replace(None);
    }

    /// Run the compiled program once. Loading an already-loaded script is a
    /// no-op; if the context was torn down, a fresh one is built first.
    pub fn load(&self) {
        let shared = &self.shared;
        let context = {
            let mut state = shared.state.lock().unwrap();

            if state.context.is_none() {
                if let Err(err) = create_context(shared, &mut state) {
                    // Surfacing this would change the load() contract, so it
                    // is logged rather than dropped on the floor.
                    tracing::warn!("failed to rebuild script context: {err}");
                }
            }

            if state.loaded {
                return;
            }
            let Some(context) = state.context.clone() else {
                return;
            };
            state.loaded = true;
            context
        };
        tracing::debug!("loading script");

        // The state lock is released before entering: the program may call
        // send(), and the handler is free to re-enter the script API.
        scope::enter(shared, &context, |ctx| {
            let main: Option<Function> = ctx.globals().get(PROGRAM_GLOBAL)?;
            match main {
                Some(main) => main.call::<_, ()>(()),
                None => Ok(()),
            }
        });
    }

    /// Tear the execution context down. No-op if not loaded.
    pub fn unload(&self) {
        let mut state = self.shared.state.lock().unwrap();
        if !state.loaded {
            return;
        }
        state.loaded = false;
        tracing::debug!("unloading script");
        destroy_context(&mut state);
    }

    /// Deliver an inbound message to the script's receive queue.
    pub fn post_message(&self, message: &str) {
        let shared = &self.shared;
        let context = {
            let state = shared.state.lock().unwrap();
            match (&state.context, state.loaded) {
                (Some(context), true) => context.clone(),
                _ => {
                    tracing::debug!("message posted to unloaded script; dropped");
                    return;
                }
            }
        };
        let message = message.to_owned();
        scope::enter(shared, &context, |ctx| {
            let callback: Value =
                ctx.eval("globalThis.__graft ? __graft.recvQueue.shift() : void 0")?;
            let Some(callback) = callback.into_function() else {
                tracing::debug!("no recv() callback registered; dropping message");
                return Ok(());
            };
            let value = ctx.json_parse(message)?;
            callback.call::<_, ()>((value,))
        });
    }

    /// Host-side handle to the code-tracing binding.
    pub fn tracer(&self) -> TracerHandle {
        self.shared.tracer.clone()
    }
}

impl ScriptShared {
    /// Re-enter script code for a fired timer. Dropped silently if the
    /// script was unloaded or the timer was cleared in the meantime.
    pub(crate) fn run_timer(&self, id: u32) {
        let context = {
            let state = self.state.lock().unwrap();
            match (&state.context, state.loaded) {
                (Some(context), true) => context.clone(),
                _ => return,
            }
        };
        scope::enter(self, &context, |ctx| {
            let registry: Option<Object> = ctx.globals().get("__graft")?;
            let Some(registry) = registry else {
                return Ok(());
            };
            let timers: Object = registry.get("timers")?;
            let key = id.to_string();
            let callback: Option<Function> = timers.get(key.as_str())?;
            let Some(callback) = callback else {
                return Ok(());
            };
            timers.remove(key)?;
            callback.call::<_, ()>(())
        });
    }
}

impl Drop for ScriptShared {
    fn drop(&mut self) {
        let state = match self.state.get_mut() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        };
        state.loaded = false;
        destroy_context(state);
    }
}

/// Build the execution context: initialize every binding in registration
/// order, realize them in the same order, then compile the combined
/// bootstrap+user source. On compile failure the partial context is torn
/// down and the script is left with neither context nor program.
fn create_context(
    shared: &Arc<ScriptShared>,
    state: &mut ScriptState,
) -> Result<(), ScriptError> {
    debug_assert!(state.context.is_none());

    let context = Context::full(shared.runtime.engine())
        .map_err(|err| ScriptError::Engine(err.to_string()))?;
    state.context = Some(context.clone());

    let services = HostServices::new(shared);
    let compiled = context.with(|ctx| -> Result<(), ScriptError> {
        for binding in state.bindings.iter_mut() {
            tracing::trace!("initializing binding {}", binding.name());
            binding
                .init(&services, &ctx)
                .map_err(|err| engine_error(&ctx, err))?;
        }
        for binding in state.bindings.iter_mut() {
            binding
                .realize(&ctx)
                .map_err(|err| engine_error(&ctx, err))?;
        }

        let combined = format!("(function(){{{RUNTIME_PRELUDE}\n{}\n}})", shared.source);
        match ctx.eval::<Function, _>(combined) {
            Ok(program) => ctx
                .globals()
                .set(PROGRAM_GLOBAL, program)
                .map_err(|err| engine_error(&ctx, err)),
            Err(rquickjs::Error::Exception) => {
                let caught = ctx.catch();
                let (line, message) = scope::exception_details(&ctx, caught);
                Err(ScriptError::Compile {
                    line: (line - RUNTIME_PRELUDE_LINES).max(1),
                    message,
                })
            }
            Err(err) => Err(ScriptError::Engine(err.to_string())),
        }
    });

    match compiled {
        Ok(()) => Ok(()),
        Err(err) => {
            destroy_context(state);
            Err(err)
        }
    }
}

/// Shared teardown for unload, failed compilation, and forced disposal.
/// Bindings flush and dispose inside the dying context, then finalize once
/// the context is gone; dispose/finalize order is the exact reverse of
/// registration.
fn destroy_context(state: &mut ScriptState) {
    let Some(context) = state.context.take() else {
        return;
    };

    context.with(|ctx| {
        for binding in state.bindings.iter_mut() {
            binding.flush(&ctx);
        }
        for binding in state.bindings.iter_mut().rev() {
            tracing::trace!("disposing binding {}", binding.name());
            binding.dispose(&ctx);
        }
    });
    drop(context);

    for binding in state.bindings.iter_mut().rev() {
        binding.finalize();
    }
    state.loaded = false;
}

fn engine_error(ctx: &Ctx<'_>, err: rquickjs::Error) -> ScriptError {
    match err {
        rquickjs::Error::Exception => {
            let caught = ctx.catch();
            let (_, message) = scope::exception_details(ctx, caught);
            ScriptError::Engine(message)
        }
        other => ScriptError::Engine(other.to_string()),
    }
}
