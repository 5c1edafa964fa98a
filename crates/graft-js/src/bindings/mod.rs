//! Subsystem bindings registered into every script's global namespace.
//!
//! Registration order is a correctness invariant: `init` and `realize` run
//! in the order built by [`default_bindings`], `dispose` and `finalize` in
//! the exact reverse. The core binding comes first so every other subsystem
//! can rely on the message channel being present. `dispose` runs inside the
//! dying context for bindings that must release engine-side references;
//! `finalize` runs after the context is gone for host-side resources that
//! must be freed regardless of context state.

pub mod core;
pub mod file;
pub mod instruction;
pub mod interceptor;
pub mod memory;
pub mod module;
pub mod process;
pub mod socket;
pub mod stalker;
pub mod symbol;
pub mod thread;

use std::sync::{Arc, Weak};

use graft_sched::Scheduler;
use rquickjs::Ctx;

use self::core::CoreChannel;
use self::stalker::TracerHandle;
use crate::script::{MessageSink, ScriptShared};

/// Lifecycle of one subsystem binding.
pub trait Binding: Send {
    fn name(&self) -> &'static str;

    /// Install the binding's globals into a freshly built context.
    fn init(&mut self, services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()>;

    /// Register objects that need the fully-assembled context; runs after
    /// every binding's `init`.
    fn realize(&mut self, _ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        Ok(())
    }

    /// Drain work still queued on the channel; runs first during teardown.
    fn flush(&mut self, _ctx: &Ctx<'_>) {}

    /// Release engine-side references; runs inside the dying context.
    fn dispose(&mut self, _ctx: &Ctx<'_>) {}

    /// Release host-side resources; runs after the context is gone.
    fn finalize(&mut self) {}
}

/// Per-script facilities handed to every binding at init time.
#[derive(Clone)]
pub struct HostServices {
    pub(crate) scheduler: Arc<dyn Scheduler>,
    pub(crate) sink: MessageSink,
    pub(crate) channel: Arc<CoreChannel>,
    pub(crate) tracer: TracerHandle,
    pub(crate) script: Weak<ScriptShared>,
}

impl HostServices {
    pub(crate) fn new(shared: &Arc<ScriptShared>) -> Self {
        Self {
            scheduler: shared.runtime.scheduler(),
            sink: shared.sink.clone(),
            channel: shared.channel.clone(),
            tracer: shared.tracer.clone(),
            script: Arc::downgrade(shared),
        }
    }

    /// Emit a message on the script's outbound channel.
    pub fn emit_message(&self, message: &str, data: Option<&[u8]>) {
        self.sink.emit(message, data);
    }

    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    pub fn monotonic_time(&self) -> f64 {
        self.scheduler.monotonic_time()
    }
}

/// The standard binding set, in registration order.
pub fn default_bindings() -> Vec<Box<dyn Binding>> {
    vec![
        Box::new(core::CoreBinding),
        Box::new(memory::MemoryBinding::new()),
        Box::new(process::ProcessBinding),
        Box::new(thread::ThreadBinding),
        Box::new(module::ModuleBinding),
        Box::new(file::FileBinding),
        Box::new(socket::SocketBinding),
        Box::new(interceptor::InterceptorBinding::new()),
        Box::new(stalker::StalkerBinding::new()),
        Box::new(symbol::SymbolBinding),
        Box::new(instruction::InstructionBinding),
    ]
}
