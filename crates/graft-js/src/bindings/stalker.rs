//! Stalker binding: execution tracing control.
//!
//! Trace events raised while script code runs are deferred and drained
//! when the execution scope closes, never mid-invocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use rquickjs::{Ctx, Function, Object};

use super::{Binding, HostServices};

#[derive(Default)]
struct TracerState {
    following: AtomicBool,
    pending: Mutex<Vec<String>>,
}

/// Shared handle onto the tracer, cloned into the script and its scopes.
#[derive(Clone, Default)]
pub struct TracerHandle {
    inner: Arc<TracerState>,
}

impl TracerHandle {
    pub fn is_following(&self) -> bool {
        self.inner.following.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().unwrap().len()
    }

    /// Drain deferred trace events. Called on scope exit.
    pub fn process_pending(&self) {
        let events: Vec<String> = self.inner.pending.lock().unwrap().drain(..).collect();
        for event in events {
            tracing::trace!(%event, "trace event");
        }
    }

    pub(crate) fn defer(&self, event: String) {
        self.inner.pending.lock().unwrap().push(event);
    }

    pub(crate) fn set_following(&self, following: bool) {
        self.inner.following.store(following, Ordering::Release);
    }
}

pub struct StalkerBinding {
    tracer: Option<TracerHandle>,
}

impl StalkerBinding {
    pub fn new() -> Self {
        Self { tracer: None }
    }
}

impl Binding for StalkerBinding {
    fn name(&self) -> &'static str {
        "stalker"
    }

    fn init(&mut self, services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let tracer = services.tracer.clone();
        self.tracer = Some(tracer.clone());
        let stalker = Object::new(ctx.clone())?;

        let follow = tracer.clone();
        stalker.set(
            "follow",
            Function::new(ctx.clone(), move |_ctx: Ctx| -> rquickjs::Result<()> {
                follow.set_following(true);
                follow.defer(String::from("follow"));
                Ok(())
            })?,
        )?;

        let unfollow = tracer.clone();
        stalker.set(
            "unfollow",
            Function::new(ctx.clone(), move |_ctx: Ctx| -> rquickjs::Result<()> {
                unfollow.set_following(false);
                unfollow.defer(String::from("unfollow"));
                Ok(())
            })?,
        )?;

        let flush = tracer.clone();
        stalker.set(
            "flush",
            Function::new(ctx.clone(), move |_ctx: Ctx| -> rquickjs::Result<()> {
                flush.defer(String::from("flush"));
                Ok(())
            })?,
        )?;

        ctx.globals().set("Stalker", stalker)?;
        Ok(())
    }

    fn dispose(&mut self, _ctx: &Ctx<'_>) {
        if let Some(tracer) = &self.tracer {
            tracer.set_following(false);
        }
    }

    fn finalize(&mut self) {
        if let Some(tracer) = self.tracer.take() {
            tracer.process_pending();
        }
    }
}
