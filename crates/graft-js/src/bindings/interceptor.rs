//! Interceptor binding: attach listeners to named targets.
//!
//! Listener callbacks stay inside the context, in an engine-owned table;
//! the host retains only the target names, for teardown logging.

use std::sync::{Arc, Mutex};

use rquickjs::{Ctx, Function, Object};

use super::{Binding, HostServices};

pub struct InterceptorBinding {
    targets: Arc<Mutex<Vec<String>>>,
}

impl InterceptorBinding {
    pub fn new() -> Self {
        Self {
            targets: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Binding for InterceptorBinding {
    fn name(&self) -> &'static str {
        "interceptor"
    }

    fn init<'js>(&mut self, _services: &HostServices, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        ctx.eval::<(), _>("globalThis.__graftListeners={};")?;
        let interceptor = Object::new(ctx.clone())?;

        let targets = self.targets.clone();
        interceptor.set(
            "attach",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, target: String, callbacks: Object<'js>| -> rquickjs::Result<u32> {
                    let mut targets = targets.lock().unwrap();
                    targets.push(target);
                    let id = targets.len() as u32;
                    let table: Object = ctx.globals().get("__graftListeners")?;
                    table.set(id.to_string(), callbacks)?;
                    Ok(id)
                },
            )?,
        )?;

        let targets = self.targets.clone();
        interceptor.set(
            "detachAll",
            Function::new(ctx.clone(), move |ctx: Ctx| -> rquickjs::Result<()> {
                targets.lock().unwrap().clear();
                ctx.eval::<(), _>("globalThis.__graftListeners={};")
            })?,
        )?;

        ctx.globals().set("Interceptor", interceptor)?;
        Ok(())
    }

    fn dispose(&mut self, _ctx: &Ctx<'_>) {
        for target in self.targets.lock().unwrap().drain(..) {
            tracing::trace!(listener = %target, "detaching listener");
        }
    }
}
