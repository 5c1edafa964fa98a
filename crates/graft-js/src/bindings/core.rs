//! Core binding: the script side of the message channel, plus timers.
//!
//! Installs `send`, `recv`, `setTimeout`/`clearTimeout`, and
//! `_monotonicTime` into the global namespace. Callbacks the script
//! registers never leave the engine: they live in an in-context registry
//! object, and only numeric timer ids cross thread boundaries. Timer
//! callbacks travel background-then-foreground through the scheduler and
//! re-enter script code under a fresh execution scope.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use rquickjs::{Array, Coerced, Ctx, Function, Object, Value};

use super::{Binding, HostServices};

/// Host-side timer id allocator shared between the script handle and the
/// installed JavaScript functions. Callback storage stays in the context.
#[derive(Default)]
pub struct CoreChannel {
    next_timer: AtomicU32,
}

impl CoreChannel {
    fn next_timer_id(&self) -> u32 {
        self.next_timer.fetch_add(1, Ordering::Relaxed) + 1
    }
}

pub struct CoreBinding;

impl Binding for CoreBinding {
    fn name(&self) -> &'static str {
        "core"
    }

    fn init<'js>(&mut self, services: &HostServices, ctx: &Ctx<'js>) -> rquickjs::Result<()> {
        // The in-context callback registry: a FIFO of recv() callbacks and
        // a timer-id-keyed table of pending timer callbacks.
        ctx.eval::<(), _>("globalThis.__graft={recvQueue:[],timers:{}};")?;
        let globals = ctx.globals();

        let send_services = services.clone();
        globals.set(
            "send",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, payload: Value<'js>| -> rquickjs::Result<()> {
                    let payload = ctx
                        .json_stringify(payload)?
                        .map(|text| text.to_string())
                        .transpose()?
                        .unwrap_or_else(|| String::from("null"));
                    send_services
                        .emit_message(&format!("{{\"type\":\"send\",\"payload\":{payload}}}"), None);
                    Ok(())
                },
            )?,
        )?;

        globals.set(
            "recv",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>, callback: Function<'js>| -> rquickjs::Result<()> {
                    let registry: Object = ctx.globals().get("__graft")?;
                    let queue: Array = registry.get("recvQueue")?;
                    queue.set(queue.len(), callback)
                },
            )?,
        )?;

        let timer_services = services.clone();
        let channel = services.channel.clone();
        globals.set(
            "setTimeout",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx<'js>,
                      callback: Function<'js>,
                      delay: Coerced<f64>|
                      -> rquickjs::Result<u32> {
                    let id = channel.next_timer_id();
                    let registry: Object = ctx.globals().get("__graft")?;
                    let timers: Object = registry.get("timers")?;
                    timers.set(id.to_string(), callback)?;
                    let delay = Duration::from_millis(delay.0.max(0.0) as u64);
                    let script = timer_services.script.clone();
                    let foreground = timer_services.scheduler.clone();
                    timer_services.scheduler.push_background(Box::new(move || {
                        std::thread::sleep(delay);
                        foreground.push_foreground(Box::new(move || {
                            if let Some(script) = script.upgrade() {
                                script.run_timer(id);
                            }
                        }));
                    }));
                    Ok(id)
                },
            )?,
        )?;

        globals.set(
            "clearTimeout",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx, id: Coerced<i32>| -> rquickjs::Result<()> {
                    if id.0 >= 0 {
                        let registry: Object = ctx.globals().get("__graft")?;
                        let timers: Object = registry.get("timers")?;
                        timers.remove((id.0 as u32).to_string())?;
                    }
                    Ok(())
                },
            )?,
        )?;

        let time_services = services.clone();
        globals.set(
            "_monotonicTime",
            Function::new(ctx.clone(), move |_ctx: Ctx| -> rquickjs::Result<f64> {
                Ok(time_services.monotonic_time())
            })?,
        )?;

        Ok(())
    }

    fn realize(&mut self, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let script = Object::new(ctx.clone())?;
        script.set("runtime", "quickjs")?;
        ctx.globals().set("Script", script)?;
        Ok(())
    }

    fn flush(&mut self, ctx: &Ctx<'_>) {
        let _ = ctx.eval::<(), _>(
            "if(globalThis.__graft){__graft.recvQueue.length=0;__graft.timers={};}",
        );
    }
}
