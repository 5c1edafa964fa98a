//! Thread binding.

use std::time::Duration;

use rquickjs::{Coerced, Ctx, Function, Object};

use super::{Binding, HostServices};

pub struct ThreadBinding;

impl Binding for ThreadBinding {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let thread = Object::new(ctx.clone())?;
        thread.set(
            "sleep",
            Function::new(
                ctx.clone(),
                |_ctx: Ctx, seconds: Coerced<f64>| -> rquickjs::Result<()> {
                    if seconds.0 > 0.0 {
                        std::thread::sleep(Duration::from_secs_f64(seconds.0));
                    }
                    Ok(())
                },
            )?,
        )?;
        thread.set(
            "backtrace",
            Function::new(ctx.clone(), || Vec::<String>::new())?,
        )?;
        ctx.globals().set("Thread", thread)?;
        Ok(())
    }
}
