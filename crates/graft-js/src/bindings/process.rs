//! Process binding: identity of the host process.

use rquickjs::{Ctx, Function, Object};

use super::{Binding, HostServices};

pub struct ProcessBinding;

impl Binding for ProcessBinding {
    fn name(&self) -> &'static str {
        "process"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let process = Object::new(ctx.clone())?;
        process.set("id", std::process::id())?;
        process.set("platform", std::env::consts::OS)?;
        process.set("arch", std::env::consts::ARCH)?;
        process.set("pointerSize", std::mem::size_of::<usize>() as u32)?;
        process.set("pageSize", 4096u32)?;
        process.set(
            "getCurrentDir",
            Function::new(ctx.clone(), |ctx: Ctx| -> rquickjs::Result<String> {
                let dir = std::env::current_dir().map_err(|err| {
                    rquickjs::Exception::throw_message(&ctx, &err.to_string())
                })?;
                Ok(dir.to_string_lossy().into_owned())
            })?,
        )?;
        ctx.globals().set("Process", process)?;
        Ok(())
    }
}
