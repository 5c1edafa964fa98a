//! File binding: whole-file text I/O.

use rquickjs::{Ctx, Exception, Function, Object};

use super::{Binding, HostServices};

pub struct FileBinding;

impl Binding for FileBinding {
    fn name(&self) -> &'static str {
        "file"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let file = Object::new(ctx.clone())?;
        file.set(
            "readAllText",
            Function::new(
                ctx.clone(),
                |ctx: Ctx, path: String| -> rquickjs::Result<String> {
                    std::fs::read_to_string(&path).map_err(|err| {
                        Exception::throw_message(&ctx, &format!("{path}: {err}"))
                    })
                },
            )?,
        )?;
        file.set(
            "writeAllText",
            Function::new(
                ctx.clone(),
                |ctx: Ctx, path: String, contents: String| -> rquickjs::Result<()> {
                    std::fs::write(&path, contents).map_err(|err| {
                        Exception::throw_message(&ctx, &format!("{path}: {err}"))
                    })
                },
            )?,
        )?;
        ctx.globals().set("File", file)?;
        Ok(())
    }
}
