//! Module binding: loaded-module enumeration stubs.

use rquickjs::{Ctx, Function, Null, Object};

use super::{Binding, HostServices};

pub struct ModuleBinding;

impl Binding for ModuleBinding {
    fn name(&self) -> &'static str {
        "module"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let module = Object::new(ctx.clone())?;
        module.set(
            "enumerate",
            Function::new(ctx.clone(), || Vec::<String>::new())?,
        )?;
        module.set(
            "findBaseAddress",
            Function::new(ctx.clone(), |_name: String| Null)?,
        )?;
        ctx.globals().set("Module", module)?;
        Ok(())
    }
}
