//! Symbol binding: address-to-symbol lookup stubs.

use rquickjs::{Coerced, Ctx, Function, Object, Value};

use super::{Binding, HostServices};

pub struct SymbolBinding;

fn from_address<'js>(ctx: Ctx<'js>, address: Coerced<f64>) -> rquickjs::Result<Object<'js>> {
    let details = Object::new(ctx.clone())?;
    details.set("address", address.0)?;
    details.set("name", Value::new_null(ctx.clone()))?;
    details.set("moduleName", Value::new_null(ctx))?;
    Ok(details)
}

impl Binding for SymbolBinding {
    fn name(&self) -> &'static str {
        "symbol"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let symbol = Object::new(ctx.clone())?;
        symbol.set("fromAddress", Function::new(ctx.clone(), from_address)?)?;
        ctx.globals().set("DebugSymbol", symbol)?;
        Ok(())
    }
}
