//! Instruction binding: instruction decoding stubs.

use rquickjs::{Coerced, Ctx, Function, Object};

use super::{Binding, HostServices};

pub struct InstructionBinding;

fn parse<'js>(ctx: Ctx<'js>, address: Coerced<f64>) -> rquickjs::Result<Object<'js>> {
    let details = Object::new(ctx)?;
    details.set("address", address.0)?;
    details.set("mnemonic", "unknown")?;
    details.set("size", 0u32)?;
    Ok(details)
}

impl Binding for InstructionBinding {
    fn name(&self) -> &'static str {
        "instruction"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let instruction = Object::new(ctx.clone())?;
        instruction.set("parse", Function::new(ctx.clone(), parse)?)?;
        ctx.globals().set("Instruction", instruction)?;
        Ok(())
    }
}
