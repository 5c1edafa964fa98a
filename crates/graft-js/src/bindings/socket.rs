//! Socket binding.

use rquickjs::{Coerced, Ctx, Function, Null, Object};

use super::{Binding, HostServices};

pub struct SocketBinding;

impl Binding for SocketBinding {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let socket = Object::new(ctx.clone())?;
        socket.set(
            "localAddresses",
            Function::new(ctx.clone(), || {
                vec![String::from("127.0.0.1"), String::from("::1")]
            })?,
        )?;
        socket.set(
            "type",
            Function::new(ctx.clone(), |_fd: Coerced<i32>| Null)?,
        )?;
        ctx.globals().set("Socket", socket)?;
        Ok(())
    }
}
