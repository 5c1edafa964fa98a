//! Memory binding: host-managed allocations addressed by opaque handles.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use rquickjs::{Coerced, Ctx, Exception, Function, Object};

use super::{Binding, HostServices};

type Allocations = Arc<Mutex<HashMap<u32, Vec<u8>>>>;

pub struct MemoryBinding {
    allocations: Allocations,
    next_handle: Arc<AtomicU32>,
}

impl MemoryBinding {
    pub fn new() -> Self {
        Self {
            allocations: Arc::new(Mutex::new(HashMap::new())),
            next_handle: Arc::new(AtomicU32::new(1)),
        }
    }
}

impl Binding for MemoryBinding {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn init(&mut self, _services: &HostServices, ctx: &Ctx<'_>) -> rquickjs::Result<()> {
        let memory = Object::new(ctx.clone())?;

        let allocations = self.allocations.clone();
        let next_handle = self.next_handle.clone();
        memory.set(
            "allocUtf8String",
            Function::new(
                ctx.clone(),
                move |_ctx: Ctx, text: String| -> rquickjs::Result<u32> {
                    let handle = next_handle.fetch_add(1, Ordering::Relaxed);
                    allocations
                        .lock()
                        .unwrap()
                        .insert(handle, text.into_bytes());
                    Ok(handle)
                },
            )?,
        )?;

        let allocations = self.allocations.clone();
        memory.set(
            "readUtf8String",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx, handle: Coerced<i64>| -> rquickjs::Result<String> {
                    let table = allocations.lock().unwrap();
                    let bytes = u32::try_from(handle.0)
                        .ok()
                        .and_then(|handle| table.get(&handle))
                        .ok_or_else(|| {
                            Exception::throw_message(&ctx, "invalid memory handle")
                        })?;
                    Ok(String::from_utf8_lossy(bytes).into_owned())
                },
            )?,
        )?;

        let allocations = self.allocations.clone();
        memory.set(
            "writeUtf8String",
            Function::new(
                ctx.clone(),
                move |ctx: Ctx, handle: Coerced<i64>, text: String| -> rquickjs::Result<()> {
                    let mut table = allocations.lock().unwrap();
                    let slot = u32::try_from(handle.0)
                        .ok()
                        .and_then(|handle| table.get_mut(&handle))
                        .ok_or_else(|| {
                            Exception::throw_message(&ctx, "invalid memory handle")
                        })?;
                    *slot = text.into_bytes();
                    Ok(())
                },
            )?,
        )?;

        ctx.globals().set("Memory", memory)?;
        Ok(())
    }

    fn finalize(&mut self) {
        self.allocations.lock().unwrap().clear();
    }
}
