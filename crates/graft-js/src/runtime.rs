//! Process-wide engine runtime.
//!
//! Exactly one QuickJS runtime exists per process. It is created on first
//! use and shared by every script; all entries into the engine contend on
//! its internal lock.

use std::sync::{Arc, Once, OnceLock};

use graft_sched::{EventLoop, PlatformBridge, Scheduler};

const ENGINE_MEMORY_LIMIT: usize = 64 * 1024 * 1024;

static ENGINE: OnceLock<EngineRuntime> = OnceLock::new();

pub struct EngineRuntime {
    engine: rquickjs::Runtime,
    bridge: Arc<PlatformBridge>,
    event_loop: EventLoop,
}

impl EngineRuntime {
    /// The process-wide runtime, initialized on the first call. Concurrent
    /// first callers block until the single initializer completes.
    ///
    /// Initialization failure is fatal: no script can run without the
    /// engine, so there is no recovery path.
    pub fn acquire() -> &'static EngineRuntime {
        ENGINE.get_or_init(|| {
            let event_loop = EventLoop::new();
            let bridge = Arc::new(PlatformBridge::new(event_loop.handle()));
            let engine =
                rquickjs::Runtime::new().expect("JavaScript engine initialization failed");
            engine.set_memory_limit(ENGINE_MEMORY_LIMIT);
            tracing::info!("JavaScript engine runtime initialized");
            EngineRuntime {
                engine,
                bridge,
                event_loop,
            }
        })
    }

    pub(crate) fn engine(&self) -> &rquickjs::Runtime {
        &self.engine
    }

    pub(crate) fn scheduler(&self) -> Arc<dyn Scheduler> {
        self.bridge.clone()
    }

    /// The host event loop carrying foreground callbacks. The embedder is
    /// expected to pump it.
    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Drain the engine's internal pending-job queue.
    pub fn pump_jobs(&self) {
        loop {
            match self.engine.execute_pending_job() {
                Ok(true) => continue,
                Ok(false) => break,
                Err(_) => tracing::debug!("pending engine job raised"),
            }
        }
    }

    /// Process-exit teardown: disables the debug bridge and stops the worker
    /// pool. Idempotent; the engine itself lives until the process exits.
    pub fn shutdown() {
        static TEARDOWN: Once = Once::new();
        TEARDOWN.call_once(|| {
            let Some(runtime) = ENGINE.get() else { return };
            crate::debug::set_debug_message_handler(None);
            runtime.bridge.shutdown();
            tracing::info!("JavaScript engine runtime shut down");
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_returns_the_same_runtime() {
        let a = EngineRuntime::acquire() as *const EngineRuntime;
        let b = EngineRuntime::acquire() as *const EngineRuntime;
        assert_eq!(a, b);
    }

    #[test]
    fn concurrent_first_callers_observe_one_runtime() {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                std::thread::spawn(|| EngineRuntime::acquire() as *const EngineRuntime as usize)
            })
            .collect();
        let mut seen: Vec<usize> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        seen.dedup();
        assert_eq!(seen.len(), 1);
    }
}
