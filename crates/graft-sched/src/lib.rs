//! graft Scheduler / Platform Bridge
//!
//! Routes asynchronous work generated by the embedded JavaScript engine to
//! either a background worker pool or the host's event loop, and provides
//! the engine's monotonic time source.
//!
//! Features:
//! - Background execution on a fixed worker pool
//! - Foreground execution as run-once callbacks on the host event loop
//! - Monotonic time at millisecond resolution

mod event_loop;
mod pool;

pub use event_loop::{EventLoop, EventLoopHandle};
pub use pool::WorkerPool;

use std::time::Instant;

/// A unit of work emitted by the engine or a binding; consumed exactly once.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Engine-facing scheduling surface.
///
/// The engine schedules internal work without knowing the host's concurrency
/// model; implementations translate that into host execution.
pub trait Scheduler: Send + Sync {
    /// Run a task on a background worker thread.
    fn push_background(&self, task: Task);

    /// Run a task on the next host event-loop iteration.
    fn push_foreground(&self, task: Task);

    /// Seconds elapsed since this scheduler was created, at millisecond
    /// resolution.
    fn monotonic_time(&self) -> f64;
}

/// Production scheduler: background tasks go to the worker pool, foreground
/// tasks to the host event loop captured at construction time.
pub struct PlatformBridge {
    pool: WorkerPool,
    main_loop: EventLoopHandle,
    start: Instant,
}

impl PlatformBridge {
    pub fn new(main_loop: EventLoopHandle) -> Self {
        Self {
            pool: WorkerPool::with_default_size(),
            main_loop,
            start: Instant::now(),
        }
    }

    /// Stop the worker pool, waiting for already-queued tasks to finish.
    pub fn shutdown(&self) {
        self.pool.shutdown();
    }
}

impl Scheduler for PlatformBridge {
    fn push_background(&self, task: Task) {
        self.pool.push(task);
    }

    fn push_foreground(&self, task: Task) {
        self.main_loop.post(task);
    }

    fn monotonic_time(&self) -> f64 {
        (self.start.elapsed().as_millis() as f64) / 1000.0
    }
}

/// Test scheduler that runs every task immediately on the calling thread.
pub struct InlineScheduler {
    start: Instant,
}

impl InlineScheduler {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for InlineScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for InlineScheduler {
    fn push_background(&self, task: Task) {
        task();
    }

    fn push_foreground(&self, task: Task) {
        task();
    }

    fn monotonic_time(&self) -> f64 {
        (self.start.elapsed().as_millis() as f64) / 1000.0
    }
}
