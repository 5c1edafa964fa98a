//! Host event loop.
//!
//! Foreground tasks are attached here as high-priority, run-once callbacks
//! and executed when the host pumps the loop.

use smol::channel::{self, Receiver, Sender};

use crate::Task;

/// Queue of run-once foreground callbacks, pumped by the host thread.
pub struct EventLoop {
    tx: Sender<Task>,
    rx: Receiver<Task>,
}

impl EventLoop {
    pub fn new() -> Self {
        let (tx, rx) = channel::unbounded();
        Self { tx, rx }
    }

    /// A cloneable handle for attaching callbacks from other threads.
    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            tx: self.tx.clone(),
        }
    }

    /// Drain the queue, running each callback once. Returns how many ran.
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while let Ok(task) = self.rx.try_recv() {
            task();
            ran += 1;
        }
        ran
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Sending side of an [`EventLoop`].
#[derive(Clone)]
pub struct EventLoopHandle {
    tx: Sender<Task>,
}

impl EventLoopHandle {
    /// Attach a run-once callback; it executes on the next loop iteration.
    pub fn post(&self, task: Task) {
        if self.tx.try_send(task).is_err() {
            tracing::error!("event loop is gone; dropping foreground task");
        }
    }
}
