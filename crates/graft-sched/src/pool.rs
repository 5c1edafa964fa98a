//! Background worker pool.
//!
//! Tasks pushed here run on a fixed set of pool threads. Ownership of a task
//! transfers to the queue; it is consumed exactly once.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::thread::JoinHandle;

use smol::channel::{self, Receiver, Sender};

use crate::Task;

const MAX_WORKERS: usize = 4;

/// Fixed pool of background threads draining a shared job queue.
pub struct WorkerPool {
    tx: Sender<Task>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(threads: usize) -> Self {
        let (tx, rx) = channel::unbounded::<Task>();
        let workers = (0..threads.max(1))
            .map(|index| spawn_worker(index, rx.clone()))
            .collect();
        Self {
            tx,
            workers: Mutex::new(workers),
        }
    }

    pub fn with_default_size() -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(2);
        Self::new(threads.min(MAX_WORKERS))
    }

    /// Queue a task to run on some pool thread.
    pub fn push(&self, task: Task) {
        if self.tx.try_send(task).is_err() {
            tracing::error!("worker pool is shut down; dropping task");
        }
    }

    /// Close the queue and wait for the workers to drain it. Idempotent.
    pub fn shutdown(&self) {
        self.tx.close();
        let mut workers = self.workers.lock().unwrap();
        for worker in workers.drain(..) {
            let _ = worker.join();
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn spawn_worker(index: usize, rx: Receiver<Task>) -> JoinHandle<()> {
    std::thread::Builder::new()
        .name(format!("graft-worker-{index}"))
        .spawn(move || {
            while let Ok(task) = rx.recv_blocking() {
                if catch_unwind(AssertUnwindSafe(|| task())).is_err() {
                    tracing::error!("background task panicked");
                }
            }
        })
        .expect("failed to spawn worker thread")
}
