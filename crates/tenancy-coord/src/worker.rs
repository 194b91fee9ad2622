//! Worker pool: threads that pull chunks from the queue and run them.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use tenancy_common::{TenancyError, TenancyResult};
use tracing::{debug, error};

use crate::chunk::TenantChunk;
use crate::task::ChunkQueue;

/// How a worker finished its chunk.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    /// The chunk ran to completion and reported its overall success.
    Completed { success: bool },
    /// The worker died or never reported a result.
    Abnormal(String),
}

impl WorkerExit {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed { success: true })
    }
}

/// Work run for each chunk. Returns whether every tenant in it succeeded.
pub type ChunkHandler = dyn Fn(&TenantChunk) -> bool + Send + Sync + 'static;

/// Fixed pool of worker threads pulling from a shared `ChunkQueue`.
///
/// A handler panic is caught and reported as [`WorkerExit::Abnormal`]; the
/// worker thread keeps serving the queue.
pub struct WorkerPool {
    workers: Vec<JoinHandle<()>>,
    queue: Arc<ChunkQueue>,
}

impl WorkerPool {
    pub fn new(
        num_workers: usize,
        queue: Arc<ChunkQueue>,
        handler: Arc<ChunkHandler>,
    ) -> TenancyResult<Self> {
        let mut pool = Self {
            workers: Vec::with_capacity(num_workers),
            queue,
        };

        for worker_id in 0..num_workers.max(1) {
            let q = Arc::clone(&pool.queue);
            let h = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(format!("tenancy-worker-{worker_id}"))
                .spawn(move || Self::worker_loop(worker_id, &q, &*h))
                .map_err(|e| TenancyError::Worker(format!("cannot spawn worker thread: {e}")))?;
            pool.workers.push(handle);
        }

        Ok(pool)
    }

    fn worker_loop(worker_id: usize, queue: &ChunkQueue, handler: &ChunkHandler) {
        while let Some(task) = queue.pop_blocking() {
            let index = task.chunk.index;
            debug!(worker_id, chunk = index, tenants = task.chunk.len(), "chunk started");

            let exit = match panic::catch_unwind(AssertUnwindSafe(|| handler(&task.chunk))) {
                Ok(success) => WorkerExit::Completed { success },
                Err(payload) => {
                    let msg = panic_message(payload.as_ref());
                    error!(worker_id, chunk = index, "worker panicked: {msg}");
                    WorkerExit::Abnormal(format!("worker panicked: {msg}"))
                }
            };
            // The dispatcher may have stopped listening; nothing left to report to.
            let _ = task.reply.send(exit);
        }
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }

    pub fn queue(&self) -> &Arc<ChunkQueue> {
        &self.queue
    }

    /// Close the queue, let workers drain it, and join them.
    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.queue.close();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
