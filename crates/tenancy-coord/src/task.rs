//! Chunk queue: FIFO work items for the worker pool.

use std::collections::VecDeque;
use std::sync::mpsc::Sender;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use crate::chunk::TenantChunk;
use crate::worker::WorkerExit;

/// A chunk submitted to the pool together with the channel its exit is
/// reported on.
pub struct ChunkTask {
    pub chunk: TenantChunk,
    pub reply: Sender<WorkerExit>,
}

struct State {
    tasks: VecDeque<ChunkTask>,
    closed: bool,
}

/// Thread-safe FIFO queue. Once closed, blocked consumers drain the remaining
/// tasks and then receive `None`.
pub struct ChunkQueue {
    state: Mutex<State>,
    condvar: Condvar,
}

impl ChunkQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                tasks: VecDeque::new(),
                closed: false,
            }),
            condvar: Condvar::new(),
        }
    }

    /// Submit a task. Returns it back if the queue is closed.
    pub fn push(&self, task: ChunkTask) -> Result<(), ChunkTask> {
        let mut state = self.lock();
        if state.closed {
            return Err(task);
        }
        state.tasks.push_back(task);
        self.condvar.notify_one();
        Ok(())
    }

    /// Block until a task is available or the queue is closed and empty.
    pub fn pop_blocking(&self) -> Option<ChunkTask> {
        let mut state = self.lock();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return Some(task);
            }
            if state.closed {
                return None;
            }
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Reject further pushes and wake all waiting workers.
    pub fn close(&self) {
        self.lock().closed = true;
        self.condvar.notify_all();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ChunkQueue {
    fn default() -> Self {
        Self::new()
    }
}
