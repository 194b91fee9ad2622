//! Parallel fan-out of a migration run across isolated workers.

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver};

use tenancy_common::{TenancyError, TenancyResult};
use tracing::{error, info, warn};

use crate::chunk::{TenantChunk, partition};
use crate::runner::{FailurePolicy, MigrationRunner};
use crate::task::{ChunkQueue, ChunkTask};
use crate::tenant::Tenant;
use crate::worker::{ChunkHandler, WorkerExit, WorkerPool};

/// Starts one worker per chunk and waits for its exit.
///
/// Workers share no mutable state with the dispatcher: the chunk goes in,
/// one [`WorkerExit`] comes out.
pub trait ChunkRunner {
    type Handle;

    fn spawn(&self, chunk: TenantChunk) -> TenancyResult<Self::Handle>;

    fn wait(&self, handle: Self::Handle) -> WorkerExit;
}

/// Runs chunks on a fixed pool of in-process worker threads.
pub struct ThreadChunkRunner {
    pool: WorkerPool,
}

impl ThreadChunkRunner {
    pub fn new(workers: usize, handler: Arc<ChunkHandler>) -> TenancyResult<Self> {
        let pool = WorkerPool::new(workers, Arc::new(ChunkQueue::new()), handler)?;
        Ok(Self { pool })
    }

    /// Each chunk is migrated under `policy` by a runner freshly built with
    /// `make_runner`, so workers never share a context or an engine.
    pub fn for_runner<F>(
        workers: usize,
        make_runner: F,
        policy: FailurePolicy,
    ) -> TenancyResult<Self>
    where
        F: Fn() -> MigrationRunner + Send + Sync + 'static,
    {
        let handler: Arc<ChunkHandler> = Arc::new(move |chunk: &TenantChunk| {
            let runner = make_runner();
            match runner.run(&chunk.tenants, policy) {
                Ok(result) => result.is_success(),
                Err(aborted) => {
                    error!(chunk = chunk.index, "{aborted}");
                    false
                }
            }
        });
        Self::new(workers, handler)
    }

    pub fn num_workers(&self) -> usize {
        self.pool.num_workers()
    }
}

impl ChunkRunner for ThreadChunkRunner {
    type Handle = Receiver<WorkerExit>;

    fn spawn(&self, chunk: TenantChunk) -> TenancyResult<Self::Handle> {
        let (reply, rx) = mpsc::channel();
        self.pool
            .queue()
            .push(ChunkTask { chunk, reply })
            .map_err(|task| {
                TenancyError::Worker(format!("worker pool closed before chunk {}", task.chunk.index))
            })?;
        Ok(rx)
    }

    fn wait(&self, handle: Self::Handle) -> WorkerExit {
        handle
            .recv()
            .unwrap_or_else(|_| WorkerExit::Abnormal("worker exited without reporting".into()))
    }
}

/// Exit of one chunk's worker.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkReport {
    pub index: usize,
    pub tenants: usize,
    pub exit: WorkerExit,
}

/// Reduced outcome of a parallel run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParallelReport {
    pub chunks: Vec<ChunkReport>,
}

impl ParallelReport {
    /// AND of every worker's success. No workers means nothing failed.
    pub fn is_success(&self) -> bool {
        self.chunks.iter().all(|c| c.exit.is_success())
    }

    pub fn failed_chunks(&self) -> impl Iterator<Item = &ChunkReport> {
        self.chunks.iter().filter(|c| !c.exit.is_success())
    }

    /// Tenants handed to a worker, across all chunks.
    pub fn tenants(&self) -> usize {
        self.chunks.iter().map(|c| c.tenants).sum()
    }

    /// Tenants whose chunk did not complete successfully. Individual
    /// outcomes stay in the worker's own log.
    pub fn tenants_in_failed_chunks(&self) -> usize {
        self.failed_chunks().map(|c| c.tenants).sum()
    }
}

/// Partitions tenants into chunks and fans them out over a [`ChunkRunner`].
pub struct ParallelDispatcher<R> {
    runner: R,
}

impl<R: ChunkRunner> ParallelDispatcher<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    /// Run `tenants` across `workers` chunks and wait for all of them.
    ///
    /// A chunk that cannot be spawned or whose worker terminates abnormally
    /// counts as failed; siblings keep running.
    pub fn run_parallel(&self, tenants: &[Tenant], workers: usize) -> ParallelReport {
        let chunks: Vec<TenantChunk> = partition(tenants, workers)
            .into_iter()
            .filter(|c| !c.is_empty())
            .collect();
        info!(tenants = tenants.len(), workers = chunks.len(), "dispatching chunks");

        let mut pending = Vec::with_capacity(chunks.len());
        let mut report = ParallelReport::default();
        for chunk in chunks {
            let (index, size) = (chunk.index, chunk.len());
            match self.runner.spawn(chunk) {
                Ok(handle) => pending.push((index, size, handle)),
                Err(e) => {
                    error!(chunk = index, "cannot start worker: {e}");
                    report.chunks.push(ChunkReport {
                        index,
                        tenants: size,
                        exit: WorkerExit::Abnormal(e.to_string()),
                    });
                }
            }
        }

        for (index, size, handle) in pending {
            let exit = self.runner.wait(handle);
            match &exit {
                WorkerExit::Completed { success: true } => {}
                WorkerExit::Completed { success: false } => {
                    warn!(chunk = index, "worker reported failed tenants");
                }
                WorkerExit::Abnormal(reason) => {
                    error!(chunk = index, "worker terminated abnormally: {reason}");
                }
            }
            report.chunks.push(ChunkReport {
                index,
                tenants: size,
                exit,
            });
        }
        report.chunks.sort_by_key(|c| c.index);

        let (total, failed) = (report.tenants(), report.tenants_in_failed_chunks());
        info!(
            "{total} tenant(s) processed by {} worker(s): {} in succeeded chunks, {failed} in failed chunks",
            report.chunks.len(),
            total - failed
        );
        report
    }
}
