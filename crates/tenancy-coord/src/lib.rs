//! tenancy-coord: pending pool replenishment and tenant migration orchestration.
//!
//! The core talks to the outside world only through ports: a
//! [`TenantDirectory`] for tenant existence and pending status, a
//! [`TenantContext`] that switches the active data store, and a
//! [`MigrationEngine`] that migrates whatever store is active. Parallel runs
//! fan chunks out over a [`ChunkRunner`].

mod chunk;
mod context;
mod dispatch;
mod engine;
mod events;
mod replenish;
mod runner;
mod task;
mod tenant;
mod worker;

pub use chunk::{TenantChunk, partition, split_contiguous};
pub use context::{InMemoryContext, ScopedSlot, SlotGuard, TenantContext};
pub use dispatch::{ChunkReport, ChunkRunner, ParallelDispatcher, ParallelReport, ThreadChunkRunner};
pub use engine::{EngineExit, MigrationEngine};
pub use events::{MigrationObserver, TracingObserver};
pub use replenish::PoolReplenisher;
pub use runner::{FailurePolicy, MigrationOutcome, MigrationRunner, RunAborted, RunResult};
pub use task::{ChunkQueue, ChunkTask};
pub use tenant::{InMemoryDirectory, Tenant, TenantDirectory, TenantFilter};
pub use worker::{ChunkHandler, WorkerExit, WorkerPool};
