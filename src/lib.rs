//! A Tokio-based bounded worker pool that runs jobs made of sub-tasks, with
//! first-error-wins aggregation per job and cooperative two-phase shutdown.
//!
//! Jobs are admitted in FIFO order and drained one at a time; the tasks of the
//! job being drained run on a fixed set of persistent workers.

mod error;
mod handle;
mod in_flight;
mod job_queue;
mod manager;
mod scheduler;
mod state;
mod task;
mod worker;

pub use error::{JobError, PoolError};
pub use handle::JobHandle;
pub use manager::WorkerPool;
pub use task::TaskToExecute;
