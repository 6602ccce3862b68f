use crate::error::JobError;

use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot, OwnedSemaphorePermit};
use tokio_util::sync::CancellationToken;

/// The type of future a worker executes for a single task.
/// It must be `Send` and `'static`, and resolve to `Ok(())` or the task's error.
pub type TaskToExecute<E> = Pin<Box<dyn Future<Output = Result<(), E>> + Send + 'static>>;

/// Internal representation of a job sitting in the admission queue.
pub(crate) struct ManagedJobInternal<E: Send + 'static> {
  pub(crate) job_id: u64,
  pub(crate) tasks_rx: mpsc::Receiver<TaskToExecute<E>>,
  pub(crate) completed: CancellationToken,
  pub(crate) result_sender: oneshot::Sender<Result<(), JobError<E>>>,
}

/// A task on its way from the scheduler to a worker.
///
/// `_slot` is a worker slot taken from the pool's semaphore; it is released
/// when the worker has finished with the task.
pub(crate) struct DispatchedTask<E: Send + 'static> {
  pub(crate) job_id: u64,
  pub(crate) future: TaskToExecute<E>,
  pub(crate) _slot: OwnedSemaphorePermit,
}
