use crate::error::{JobError, PoolError};
use crate::task::TaskToExecute;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{self, debug, error, trace, warn};

/// A handle to a job submitted to a `WorkerPool`.
///
/// Push tasks with [`push`](Self::push), close the intake with
/// [`finalize`](Self::finalize), then [`wait`](Self::wait) for the outcome.
/// Dropping the handle finalizes the job, though its outcome is then lost.
pub struct JobHandle<E: Send + 'static> {
  pub(crate) job_id: u64,
  pub(crate) pool_name: Arc<String>,
  pub(crate) tasks_tx: Option<mpsc::Sender<TaskToExecute<E>>>,
  pub(crate) completed: CancellationToken,
  pub(crate) result_receiver: oneshot::Receiver<Result<(), JobError<E>>>,
  pub(crate) tokio_handle: TokioHandle,
}

impl<E: Send + 'static> fmt::Debug for JobHandle<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobHandle")
      .field("job_id", &self.job_id)
      .field("pool_name", &self.pool_name)
      .field("finalized", &self.is_finalized())
      .field("completed", &self.is_completed())
      .finish_non_exhaustive()
  }
}

impl<E: Send + 'static> JobHandle<E> {
  /// Returns the unique ID of this job.
  pub fn id(&self) -> u64 {
    self.job_id
  }

  pub fn is_finalized(&self) -> bool {
    self.tasks_tx.is_none()
  }

  /// Checks whether every dispatched task of this job has finished, or the job
  /// was rejected at shutdown without running.
  pub fn is_completed(&self) -> bool {
    self.completed.is_cancelled()
  }

  /// Waits for the job's completion signal without taking its outcome.
  pub async fn completed(&self) {
    self.completed.cancelled().await
  }

  /// Adds a task to the job, waiting while the job's backlog is full.
  ///
  /// # Errors
  /// Returns `PoolError::JobFinalized` if the job was already finalized.
  /// Returns `PoolError::PoolShuttingDown` if the job's intake was closed by the
  /// pool, which happens when a queued job is rejected during shutdown.
  pub async fn push<F>(&self, task: F) -> Result<(), PoolError>
  where
    F: Future<Output = Result<(), E>> + Send + 'static,
  {
    let tasks_tx = self.tasks_tx.as_ref().ok_or(PoolError::JobFinalized)?;
    let future: TaskToExecute<E> = Box::pin(task);
    match tasks_tx.send(future).await {
      Ok(()) => {
        trace!(pool_name = %*self.pool_name, job_id = %self.job_id, "Task pushed to job.");
        Ok(())
      }
      Err(_) => {
        warn!(pool_name = %*self.pool_name, job_id = %self.job_id, "Push: Job intake closed by the pool.");
        Err(PoolError::PoolShuttingDown)
      }
    }
  }

  /// Adds a synchronous task. It runs inline on the worker that picks it up.
  pub async fn push_fn<F>(&self, task: F) -> Result<(), PoolError>
  where
    F: FnOnce() -> Result<(), E> + Send + 'static,
  {
    self.push(async move { task() }).await
  }

  /// Signals that no more tasks will be pushed.
  pub fn finalize(&mut self) {
    if self.tasks_tx.take().is_some() {
      debug!(pool_name = %*self.pool_name, job_id = %self.job_id, "Job finalized.");
    }
  }

  /// Finalizes the job and runs `on_complete` on the pool's runtime once its
  /// completion signal fires. That includes jobs rejected at shutdown. The
  /// callback is for instrumentation; the outcome is still read through
  /// [`wait`](Self::wait).
  pub fn finalize_with<F>(&mut self, on_complete: F)
  where
    F: FnOnce() + Send + 'static,
  {
    self.finalize();

    let completed = self.completed.clone();
    let pool_name = self.pool_name.clone();
    let job_id = self.job_id;
    self.tokio_handle.spawn(async move {
      completed.cancelled().await;
      let result = std::panic::catch_unwind(AssertUnwindSafe(on_complete));
      if result.is_err() {
        error!(
          "A job completion callback panicked during execution. Pool: {}, Job ID: {}",
          pool_name, job_id
        );
      }
    });
  }

  /// Awaits the job's outcome: `Ok(())` if every task that ran succeeded,
  /// otherwise the first error observed. Finalizes the job if needed.
  ///
  /// # Errors
  /// Returns `JobError::TaskFailed` or `JobError::TaskPanicked` for the first failing task.
  /// Returns `JobError::Pool(PoolError::PoolShuttingDown)` if the job was rejected at shutdown.
  /// Returns `JobError::Pool(PoolError::ResultChannelError)` if the pool went away without resolving the job.
  pub async fn wait(mut self) -> Result<(), JobError<E>> {
    self.finalize();
    match self.result_receiver.await {
      Ok(outcome) => outcome,
      Err(recv_error) => {
        tracing::warn!(job_id = %self.job_id, "Result channel receive error: {}", recv_error);
        Err(JobError::Pool(PoolError::ResultChannelError(format!(
          "Job (id: {}) result channel unexpectedly closed: {}",
          self.job_id, recv_error
        ))))
      }
    }
  }
}
