use thiserror::Error;

/// Errors raised by the pool itself, independent of what a task returns.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PoolError {
  #[error("Pool is shutting down or already shut down, cannot accept new jobs")]
  PoolShuttingDown,

  #[error("Job was already finalized, no more tasks can be pushed")]
  JobFinalized,

  #[error("Job result channel error (scheduler dropped the job before resolving it): {0}")]
  ResultChannelError(String),

  #[error("Pool's internal dispatch channel was closed unexpectedly")]
  DispatchChannelClosed,
}

/// Outcome of a job that did not succeed.
///
/// `E` is the error type returned by the job's tasks. Only the first failure
/// observed within a job is kept; later failures of the same job are dropped.
#[derive(Error, Debug, PartialEq)]
pub enum JobError<E> {
  #[error(transparent)]
  Pool(#[from] PoolError),

  #[error("Task failed: {0}")]
  TaskFailed(E),

  #[error("Task panicked during execution")]
  TaskPanicked,
}

impl<E> JobError<E> {
  /// Returns `true` if the job was rejected because the pool is shutting down.
  pub fn is_shutting_down(&self) -> bool {
    matches!(self, JobError::Pool(PoolError::PoolShuttingDown))
  }

  /// Returns the task's own error, if that is what resolved the job.
  pub fn task_error(&self) -> Option<&E> {
    match self {
      JobError::TaskFailed(e) => Some(e),
      _ => None,
    }
  }

  pub fn into_task_error(self) -> Option<E> {
    match self {
      JobError::TaskFailed(e) => Some(e),
      _ => None,
    }
  }
}
