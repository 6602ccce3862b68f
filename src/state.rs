use crate::error::JobError;

use parking_lot::Mutex;

/// Mutable state shared by the scheduler, the workers and the pool handle.
///
/// The lock is never handed out. Callers only get the operations below, each
/// of which takes and releases the lock internally.
pub(crate) struct SharedState<E> {
  inner: Mutex<StateInner<E>>,
}

struct StateInner<E> {
  // First error of the job currently being drained.
  current_error: Option<JobError<E>>,
  should_shutdown: bool,
  triggered_shutdown: bool,
}

impl<E> SharedState<E> {
  pub(crate) fn new() -> Self {
    Self {
      inner: Mutex::new(StateInner {
        current_error: None,
        should_shutdown: false,
        triggered_shutdown: false,
      }),
    }
  }

  /// Returns `true` if a task of the current job has already failed.
  pub(crate) fn has_error(&self) -> bool {
    self.inner.lock().current_error.is_some()
  }

  /// Stores `error` unless an earlier one is already held.
  /// Returns `true` if `error` became the job's outcome.
  pub(crate) fn record_if_absent(&self, error: JobError<E>) -> bool {
    let mut guard = self.inner.lock();
    if guard.current_error.is_some() {
      return false;
    }
    guard.current_error = Some(error);
    true
  }

  /// Takes the current job's error, leaving the slot empty for the next job.
  pub(crate) fn take_error(&self) -> Option<JobError<E>> {
    self.inner.lock().current_error.take()
  }

  /// Sets the shutdown flag. Returns `true` if this call was the one that set it.
  pub(crate) fn begin_shutdown(&self) -> bool {
    let mut guard = self.inner.lock();
    let first = !guard.should_shutdown;
    guard.should_shutdown = true;
    first
  }

  pub(crate) fn is_shutting_down(&self) -> bool {
    self.inner.lock().should_shutdown
  }

  /// Returns `true` exactly once, and only after shutdown has begun.
  pub(crate) fn trigger_shutdown_ack(&self) -> bool {
    let mut guard = self.inner.lock();
    if guard.should_shutdown && !guard.triggered_shutdown {
      guard.triggered_shutdown = true;
      return true;
    }
    false
  }
}
