use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Notify;

/// Counts tasks that were dispatched to workers and have not finished yet.
///
/// The scheduler calls `add` before handing a task over and `wait_idle` once
/// the job's intake is closed; workers call `done` after each task.
#[derive(Debug, Default)]
pub(crate) struct InFlightTasks {
  count: AtomicUsize,
  idle: Notify,
}

impl InFlightTasks {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn add(&self) {
    self.count.fetch_add(1, Ordering::SeqCst);
  }

  pub(crate) fn done(&self) {
    if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
      self.idle.notify_waiters();
    }
  }

  pub(crate) fn count(&self) -> usize {
    self.count.load(Ordering::SeqCst)
  }

  /// Resolves once the counter is zero.
  pub(crate) async fn wait_idle(&self) {
    loop {
      let notified = self.idle.notified();
      tokio::pin!(notified);
      // Register before reading the counter so a `done` in between is not missed.
      notified.as_mut().enable();
      if self.count.load(Ordering::SeqCst) == 0 {
        return;
      }
      notified.await;
    }
  }
}
