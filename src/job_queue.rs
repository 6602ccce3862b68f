use crate::error::PoolError;
use crate::task::ManagedJobInternal;

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Bounded FIFO admission queue between `submit` and the scheduler.
///
/// The producer keeps its sender behind a lock so the queue can be closed
/// explicitly while submitters still hold the pool. A submitter that already
/// cloned the sender before `close` may still land its job; the scheduler
/// rejects such jobs once it sees the shutdown flag.
pub(crate) fn job_queue<E: Send + 'static>(capacity: usize) -> (JobQueueProducer<E>, JobQueueConsumer<E>) {
  let capacity = capacity.max(1);
  let (tx, rx) = mpsc::channel(capacity);
  let queued = Arc::new(AtomicUsize::new(0));
  (
    JobQueueProducer {
      tx: Mutex::new(Some(tx)),
      capacity,
      queued: queued.clone(),
    },
    JobQueueConsumer { rx, queued },
  )
}

pub(crate) struct JobQueueProducer<E: Send + 'static> {
  tx: Mutex<Option<mpsc::Sender<ManagedJobInternal<E>>>>,
  capacity: usize,
  // Counted at the queue itself so `len` survives `close`.
  queued: Arc<AtomicUsize>,
}

/// Only the scheduler owns this half.
pub(crate) struct JobQueueConsumer<E: Send + 'static> {
  rx: mpsc::Receiver<ManagedJobInternal<E>>,
  queued: Arc<AtomicUsize>,
}

impl<E: Send + 'static> fmt::Debug for JobQueueProducer<E> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobQueueProducer")
      .field("len", &self.len())
      .field("capacity", &self.capacity)
      .field("closed", &self.is_closed())
      .finish()
  }
}

impl<E: Send + 'static> JobQueueProducer<E> {
  /// Enqueues a job, waiting while the queue is full.
  pub(crate) async fn send(&self, job: ManagedJobInternal<E>) -> Result<(), PoolError> {
    // Clone out of the lock; the guard must not be held across the await.
    let tx = self.tx.lock().clone().ok_or(PoolError::PoolShuttingDown)?;
    let permit = tx.reserve().await.map_err(|_| PoolError::PoolShuttingDown)?;
    // Counted before the job becomes visible to the consumer.
    self.queued.fetch_add(1, Ordering::SeqCst);
    permit.send(job);
    Ok(())
  }

  /// Drops the queue's sender. Returns `true` if this call closed it.
  pub(crate) fn close(&self) -> bool {
    self.tx.lock().take().is_some()
  }

  pub(crate) fn is_closed(&self) -> bool {
    self.tx.lock().is_none()
  }

  /// Number of jobs admitted but not yet taken by the scheduler, including
  /// jobs still waiting in the queue after it was closed.
  pub(crate) fn len(&self) -> usize {
    self.queued.load(Ordering::SeqCst)
  }
}

impl<E: Send + 'static> JobQueueConsumer<E> {
  /// Returns `None` once the queue is closed and empty.
  pub(crate) async fn recv(&mut self) -> Option<ManagedJobInternal<E>> {
    let job = self.rx.recv().await?;
    self.queued.fetch_sub(1, Ordering::SeqCst);
    Some(job)
  }
}
