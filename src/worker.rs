use crate::error::JobError;
use crate::in_flight::InFlightTasks;
use crate::state::SharedState;
use crate::task::DispatchedTask;

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::{mpsc, Mutex as AsyncMutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, Instrument};

/// Everything a worker needs. Each worker gets its own clone.
pub(crate) struct WorkerContext<E: Send + 'static> {
  pub(crate) pool_name: Arc<String>,
  pub(crate) state: Arc<SharedState<E>>,
  pub(crate) in_flight: Arc<InFlightTasks>,
  pub(crate) dispatch_rx: Arc<AsyncMutex<mpsc::Receiver<DispatchedTask<E>>>>,
  pub(crate) stop_token: CancellationToken,
  /// Incremented by the pool for each spawned worker, decremented on loop exit.
  pub(crate) live_workers: Arc<AtomicUsize>,
}

impl<E: Send + 'static> Clone for WorkerContext<E> {
  fn clone(&self) -> Self {
    Self {
      pool_name: self.pool_name.clone(),
      state: self.state.clone(),
      in_flight: self.in_flight.clone(),
      dispatch_rx: self.dispatch_rx.clone(),
      stop_token: self.stop_token.clone(),
      live_workers: self.live_workers.clone(),
    }
  }
}

pub(crate) async fn run_worker_loop<E: Send + 'static>(worker_id: usize, ctx: WorkerContext<E>) {
  info!(pool_name = %*ctx.pool_name, %worker_id, "Worker started.");

  loop {
    let next = tokio::select! {
      biased;

      _ = ctx.stop_token.cancelled() => {
        info!(pool_name = %*ctx.pool_name, %worker_id, "Stop signal received. Worker terminating.");
        break;
      }

      // Workers take turns holding the receiver; only the holder waits on the channel.
      next = async { ctx.dispatch_rx.lock().await.recv().await } => next,
    };

    match next {
      Some(dispatched) => {
        let job_id = dispatched.job_id;
        execute_task(&ctx, worker_id, dispatched)
          .instrument(info_span!(
            "job_task",
            pool_name = %*ctx.pool_name,
            %job_id,
            %worker_id
          ))
          .await;
      }
      None => {
        info!(pool_name = %*ctx.pool_name, %worker_id, "Dispatch channel closed and empty. Worker terminating.");
        break;
      }
    }
  }

  ctx.live_workers.fetch_sub(1, Ordering::SeqCst);
  info!(pool_name = %*ctx.pool_name, %worker_id, "Worker stopped.");
}

async fn execute_task<E: Send + 'static>(ctx: &WorkerContext<E>, worker_id: usize, dispatched: DispatchedTask<E>) {
  let DispatchedTask {
    job_id,
    future,
    _slot: slot,
  } = dispatched;

  if ctx.state.has_error() {
    // A sibling already failed; the job's outcome is settled.
    trace!(pool_name = %*ctx.pool_name, %job_id, %worker_id, "Skipping task, job already has an error.");
  } else {
    match AssertUnwindSafe(future).catch_unwind().await {
      Ok(Ok(())) => {
        trace!(pool_name = %*ctx.pool_name, %job_id, %worker_id, "Task executed successfully.");
      }
      Ok(Err(task_error)) => {
        if ctx.state.record_if_absent(JobError::TaskFailed(task_error)) {
          debug!(pool_name = %*ctx.pool_name, %job_id, %worker_id, "Task failed. Recorded as the job's outcome.");
        } else {
          trace!(pool_name = %*ctx.pool_name, %job_id, %worker_id, "Task failed after an earlier failure. Error discarded.");
        }
      }
      Err(_panic_payload) => {
        error!(pool_name = %*ctx.pool_name, %job_id, %worker_id, "Task panicked during execution.");
        ctx.state.record_if_absent(JobError::TaskPanicked);
      }
    }
  }

  // Slot first, then the in-flight count.
  drop(slot);
  ctx.in_flight.done();
}
