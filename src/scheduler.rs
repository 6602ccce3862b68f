use crate::error::{JobError, PoolError};
use crate::in_flight::InFlightTasks;
use crate::job_queue::JobQueueConsumer;
use crate::state::SharedState;
use crate::task::{DispatchedTask, ManagedJobInternal};

use std::sync::Arc;

use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

pub(crate) struct SchedulerContext<E: Send + 'static> {
  pub(crate) pool_name: Arc<String>,
  pub(crate) state: Arc<SharedState<E>>,
  pub(crate) in_flight: Arc<InFlightTasks>,
  /// One permit per worker; a task is only handed over while a worker is free.
  pub(crate) worker_slots: Arc<Semaphore>,
  pub(crate) dispatch_tx: mpsc::Sender<DispatchedTask<E>>,
  pub(crate) ack_shutdown: CancellationToken,
}

/// Admits jobs one at a time, in queue order, until the queue is closed and empty.
pub(crate) async fn run_scheduler_loop<E: Send + 'static>(ctx: SchedulerContext<E>, mut queue: JobQueueConsumer<E>) {
  info!(pool_name = %*ctx.pool_name, "Scheduler loop started.");

  while let Some(job) = queue.recv().await {
    if ctx.state.is_shutting_down() {
      debug!(pool_name = %*ctx.pool_name, job_id = %job.job_id, "Pool is shutting down. Rejecting queued job.");
      // Nothing of this job runs, so it is complete as soon as it is rejected.
      // Dropping the job closes its task intake as well.
      job.completed.cancel();
      let _ = job.result_sender.send(Err(JobError::Pool(PoolError::PoolShuttingDown)));
      continue;
    }
    drain_job(&ctx, job).await;
  }

  if ctx.state.trigger_shutdown_ack() {
    info!(pool_name = %*ctx.pool_name, "Admission queue closed and empty. Acknowledging shutdown.");
    ctx.ack_shutdown.cancel();
  }

  info!(pool_name = %*ctx.pool_name, "Scheduler loop stopped.");
}

async fn drain_job<E: Send + 'static>(ctx: &SchedulerContext<E>, job: ManagedJobInternal<E>) {
  let ManagedJobInternal {
    job_id,
    mut tasks_rx,
    completed,
    result_sender,
  } = job;

  debug!(pool_name = %*ctx.pool_name, %job_id, "Draining job.");
  let mut dispatched = 0usize;

  while let Some(future) = tasks_rx.recv().await {
    // Closed once dispatch has failed, so later jobs give up without retrying.
    let slot = match ctx.worker_slots.clone().acquire_owned().await {
      Ok(permit) => permit,
      Err(_) => {
        error!(pool_name = %*ctx.pool_name, %job_id, "Worker slots closed after a dispatch failure. Abandoning job dispatch.");
        ctx.state.record_if_absent(JobError::Pool(PoolError::DispatchChannelClosed));
        break;
      }
    };

    ctx.in_flight.add();
    let task = DispatchedTask {
      job_id,
      future,
      _slot: slot,
    };
    if ctx.dispatch_tx.send(task).await.is_err() {
      // The returned task (and its slot) is dropped with the error.
      ctx.in_flight.done();
      error!(pool_name = %*ctx.pool_name, %job_id, "Dispatch channel closed, no workers left. Abandoning job dispatch.");
      ctx.worker_slots.close();
      ctx.state.record_if_absent(JobError::Pool(PoolError::DispatchChannelClosed));
      break;
    }
    dispatched += 1;
    trace!(pool_name = %*ctx.pool_name, %job_id, dispatched, "Task dispatched to workers.");
  }

  ctx.in_flight.wait_idle().await;
  completed.cancel();

  let outcome = match ctx.state.take_error() {
    Some(job_error) => Err(job_error),
    None => Ok(()),
  };
  debug!(
    pool_name = %*ctx.pool_name,
    %job_id,
    dispatched,
    succeeded = outcome.is_ok(),
    "Job drained."
  );

  if result_sender.send(outcome).is_err() {
    warn!(pool_name = %*ctx.pool_name, %job_id, "Result receiver for job was dropped. Job outcome lost.");
  }
}
