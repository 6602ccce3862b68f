use crate::error::PoolError;
use crate::handle::JobHandle;
use crate::in_flight::InFlightTasks;
use crate::job_queue::{job_queue, JobQueueProducer};
use crate::scheduler::{run_scheduler_loop, SchedulerContext};
use crate::state::SharedState;
use crate::task::ManagedJobInternal;
use crate::worker::{run_worker_loop, WorkerContext};

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::{mpsc, oneshot, Mutex as AsyncMutex, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

lazy_static::lazy_static! {
  static ref NEXT_POOL_JOB_ID_COUNTER: AtomicU64 = AtomicU64::new(0);
}

/// A fixed set of persistent workers that runs jobs one at a time, with up to
/// `worker_count` tasks of the current job in flight at once.
///
/// `E` is the error type returned by tasks. The first failure of a job becomes
/// that job's outcome; the pool keeps serving later jobs regardless.
pub struct WorkerPool<E: Send + 'static> {
  pool_name: Arc<String>,
  worker_count: usize,
  job_queue: JobQueueProducer<E>,
  state: Arc<SharedState<E>>,
  in_flight: Arc<InFlightTasks>,
  live_workers: Arc<AtomicUsize>,
  tokio_handle: TokioHandle,
  ack_shutdown: CancellationToken,
  stop_workers: CancellationToken,
  scheduler_join_handle: Mutex<Option<JoinHandle<()>>>,
  worker_join_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<E: Send + 'static> WorkerPool<E> {
  /// Spawns the scheduler and `worker_count` workers on `tokio_handle`.
  ///
  /// `max_jobs` bounds the admission queue; `submit` waits while it is full.
  /// Zero values are treated as 1.
  pub fn new(worker_count: usize, max_jobs: usize, tokio_handle: TokioHandle, pool_name: &str) -> Arc<Self> {
    let worker_count = worker_count.max(1);
    let pool_name = Arc::new(pool_name.to_string());
    let (job_queue_tx, job_queue_rx) = job_queue(max_jobs);
    let (dispatch_tx, dispatch_rx) = mpsc::channel(worker_count);

    let state = Arc::new(SharedState::new());
    let in_flight = Arc::new(InFlightTasks::new());
    let live_workers = Arc::new(AtomicUsize::new(0));
    let ack_shutdown = CancellationToken::new();
    let stop_workers = CancellationToken::new();

    let scheduler_ctx = SchedulerContext {
      pool_name: pool_name.clone(),
      state: state.clone(),
      in_flight: in_flight.clone(),
      worker_slots: Arc::new(Semaphore::new(worker_count)),
      dispatch_tx,
      ack_shutdown: ack_shutdown.clone(),
    };
    let scheduler_join_handle = tokio_handle.spawn(
      run_scheduler_loop(scheduler_ctx, job_queue_rx)
        .instrument(info_span!("job_scheduler_loop", name = %*pool_name)),
    );

    let worker_ctx = WorkerContext {
      pool_name: pool_name.clone(),
      state: state.clone(),
      in_flight: in_flight.clone(),
      dispatch_rx: Arc::new(AsyncMutex::new(dispatch_rx)),
      stop_token: stop_workers.clone(),
      live_workers: live_workers.clone(),
    };
    let worker_join_handles: Vec<JoinHandle<()>> = (0..worker_count)
      .map(|worker_id| {
        live_workers.fetch_add(1, AtomicOrdering::SeqCst);
        tokio_handle.spawn(
          run_worker_loop(worker_id, worker_ctx.clone())
            .instrument(info_span!("pool_worker_loop", name = %*pool_name, %worker_id)),
        )
      })
      .collect();

    info!(pool_name = %*pool_name, %worker_count, "Worker pool started.");

    Arc::new(Self {
      pool_name,
      worker_count,
      job_queue: job_queue_tx,
      state,
      in_flight,
      live_workers,
      tokio_handle,
      ack_shutdown,
      stop_workers,
      scheduler_join_handle: Mutex::new(Some(scheduler_join_handle)),
      worker_join_handles: Mutex::new(worker_join_handles),
    })
  }

  pub fn name(&self) -> &str {
    &self.pool_name
  }

  pub fn worker_count(&self) -> usize {
    self.worker_count
  }

  /// Returns the number of jobs admitted but not yet reached by the scheduler.
  pub fn queued_job_count(&self) -> usize {
    self.job_queue.len()
  }

  /// Returns the number of tasks handed to workers that have not finished.
  pub fn in_flight_task_count(&self) -> usize {
    self.in_flight.count()
  }

  /// Returns the number of workers whose loop has not exited yet. Drops to 0
  /// by the time `shutdown` returns.
  pub fn live_worker_count(&self) -> usize {
    self.live_workers.load(AtomicOrdering::SeqCst)
  }

  pub fn is_shutting_down(&self) -> bool {
    self.state.is_shutting_down()
  }

  /// Creates a job whose task intake buffers up to `task_backlog` tasks and
  /// admits it to the queue, waiting while the queue is full.
  ///
  /// Size `task_backlog` to the number of tasks you will push if `push` must
  /// never wait.
  ///
  /// # Errors
  /// Returns `PoolError::PoolShuttingDown` if shutdown has already begun. A job
  /// admitted while shutdown is starting is resolved with the same error by the
  /// scheduler instead of being run.
  pub async fn submit(&self, task_backlog: usize) -> Result<JobHandle<E>, PoolError> {
    if self.state.is_shutting_down() {
      warn!(pool_name = %self.pool_name, "Submit: Attempted to submit job to a pool that is shutting down.");
      return Err(PoolError::PoolShuttingDown);
    }

    let job_id = NEXT_POOL_JOB_ID_COUNTER.fetch_add(1, AtomicOrdering::Relaxed);
    let (tasks_tx, tasks_rx) = mpsc::channel(task_backlog.max(1));
    let (result_tx, result_rx) = oneshot::channel();
    let completed = CancellationToken::new();

    let managed_job_internal = ManagedJobInternal {
      job_id,
      tasks_rx,
      completed: completed.clone(),
      result_sender: result_tx,
    };

    debug!(pool_name = %self.pool_name, %job_id, %task_backlog, "Submitting job to queue.");

    if let Err(e) = self.job_queue.send(managed_job_internal).await {
      warn!(pool_name = %self.pool_name, %job_id, "Submit: Admission queue closed: {}", e);
      return Err(e);
    }

    Ok(JobHandle {
      job_id,
      pool_name: self.pool_name.clone(),
      tasks_tx: Some(tasks_tx),
      completed,
      result_receiver: result_rx,
      tokio_handle: self.tokio_handle.clone(),
    })
  }

  /// Stops the pool in two phases.
  ///
  /// First the admission queue is closed and the scheduler resolves every job
  /// still queued with `PoolShuttingDown`; a job already being drained runs to
  /// completion. Then every worker is told to stop and joined.
  ///
  /// Calling this again, or concurrently, waits for the same acknowledgment.
  pub async fn shutdown(&self) -> Result<(), PoolError> {
    let initiated_here = self.state.begin_shutdown();
    if initiated_here {
      info!(pool_name = %self.pool_name, "Initiating pool shutdown.");
    } else {
      info!(pool_name = %self.pool_name, "Shutdown already in progress or initiated by another call/Drop.");
    }

    if self.job_queue.close() {
      debug!(pool_name = %self.pool_name, "Admission queue closed.");
    }

    // Phase 1: scheduler drains or rejects everything queued.
    self.ack_shutdown.cancelled().await;
    info!(pool_name = %self.pool_name, "Scheduler acknowledged shutdown.");

    let scheduler_handle = self.scheduler_join_handle.lock().take();
    if let Some(handle) = scheduler_handle {
      if let Err(join_error) = handle.await {
        error!(pool_name = %self.pool_name, "Error joining scheduler loop during shutdown: {:?}", join_error);
      }
    }

    // Phase 2: stop and join every worker.
    self.stop_workers.cancel();
    let worker_handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.worker_join_handles.lock());
    if worker_handles.is_empty() {
      trace!(pool_name = %self.pool_name, "Worker join handles already taken by another shutdown call.");
    }
    for (worker_id, handle) in worker_handles.into_iter().enumerate() {
      match handle.await {
        Ok(()) => trace!(pool_name = %self.pool_name, %worker_id, "Worker joined."),
        Err(join_error) => {
          error!(pool_name = %self.pool_name, %worker_id, "Error joining worker during shutdown: {:?}", join_error);
        }
      }
    }

    if initiated_here {
      info!(pool_name = %self.pool_name, "Pool shutdown process completed by this call.");
    }
    Ok(())
  }
}

impl<E: Send + 'static> Drop for WorkerPool<E> {
  fn drop(&mut self) {
    if self.state.begin_shutdown() {
      info!(
        pool_name = %*self.pool_name,
        "WorkerPool dropped without shutdown. Closing admission queue; queued jobs will be rejected."
      );
      // Nothing is awaited here. The scheduler rejects what is queued and exits,
      // which closes the dispatch channel and lets the workers exit too.
      self.job_queue.close();
    } else {
      trace!(pool_name = %*self.pool_name, "Drop: Shutdown already in progress or completed.");
    }
  }
}
