use futures_workers::{JobHandle, WorkerPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

async fn work_task_fn(job: usize, task: usize, duration_ms: u64) -> Result<(), String> {
  info!("Job {} task {} starting (will run for {}ms)", job, task, duration_ms);
  tokio::time::sleep(Duration::from_millis(duration_ms)).await;
  info!("Job {} task {} finished", job, task);
  Ok(())
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Graceful Shutdown Example ---");

  let pool = WorkerPool::<String>::new(2, 8, Handle::current(), "graceful_shutdown_pool");

  // Job 0 is picked up right away; jobs 1..4 wait in the admission queue.
  let mut handles: Vec<JobHandle<String>> = Vec::new();
  for job_index in 0..4 {
    let mut job = pool.submit(3).await.expect("Pool should be accepting jobs");
    for task_index in 0..3 {
      job
        .push(work_task_fn(job_index, task_index, 1000))
        .await
        .expect("Backlog is sized to the job, push should not fail");
    }
    job.finalize();
    handles.push(job);
  }

  tokio::time::sleep(Duration::from_millis(100)).await;
  info!(
    "Queued jobs: {}, in-flight tasks: {}",
    pool.queued_job_count(),
    pool.in_flight_task_count()
  );

  let pool_for_shutdown = pool.clone();
  let shutdown_jh = tokio::spawn(async move {
    info!("Calling pool.shutdown()...");
    pool_for_shutdown.shutdown().await.expect("Shutdown failed");
    info!("pool.shutdown() completed.");
  });

  for (job_index, job) in handles.into_iter().enumerate() {
    match job.wait().await {
      Ok(()) => info!("Job {} completed.", job_index),
      Err(e) if e.is_shutting_down() => info!("Job {} rejected: {}", job_index, e),
      Err(e) => tracing::error!("Job {} failed: {}", job_index, e),
    }
  }

  shutdown_jh.await.expect("Shutdown task panicked");
  assert!(pool.submit(1).await.is_err(), "Pool must reject jobs after shutdown");
  info!("--- Graceful Shutdown Example End ---");
}
