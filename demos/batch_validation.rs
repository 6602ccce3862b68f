use futures_workers::{JobError, JobHandle, WorkerPool};
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::info;

#[derive(Debug)]
struct Transfer {
  id: u32,
  from: &'static str,
  to: &'static str,
  amount: i64,
}

async fn validate_transfer(transfer: Transfer) -> Result<(), String> {
  // Stand-in for a balance lookup or signature check.
  tokio::time::sleep(Duration::from_millis(100 + transfer.id as u64 * 20)).await;
  if transfer.amount <= 0 {
    return Err(format!("transfer {} has non-positive amount {}", transfer.id, transfer.amount));
  }
  if transfer.from == transfer.to {
    return Err(format!("transfer {} sends to itself", transfer.id));
  }
  info!("Transfer {} validated: {} -> {} ({})", transfer.id, transfer.from, transfer.to, transfer.amount);
  Ok(())
}

async fn submit_batch(pool: &WorkerPool<String>, batch: Vec<Transfer>) -> JobHandle<String> {
  let mut job = pool.submit(batch.len()).await.expect("Pool should be accepting jobs");
  for transfer in batch {
    job
      .push(validate_transfer(transfer))
      .await
      .expect("Backlog is sized to the batch, push should not fail");
  }
  let job_id = job.id();
  job.finalize_with(move || info!("Job {} completed (all dispatched tasks finished)", job_id));
  job
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();

  info!("--- Batch Validation Example ---");

  let pool = WorkerPool::<String>::new(
    3, // Workers
    4, // Max queued jobs
    Handle::current(),
    "batch_validation_pool",
  );

  let valid_batch = vec![
    Transfer { id: 1, from: "alice", to: "bob", amount: 10 },
    Transfer { id: 2, from: "bob", to: "carol", amount: 5 },
    Transfer { id: 3, from: "carol", to: "alice", amount: 7 },
  ];
  let broken_batch = vec![
    Transfer { id: 4, from: "alice", to: "dave", amount: 3 },
    Transfer { id: 5, from: "dave", to: "dave", amount: 1 },
    Transfer { id: 6, from: "erin", to: "bob", amount: -2 },
    Transfer { id: 7, from: "bob", to: "erin", amount: 4 },
  ];

  let valid_job = submit_batch(&pool, valid_batch).await;
  let broken_job = submit_batch(&pool, broken_batch).await;

  for (name, job) in [("valid", valid_job), ("broken", broken_job)] {
    match job.wait().await {
      Ok(()) => info!("Batch '{}' passed validation.", name),
      Err(JobError::TaskFailed(reason)) => info!("Batch '{}' rejected: {}", name, reason),
      Err(e) => tracing::error!("Batch '{}' could not be validated: {}", name, e),
    }
  }

  pool.shutdown().await.expect("Pool shutdown failed");
  info!("--- Batch Validation Example End ---");
}
