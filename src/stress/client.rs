use std::time::Duration;

use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::time::sleep;
use tracing::{info, warn};

use crate::net::ConnectStream;

use super::error::StressError;
use super::session::{MAX_DATA_LEN, TransferPlan, TransferResult, run_duplex};

/// Knobs for one load-generation run. Threaded explicitly instead of
/// process-wide globals so workers can run concurrently without shared
/// mutable state.
#[derive(Debug, Clone)]
pub struct LoadConfig {
    /// Total number of connections across all workers.
    pub connections: u32,
    /// Number of workers running their batches in parallel.
    pub parallel: u32,
    /// Smallest random payload per connection (clamped to at least 1).
    pub min_len: u64,
    /// Largest random payload per connection.
    pub max_len: u64,
    /// Chunk size per send/receive call, 0 for the default.
    pub chunk_len: usize,
    /// Pause between a worker's sequential connections.
    pub sleep: Duration,
}

impl Default for LoadConfig {
    fn default() -> Self {
        Self {
            connections: 100,
            parallel: 1,
            min_len: 1,
            max_len: MAX_DATA_LEN,
            chunk_len: 0,
            sleep: Duration::ZERO,
        }
    }
}

/// Per-worker results, in connection order. `failed` is set when any
/// connection in the batch failed (the batch stops at the first one).
#[derive(Debug)]
pub struct WorkerReport {
    pub worker: u32,
    pub results: Vec<TransferResult>,
    pub failed: bool,
}

/// The overall run fails if any worker's batch failed.
pub fn overall_failed(reports: &[WorkerReport]) -> bool {
    reports.iter().any(|r| r.failed)
}

/// Opens `connections` duplex sessions against `target`, partitioned
/// into `parallel` batches of roughly equal size.
pub struct LoadGenerator {
    target: String,
    config: LoadConfig,
}

impl LoadGenerator {
    pub fn new(target: impl Into<String>, config: LoadConfig) -> Self {
        Self {
            target: target.into(),
            config,
        }
    }

    /// Runs all workers to completion and returns their reports in
    /// worker-index order. Completion order across workers is
    /// unconstrained; within a batch connections are strictly
    /// sequential and fail-fast.
    pub async fn run<S: ConnectStream>(&self) -> Vec<WorkerReport> {
        let connections = self.config.connections;
        let parallel = self.config.parallel.clamp(1, connections.max(1));

        let mut handles = Vec::with_capacity(parallel as usize);
        for worker in 0..parallel {
            let batch = batch_size(connections, parallel, worker);
            let target = self.target.clone();
            let config = self.config.clone();
            handles.push(tokio::spawn(run_batch::<S>(target, config, worker, batch)));
        }

        let joined = join_all(handles).await;
        let mut reports = Vec::with_capacity(joined.len());
        for (worker, res) in joined.into_iter().enumerate() {
            match res {
                Ok(report) => reports.push(report),
                Err(e) => {
                    warn!("worker {worker} panicked: {e}");
                    reports.push(WorkerReport {
                        worker: worker as u32,
                        results: Vec::new(),
                        failed: true,
                    });
                }
            }
        }
        reports
    }
}

/// Splits `connections` into `parallel` roughly-equal batches; the
/// first `connections % parallel` workers take one extra.
fn batch_size(connections: u32, parallel: u32, worker: u32) -> u32 {
    let base = connections / parallel;
    if worker < connections % parallel {
        base + 1
    } else {
        base
    }
}

async fn run_batch<S: ConnectStream>(
    target: String,
    config: LoadConfig,
    worker: u32,
    batch: u32,
) -> WorkerReport {
    let mut rng = StdRng::from_entropy();
    let min_len = config.min_len.max(1);
    let max_len = config.max_len.max(min_len);

    let mut results = Vec::with_capacity(batch as usize);
    let mut failed = false;

    for conn in 0..batch {
        let stream = match S::connect(&target).await {
            Ok(s) => s,
            Err(e) => {
                warn!("[{worker:02}:{conn:05}] {}", StressError::ConnectFailed(e));
                failed = true;
                break;
            }
        };

        let plan = TransferPlan::new(rng.gen_range(min_len..=max_len), config.chunk_len);
        let result = run_duplex(stream, &plan).await;
        info!(
            "[{worker:02}:{conn:05}] TX/RX: {:>10} bytes in {:>10.4} ms",
            result.bytes_received,
            result.elapsed.as_secs_f64() * 1000.0
        );

        let ok = result.outcome.is_success();
        if !ok {
            warn!(
                "[{worker:02}:{conn:05}] transfer failed ({:?}): sent {} received {} of {}",
                result.outcome, result.bytes_sent, result.bytes_received, plan.total_bytes
            );
        }
        results.push(result);
        if !ok {
            failed = true;
            break; // fail-fast within the batch
        }

        if !config.sleep.is_zero() {
            sleep(config.sleep).await;
        }
    }

    WorkerReport {
        worker,
        results,
        failed,
    }
}
