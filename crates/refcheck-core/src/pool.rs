//! Bounded worker pool for record verification.
//!
//! Jobs go through one shared `async_channel` queue; `num_workers` tasks pull
//! from it and run the match pipeline. Each job carries a oneshot sender for
//! its verdict. Per-capability limiters and the serial lock for budgeted
//! capabilities live in [`RateLimiters`](crate::RateLimiters), so the pool
//! itself never sees a service.

use std::sync::Arc;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::pipeline::MatchPipeline;
use crate::{Config, Degradation, Lookups, ProgressEvent, ReferenceRecord, Verdict};

/// A record verification job submitted to the pool.
pub struct RecordJob {
    pub record: ReferenceRecord,
    pub result_tx: oneshot::Sender<Verdict>,
    pub index: usize,
    pub total: usize,
    pub progress: Arc<dyn Fn(ProgressEvent) + Send + Sync>,
}

/// A pool of worker tasks verifying records.
///
/// Submit jobs via [`submit()`](VerificationPool::submit) and await the
/// oneshot receiver of each. A job picked up after cancellation is dropped
/// without a verdict, so its receiver resolves to an error.
pub struct VerificationPool {
    job_tx: async_channel::Sender<RecordJob>,
    pool_handle: JoinHandle<()>,
}

impl VerificationPool {
    pub fn new(
        lookups: Arc<Lookups>,
        config: Arc<Config>,
        cancel: CancellationToken,
        num_workers: usize,
    ) -> Self {
        let (job_tx, job_rx) = async_channel::unbounded::<RecordJob>();

        let pool_handle = tokio::spawn(async move {
            let mut handles = Vec::with_capacity(num_workers.max(1));
            for _ in 0..num_workers.max(1) {
                handles.push(tokio::spawn(worker_loop(
                    job_rx.clone(),
                    lookups.clone(),
                    config.clone(),
                    cancel.clone(),
                )));
            }
            drop(job_rx);

            for h in handles {
                let _ = h.await;
            }
        });

        Self {
            job_tx,
            pool_handle,
        }
    }

    pub async fn submit(&self, job: RecordJob) {
        let _ = self.job_tx.send(job).await;
    }

    /// Close the queue and wait for the workers to drain it.
    pub async fn shutdown(self) {
        self.job_tx.close();
        let _ = self.pool_handle.await;
    }
}

async fn worker_loop(
    job_rx: async_channel::Receiver<RecordJob>,
    lookups: Arc<Lookups>,
    config: Arc<Config>,
    cancel: CancellationToken,
) {
    while let Ok(job) = job_rx.recv().await {
        // Keep draining after cancellation so every receiver resolves.
        if cancel.is_cancelled() {
            tracing::debug!(index = job.index, "skipping: cancelled");
            continue;
        }

        let RecordJob {
            record,
            result_tx,
            index,
            total,
            progress,
        } = job;
        let title = record.title.clone().unwrap_or_default();

        progress(ProgressEvent::Checking {
            index,
            total,
            title: title.clone(),
        });

        let announce = |lookup: &str| {
            progress(ProgressEvent::QuotaExhausted {
                lookup: lookup.to_string(),
            })
        };
        let verdict = MatchPipeline::new(&lookups, &config)
            .on_quota_exhausted(&announce)
            .verify(record)
            .await;

        let Some(verdict) = verdict else {
            continue;
        };

        emit_warnings(progress.as_ref(), &verdict, index, &title);
        progress(ProgressEvent::Verdict {
            index,
            total,
            tier: verdict.tier,
        });
        let _ = result_tx.send(verdict);
    }
}

fn emit_warnings(
    progress: &(dyn Fn(ProgressEvent) + Send + Sync),
    verdict: &Verdict,
    index: usize,
    title: &str,
) {
    if !verdict.failed_lookups.is_empty() {
        progress(ProgressEvent::Warning {
            index,
            title: title.to_string(),
            message: format!("lookup failed: {}", verdict.failed_lookups.join(", ")),
        });
    }
    if let Some(Degradation::SearchError(msg)) = &verdict.degraded {
        progress(ProgressEvent::Warning {
            index,
            title: title.to_string(),
            message: msg.clone(),
        });
    }
}

/// Verify `records` on a fresh pool and return completed verdicts in input order.
///
/// Records not started before cancellation are missing from the result.
pub async fn check_records(
    records: Vec<ReferenceRecord>,
    lookups: Arc<Lookups>,
    config: Arc<Config>,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<Verdict> {
    let total = records.len();
    if total == 0 {
        return Vec::new();
    }

    let num_workers = config.num_workers.clamp(1, total);
    let pool = VerificationPool::new(lookups, config, cancel, num_workers);
    let progress: Arc<dyn Fn(ProgressEvent) + Send + Sync> = Arc::new(progress);

    let mut receivers = Vec::with_capacity(total);
    for (index, record) in records.into_iter().enumerate() {
        let (result_tx, result_rx) = oneshot::channel();
        pool.submit(RecordJob {
            record,
            result_tx,
            index,
            total,
            progress: progress.clone(),
        })
        .await;
        receivers.push(result_rx);
    }

    let mut verdicts = Vec::with_capacity(total);
    for rx in receivers {
        if let Ok(verdict) = rx.await {
            verdicts.push(verdict);
        }
    }

    pool.shutdown().await;
    verdicts
}
