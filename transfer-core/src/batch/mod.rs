// /////////////////////////////////////////////////////////////////////////////
// Chunked File Transfer
// SPDX-License-Identifier: BSD-3-Clause
// /////////////////////////////////////////////////////////////////////////////

//! # Batch Orchestrator
//!
//! Runs many single-file transfers with bounded concurrency. Each item is
//! handed to a caller-supplied [`BatchExecutor`] - the orchestrator itself
//! knows nothing about coordinators, transports, or sessions; it only owns
//! the concurrency cap, the error policy, and progress reporting.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{error, info};

use transfer_domain::TransferError;

/// One file to transfer as part of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub filename: String,
    pub local_path: std::path::PathBuf,
}

/// What to do when one item in a batch fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchErrorPolicy {
    /// Keep running the remaining items; the failed one is recorded in the
    /// result vector as an `Err`.
    ContinueOnError,
    /// Stop scheduling new items as soon as one fails. Items already
    /// in flight are allowed to finish.
    StopOnError,
}

/// Executes one batch item. Implemented by whatever owns the coordinator
/// machinery (a client session, typically) - the orchestrator only calls
/// through this trait.
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    async fn execute(&self, item: &BatchItem) -> Result<(), TransferError>;
}

/// Progress emitted as the batch runs.
#[derive(Debug, Clone)]
pub enum BatchEvent {
    ItemStarted { index: usize, filename: String },
    ItemCompleted { index: usize, filename: String },
    ItemFailed { index: usize, filename: String, error: String },
    /// Emitted once, after every item has either completed, failed, or
    /// been skipped because `StopOnError` tripped.
    BatchFinished { succeeded: usize, failed: usize, skipped: usize },
}

pub struct BatchConfig {
    pub max_concurrent: usize,
    pub error_policy: BatchErrorPolicy,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            error_policy: BatchErrorPolicy::ContinueOnError,
        }
    }
}

/// Per-item outcome, in the same order as the input `Vec<BatchItem>`.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Succeeded,
    Failed(String),
    /// Never scheduled, because `StopOnError` tripped on an earlier item.
    Skipped,
}

pub struct BatchOrchestrator {
    config: BatchConfig,
}

impl BatchOrchestrator {
    pub fn new(config: BatchConfig) -> Self {
        Self { config }
    }

    /// Runs every item in `items` against `executor`, respecting
    /// `max_concurrent` and the configured error policy. Returns results in
    /// input order regardless of completion order, and reports progress on
    /// `events` as it goes (best-effort: a full/dropped receiver never
    /// fails the batch).
    pub async fn run(
        &self,
        items: Vec<BatchItem>,
        executor: Arc<dyn BatchExecutor>,
        events: mpsc::Sender<BatchEvent>,
    ) -> Vec<BatchOutcome> {
        let total = items.len();
        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent.max(1)));
        let stop_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));

        let mut joins: JoinSet<(usize, BatchOutcome)> = JoinSet::new();

        for (index, item) in items.into_iter().enumerate() {
            if self.config.error_policy == BatchErrorPolicy::StopOnError
                && stop_flag.load(std::sync::atomic::Ordering::Acquire)
            {
                let _ = events
                    .send(BatchEvent::ItemFailed {
                        index,
                        filename: item.filename.clone(),
                        error: "skipped after an earlier failure under StopOnError".into(),
                    })
                    .await;
                joins.spawn(async move { (index, BatchOutcome::Skipped) });
                continue;
            }

            let semaphore = semaphore.clone();
            let executor = executor.clone();
            let events = events.clone();
            let stop_flag = stop_flag.clone();
            let policy = self.config.error_policy;

            joins.spawn(async move {
                let _permit = semaphore.acquire_owned().await.expect("semaphore never closed");
                let _ = events
                    .send(BatchEvent::ItemStarted { index, filename: item.filename.clone() })
                    .await;

                match executor.execute(&item).await {
                    Ok(()) => {
                        let _ = events
                            .send(BatchEvent::ItemCompleted { index, filename: item.filename.clone() })
                            .await;
                        (index, BatchOutcome::Succeeded)
                    }
                    Err(e) => {
                        error!(filename = %item.filename, error = %e, "batch item failed");
                        if policy == BatchErrorPolicy::StopOnError {
                            stop_flag.store(true, std::sync::atomic::Ordering::Release);
                        }
                        let _ = events
                            .send(BatchEvent::ItemFailed {
                                index,
                                filename: item.filename.clone(),
                                error: e.to_string(),
                            })
                            .await;
                        (index, BatchOutcome::Failed(e.to_string()))
                    }
                }
            });
        }

        // `JoinSet` doesn't preserve submission order, so results are
        // collected into a dense, index-addressed vector and sorted back.
        let mut ordered: Vec<Option<BatchOutcome>> = (0..total).map(|_| None).collect();
        while let Some(joined) = joins.join_next().await {
            match joined {
                Ok((index, outcome)) => ordered[index] = Some(outcome),
                Err(join_err) => {
                    error!(error = %join_err, "batch task panicked");
                }
            }
        }

        let results: Vec<BatchOutcome> = ordered
            .into_iter()
            .map(|o| o.unwrap_or(BatchOutcome::Failed("task panicked before reporting a result".into())))
            .collect();

        let succeeded = results.iter().filter(|r| matches!(r, BatchOutcome::Succeeded)).count();
        let failed = results.iter().filter(|r| matches!(r, BatchOutcome::Failed(_))).count();
        let skipped = results.iter().filter(|r| matches!(r, BatchOutcome::Skipped)).count();
        info!(succeeded, failed, skipped, "batch finished");
        let _ = events.send(BatchEvent::BatchFinished { succeeded, failed, skipped }).await;

        results
    }
}
