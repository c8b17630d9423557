//! Bounded-parallel retrieval of per-target details.
//!
//! The target list is cut into contiguous groups, each group is worked off
//! sequentially by its own task and every target reports exactly one result
//! (its records, or the fact that it was abandoned). A target that keeps
//! failing never fails the batch; it is counted and left out.

use crate::{
    error::Result,
    source::ExporterMetrics,
};
use std::{
    future::Future,
    sync::Arc,
    time::Duration,
};
use tokio::sync::mpsc;

/// Target count per group is derived from the number of groups we aim for.
pub const TARGET_GROUPS: f64 = 40.0;

/// Group size for `targets` targets. Small batches are handled by a single
/// group.
pub fn group_size(targets: usize) -> usize {
    let control = (targets as f64 / TARGET_GROUPS + 0.6).round() as usize;
    if control <= 1 {
        targets
    } else {
        control
    }
}

/// Contiguous groups covering every target exactly once, in order.
pub fn partition<T: Clone>(targets: &[T]) -> Vec<Vec<T>> {
    let size = group_size(targets.len()).max(1);
    targets.chunks(size).map(<[T]>::to_vec).collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts after the first one.
    pub max_retries: u32,
    /// Attempt `n` waits `n * delay_unit` first.
    pub delay_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            delay_unit: Duration::from_secs(1),
        }
    }
}

#[derive(Debug)]
pub struct BatchOutcome<T> {
    pub records: Vec<T>,
    /// Targets that still failed after all retries.
    pub abandoned: Vec<String>,
}

impl<T> Default for BatchOutcome<T> {
    fn default() -> Self {
        Self {
            records: Vec::new(),
            abandoned: Vec::new(),
        }
    }
}

enum TargetResult<T> {
    Fetched(Vec<T>),
    Abandoned(String),
}

#[derive(Clone)]
pub struct BatchRetriever {
    instance: String,
    label: &'static str,
    policy: RetryPolicy,
    metrics: Arc<dyn ExporterMetrics>,
}

impl BatchRetriever {
    /// Failures are reported to `metrics` under `label`.
    pub fn new(
        instance: impl Into<String>,
        label: &'static str,
        policy: RetryPolicy,
        metrics: Arc<dyn ExporterMetrics>,
    ) -> Self {
        Self {
            instance: instance.into(),
            label,
            policy,
            metrics,
        }
    }

    pub async fn retrieve<T, F, Fut>(&self, targets: Vec<String>, fetch: F) -> BatchOutcome<T>
    where
        T: Send + 'static,
        F: Fn(String) -> Fut + Clone + Send + Sync + 'static,
        Fut: Future<Output = Result<Vec<T>>> + Send + 'static,
    {
        let total = targets.len();
        if total == 0 {
            return BatchOutcome::default();
        }

        let groups = partition(&targets);
        debug!(
            instance = %self.instance,
            subsystem = self.label,
            targets = total,
            groups = groups.len(),
            "retrieving target details"
        );

        let (tx, mut rx) = mpsc::unbounded_channel();
        for group in groups {
            let tx = tx.clone();
            let fetch = fetch.clone();
            let retriever = self.clone();
            tokio::spawn(async move {
                for target in group {
                    let result = retriever.fetch_with_retry(target, &fetch).await;
                    if tx.send(result).is_err() {
                        break;
                    }
                }
            });
        }
        drop(tx);

        let mut outcome = BatchOutcome::default();
        let mut accounted = 0;
        while accounted < total {
            let Some(result) = rx.recv().await else {
                break;
            };
            accounted += 1;
            match result {
                TargetResult::Fetched(records) => outcome.records.extend(records),
                TargetResult::Abandoned(target) => {
                    self.metrics.target_abandoned(&self.instance, self.label);
                    outcome.abandoned.push(target);
                }
            }
        }

        if accounted < total {
            error!(
                instance = %self.instance,
                subsystem = self.label,
                missing = total - accounted,
                "retrieval groups ended without reporting every target"
            );
        }
        outcome
    }

    async fn fetch_with_retry<T, F, Fut>(&self, target: String, fetch: &F) -> TargetResult<T>
    where
        F: Fn(String) -> Fut,
        Fut: Future<Output = Result<Vec<T>>>,
    {
        let mut attempt = 0;
        loop {
            match fetch(target.clone()).await {
                Ok(records) => return TargetResult::Fetched(records),
                Err(err) if err.is_retryable() => {
                    self.metrics.api_collect_failure(&self.instance, self.label);
                    if attempt >= self.policy.max_retries {
                        warn!(
                            instance = %self.instance,
                            subsystem = self.label,
                            %target,
                            attempts = attempt + 1,
                            error = %err,
                            "giving up on target"
                        );
                        return TargetResult::Abandoned(target);
                    }
                    attempt += 1;
                    debug!(
                        instance = %self.instance,
                        subsystem = self.label,
                        %target,
                        attempt,
                        error = %err,
                        "retrying target"
                    );
                    tokio::time::sleep(self.policy.delay_unit * attempt).await;
                }
                Err(err) => {
                    self.metrics.decode_failure(&self.instance, self.label);
                    warn!(
                        instance = %self.instance,
                        subsystem = self.label,
                        %target,
                        error = %err,
                        "target payload rejected"
                    );
                    return TargetResult::Abandoned(target);
                }
            }
        }
    }
}
