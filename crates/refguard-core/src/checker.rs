use crate::pool::{self, RefJob, ValidationPool};
use crate::{Config, ProgressEvent, Reference, ValidationResult};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Check a list of references against academic databases.
///
/// Creates an internal ValidationPool with `num_workers` workers.
/// Submits all refs, collects results via oneshot channels.
/// Progress events are emitted via the callback. Cancellation is supported.
pub async fn check_references(
    refs: Vec<Reference>,
    config: Config,
    progress: impl Fn(ProgressEvent) + Send + Sync + 'static,
    cancel: CancellationToken,
) -> Vec<ValidationResult> {
    let total = refs.len();
    if total == 0 {
        return vec![];
    }

    let num_workers = config.num_workers.max(1);
    let config = Arc::new(config);
    let progress = Arc::new(progress);

    // Create the pool
    let pool = ValidationPool::new(config.clone(), cancel.clone(), num_workers);

    // Submit all refs and collect oneshot receivers
    let mut receivers = Vec::with_capacity(total);
    for (i, reference) in refs.iter().enumerate() {
        if cancel.is_cancelled() {
            break;
        }

        let (result_tx, result_rx) = tokio::sync::oneshot::channel();
        let job = RefJob {
            reference: reference.clone(),
            result_tx,
            ref_index: i,
            total,
            progress: progress.clone(),
        };

        pool.submit(job).await;
        receivers.push((i, result_rx));
    }

    // Collect results
    let mut results: Vec<Option<ValidationResult>> = vec![None; total];
    for (i, rx) in receivers {
        if let Ok(result) = rx.await {
            results[i] = Some(result);
        }
    }

    pool.shutdown().await;

    let mut results: Vec<ValidationResult> = results.into_iter().flatten().collect();

    if !cancel.is_cancelled() {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(2)
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        pool::retry_failed(&mut results, &config, &client, progress.as_ref(), &cancel).await;
    }

    results
}
