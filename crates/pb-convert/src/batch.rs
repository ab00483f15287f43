//! Bounded fan-out of independent conversions.

use std::sync::Arc;
use std::time::Duration;

use pb_core::{validate_batch, BatchEntry, BatchItem, BatchResult, ConversionOutcome, ErrorKind};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::executor::ConversionExecutor;

/// Run every item and collect one outcome per item, in input order.
///
/// At most `concurrency` items of this batch run at once; each item also
/// waits for a global process slot inside the executor. A failing item
/// never affects the others.
///
/// # Errors
///
/// Returns [`pb_core::Error::Validation`] before anything runs if the batch
/// is empty, exceeds [`pb_core::MAX_BATCH_ITEMS`], repeats an id, or has an
/// item with invalid options.
pub async fn run_batch(
    executor: Arc<ConversionExecutor>,
    items: Vec<BatchItem>,
    timeout: Duration,
    concurrency: usize,
) -> pb_core::Result<BatchResult> {
    validate_batch(&items)?;

    let total = items.len();
    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut tasks = JoinSet::new();
    let mut ids = Vec::with_capacity(total);

    for (index, item) in items.into_iter().enumerate() {
        ids.push(item.id);
        let request = item.request;
        let executor = Arc::clone(&executor);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _slot = semaphore.acquire_owned().await;
            let outcome = executor.convert(&request, timeout).await;
            (index, outcome)
        });
    }

    let mut slots: Vec<Option<ConversionOutcome>> = vec![None; total];
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((index, outcome)) => slots[index] = Some(outcome),
            Err(e) => tracing::error!("Batch item task failed: {e}"),
        }
    }

    let entries = ids
        .into_iter()
        .zip(slots)
        .map(|(id, slot)| BatchEntry {
            id,
            outcome: slot.unwrap_or_else(|| {
                ConversionOutcome::failure(ErrorKind::InternalError, "Batch item did not complete")
            }),
        })
        .collect();

    let result = BatchResult::from_entries(entries);
    tracing::info!(
        total = result.total,
        succeeded = result.succeeded,
        failed = result.failed,
        "Batch finished"
    );
    Ok(result)
}
