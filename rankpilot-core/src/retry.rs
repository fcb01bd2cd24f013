use crate::{CoreError, CoreResult};
use std::future::Future;

/// Re-run a single atomic transaction when the ledger reports a retryable
/// failure (e.g. a serialization conflict). Only the one transaction is
/// retried; multi-step sequences above this layer never are.
pub async fn with_tx_retry<T, F, Fut>(max_attempts: u32, mut op: F) -> CoreResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = CoreResult<T>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Err(err) if err.is_retryable() && attempt < max_attempts => {
                tracing::warn!(attempt, "retrying ledger transaction: {}", err);
            }
            other => return other,
        }
    }
}
