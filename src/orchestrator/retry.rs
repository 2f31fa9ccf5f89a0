use std::time::Duration;
use tracing::warn;

use crate::error::{ForgeError, Result};

use super::ports::PortFuture;

/// Exponential backoff before the second and third attempt.
pub const RETRY_BACKOFF: [Duration; 2] = [Duration::from_secs(1), Duration::from_secs(4)];

/// Runs a port call under a deadline, retrying transport failures up to two
/// times. A deadline expiry counts as a transport failure. Non-transport
/// errors propagate immediately; a third consecutive transport failure
/// returns `on_exhausted`.
pub async fn call_with_retry<'a, T, F>(
    operation: &str,
    timeout: Duration,
    mut attempt: F,
    on_exhausted: impl Fn(String) -> ForgeError,
) -> Result<T>
where
    F: FnMut() -> PortFuture<'a, T>,
{
    let mut last_failure = String::new();

    for round in 0..=RETRY_BACKOFF.len() {
        match tokio::time::timeout(timeout, attempt()).await {
            Ok(Ok(value)) => return Ok(value),
            Ok(Err(err)) if err.is_transport() => {
                last_failure = err.to_string();
            }
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                last_failure = format!("{operation} deadline of {timeout:?} expired");
            }
        }

        if let Some(backoff) = RETRY_BACKOFF.get(round) {
            warn!(
                "{} transport failure ({}), retrying in {:?}",
                operation, last_failure, backoff
            );
            tokio::time::sleep(*backoff).await;
        }
    }

    Err(on_exhausted(last_failure))
}
