use std::thread::sleep;
use std::time::Duration;

use tracing::debug;
use tracing::warn;

use crate::BackoffPolicy;
use crate::Error;
use crate::Result;

/// Runs `op`, retrying with exponential backoff while the store reports it is
/// still loading. Any other failure is returned at once; once retries run
/// out the last loading error is returned.
pub(crate) fn retry_with_backoff<T, F>(
    policy: &BackoffPolicy,
    command: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut() -> Result<T>,
{
    let mut retries = 0;
    let mut delay = policy.base_delay();

    loop {
        match op() {
            Ok(value) => {
                if retries > 0 {
                    debug!(command, retries, "Store command succeeded after retries");
                }
                return Ok(value);
            }
            Err(e) if e.is_loading() && retries < policy.max_retries => {
                warn!("{}", describe(command, &e));
                retries += 1;
                sleep(delay);
                delay = (delay * 2).min(policy.max_delay().max(Duration::from_millis(1)));
            }
            Err(e) => {
                if e.is_loading() {
                    warn!(command, retries, "Store still loading after max retries");
                }
                return Err(e);
            }
        }
    }
}

fn describe(
    command: &str,
    e: &Error,
) -> String {
    match e {
        Error::Store(crate::StoreError::Loading { reason, .. }) => {
            format!("{command} failed, reason: {reason}")
        }
        other => format!("{command} failed: {other}"),
    }
}
