//! Bounded retry for storage failures, for use by adapters.
//!
//! Only [`RegistryError::Storage`] errors whose cause is transient are
//! retried. A failed persist leaves the registry exactly as it was, so
//! repeating the whole operation is safe. Every other error kind is
//! returned on the first attempt.
//!
//! Registry operations are synchronous, so the backoff sleeps the calling
//! thread. Call this from a blocking context (`spawn_blocking`).

use std::time::Duration;

use rand::Rng;

use crate::registry::RegistryError;

pub const MAX_ATTEMPTS: u32 = 3;
const BASE_BACKOFF: Duration = Duration::from_millis(25);

pub fn with_storage_retry<T, F>(operation: &str, mut f: F) -> Result<T, RegistryError>
where
    F: FnMut() -> Result<T, RegistryError>,
{
    let mut attempt = 1;
    loop {
        match f() {
            Err(RegistryError::Storage(err)) if err.is_transient() && attempt < MAX_ATTEMPTS => {
                let delay = backoff(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    max_attempts = MAX_ATTEMPTS,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Storage error, retrying after backoff"
                );
                std::thread::sleep(delay);
                attempt += 1;
            }
            Err(RegistryError::Storage(err)) => {
                tracing::error!(operation, attempt, error = %err, "Storage operation failed");
                return Err(RegistryError::Storage(err));
            }
            other => return other,
        }
    }
}

/// `BASE_BACKOFF * 2^(attempt-1)` plus up to 50% jitter.
fn backoff(attempt: u32) -> Duration {
    let base = BASE_BACKOFF * 2u32.saturating_pow(attempt.saturating_sub(1));
    let jitter_ms = rand::thread_rng().gen_range(0..=base.as_millis() as u64 / 2);
    base + Duration::from_millis(jitter_ms)
}
