use std::sync::Arc;

use super::Clock;
use crate::store::{CredentialRecord, CredentialStore, StoreError};

/// Lazily evicts expired keys. Runs inside registry operations only; there is
/// no background timer.
pub struct ExpirySweeper {
    clock: Arc<dyn Clock>,
}

impl ExpirySweeper {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn now(&self) -> u64 {
        self.clock.now()
    }

    /// Drop every record expired at `now` from the store. Writes only when
    /// something expired, so back-to-back calls persist at most once.
    pub fn sweep(&self, store: &CredentialStore, now: u64) -> Result<usize, StoreError> {
        let evicted = store.retain(|record| record.is_active(now))?;
        if !evicted.is_empty() {
            tracing::info!(count = evicted.len(), "Evicted expired keys");
            for id in &evicted.ids {
                tracing::debug!(id = id.as_str(), "Key expired");
            }
        }
        Ok(evicted.len())
    }

    /// Sweep, then return the active set in insertion order.
    pub fn reconcile(&self, store: &CredentialStore) -> Result<Vec<CredentialRecord>, StoreError> {
        let now = self.now();
        self.sweep(store, now)?;
        let mut active = store.snapshot()?;
        active.retain(|record| record.is_active(now));
        Ok(active)
    }
}
