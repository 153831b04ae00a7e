use std::sync::Arc;

use super::{Clock, ExpirySweeper, IdGenerator, RegistryError, SystemClock, id, parse_duration};
use crate::store::{CredentialRecord, CredentialStore, StoreError};

/// Attempts at finding an unused id before Create gives up.
pub const MAX_ID_ATTEMPTS: usize = 8;

/// The one entry point for every adapter. Privilege is a plain boolean
/// decided by the caller; it is checked before anything else happens.
pub struct RegistryService {
    store: Arc<CredentialStore>,
    sweeper: ExpirySweeper,
    next_id: Box<dyn Fn() -> String + Send + Sync>,
}

fn ensure_privileged(is_privileged: bool) -> Result<(), RegistryError> {
    if is_privileged {
        Ok(())
    } else {
        Err(RegistryError::PermissionDenied)
    }
}

impl RegistryService {
    pub fn new(store: Arc<CredentialStore>, ids: IdGenerator) -> Self {
        Self::with_clock(store, ids, Arc::new(SystemClock))
    }

    pub fn with_clock(store: Arc<CredentialStore>, ids: IdGenerator, clock: Arc<dyn Clock>) -> Self {
        Self::with_id_source(store, clock, move || ids.generate())
    }

    /// Draw ids from `next_id` instead of an [`IdGenerator`]. Every id it
    /// yields must be well formed.
    pub fn with_id_source<F>(store: Arc<CredentialStore>, clock: Arc<dyn Clock>, next_id: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        Self {
            store,
            sweeper: ExpirySweeper::new(clock),
            next_id: Box::new(next_id),
        }
    }

    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    /// Issue a key valid for `duration_token` from now.
    pub fn create(
        &self,
        duration_token: &str,
        requested_by: &str,
        is_privileged: bool,
    ) -> Result<CredentialRecord, RegistryError> {
        ensure_privileged(is_privileged)?;
        let ttl = parse_duration(duration_token)?;

        let created_at = self.sweeper.now();
        self.sweeper.sweep(&self.store, created_at)?;
        let expires_at = created_at
            .checked_add(ttl.as_secs())
            .ok_or_else(|| RegistryError::InvalidDuration {
                token: duration_token.to_string(),
            })?;

        for attempt in 1..=MAX_ID_ATTEMPTS {
            let record = CredentialRecord::new((self.next_id)(), created_at, expires_at, requested_by)?;
            if self.store.insert_unique(record.clone())? {
                tracing::info!(
                    id = record.id(),
                    created_by = requested_by,
                    expires_at,
                    "Key created"
                );
                return Ok(record);
            }
            tracing::warn!(attempt, "Generated key id already in use, retrying");
        }
        Err(StoreError::IdSpaceExhausted(MAX_ID_ATTEMPTS).into())
    }

    pub fn delete(&self, id: &str, is_privileged: bool) -> Result<(), RegistryError> {
        ensure_privileged(is_privileged)?;
        let id = id::normalize(id);
        let now = self.sweeper.now();
        self.sweeper.sweep(&self.store, now)?;

        if !self.store.remove(&id)? {
            return Err(RegistryError::NotFound { id });
        }
        tracing::info!(id = id.as_str(), "Key deleted");
        Ok(())
    }

    /// Look up an active key. Needs no privilege: this backs both the
    /// operator's check and the loader's validation query.
    pub fn get(&self, id: &str) -> Result<CredentialRecord, RegistryError> {
        let id = id::normalize(id);
        let now = self.sweeper.now();
        self.sweeper.sweep(&self.store, now)?;

        match self.store.get(&id)? {
            Some(record) if record.is_active(now) => Ok(record),
            _ => {
                tracing::debug!(id = id.as_str(), "Lookup of unknown or expired key");
                Err(RegistryError::NotFound { id })
            }
        }
    }

    /// Active keys in insertion order.
    pub fn list(&self, is_privileged: bool) -> Result<Vec<CredentialRecord>, RegistryError> {
        ensure_privileged(is_privileged)?;
        Ok(self.sweeper.reconcile(&self.store)?)
    }

    /// Flip the `used` flag; returns the new value. Validity is unaffected.
    pub fn toggle_used(&self, id: &str, is_privileged: bool) -> Result<bool, RegistryError> {
        ensure_privileged(is_privileged)?;
        let id = id::normalize(id);
        let now = self.sweeper.now();
        self.sweeper.sweep(&self.store, now)?;

        let used = self.store.update(&id, |record| {
            record.is_active(now).then(|| {
                record.set_used(!record.used());
                record.used()
            })
        })?;
        match used {
            Some(used) => {
                tracing::info!(id = id.as_str(), used, "Key used flag toggled");
                Ok(used)
            }
            None => Err(RegistryError::NotFound { id }),
        }
    }

    /// Delete every key; returns how many active keys were removed.
    pub fn clear_all(&self, is_privileged: bool) -> Result<usize, RegistryError> {
        ensure_privileged(is_privileged)?;
        let now = self.sweeper.now();
        self.sweeper.sweep(&self.store, now)?;

        let removed = self.store.replace_all(Vec::new())?;
        tracing::info!(removed, "All keys deleted");
        Ok(removed)
    }
}
