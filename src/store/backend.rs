use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use super::{CredentialRecord, StoreError};

/// Durable home of the registry. Both operations act on the whole registry
/// and must be atomic: after `replace` returns, `read` yields either the old
/// or the new contents, never a mix.
pub trait RegistryBackend: Send + Sync {
    /// `Ok(None)` when nothing has been persisted yet.
    fn read(&self) -> Result<Option<Vec<CredentialRecord>>, StoreError>;

    fn replace(&self, records: &[CredentialRecord]) -> Result<(), StoreError>;

    /// Human-readable location for logs.
    fn describe(&self) -> String;
}

/// Process-local backend. Nothing survives a restart.
#[derive(Default)]
pub struct MemoryBackend {
    records: Mutex<Option<Vec<CredentialRecord>>>,
    writes: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start as if `records` had already been persisted.
    pub fn with_records(records: Vec<CredentialRecord>) -> Self {
        Self {
            records: Mutex::new(Some(records)),
            ..Self::default()
        }
    }

    /// Number of successful `replace` calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make subsequent writes fail with `StoreError::Persist`.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn persisted(&self) -> Option<Vec<CredentialRecord>> {
        self.records.lock().ok().and_then(|guard| guard.clone())
    }
}

impl RegistryBackend for MemoryBackend {
    fn read(&self) -> Result<Option<Vec<CredentialRecord>>, StoreError> {
        let guard = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        Ok(guard.clone())
    }

    fn replace(&self, records: &[CredentialRecord]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Persist("memory backend write refused".into()));
        }
        let mut guard = self.records.lock().map_err(|_| StoreError::Poisoned)?;
        *guard = Some(records.to_vec());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
