use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::{CredentialRecord, RegistryBackend, StoreError};

/// In-memory registry: records by id plus their insertion order.
#[derive(Debug, Clone, Default)]
struct Registry {
    by_id: HashMap<String, CredentialRecord>,
    order: Vec<String>,
}

impl Registry {
    /// Build from persisted records, dropping invalid ones and later duplicates.
    fn from_records(records: Vec<CredentialRecord>) -> Self {
        let mut registry = Self::default();
        for record in records {
            if let Err(e) = record.validate() {
                tracing::warn!(error = %e, "Skipping invalid key record");
                continue;
            }
            if registry.by_id.contains_key(record.id()) {
                tracing::warn!(id = record.id(), "Skipping duplicate key record");
                continue;
            }
            registry.insert(record);
        }
        registry
    }

    fn records(&self) -> Vec<CredentialRecord> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .cloned()
            .collect()
    }

    /// Insert or replace. A replaced record keeps its original position.
    fn insert(&mut self, record: CredentialRecord) {
        let id = record.id().to_string();
        if self.by_id.insert(id.clone(), record).is_none() {
            self.order.push(id);
        }
    }

    fn remove(&mut self, id: &str) -> Option<CredentialRecord> {
        let record = self.by_id.remove(id)?;
        self.order.retain(|i| i != id);
        Some(record)
    }
}

/// Records removed by [`CredentialStore::retain`].
#[derive(Debug, Default)]
pub struct Evicted {
    pub ids: Vec<String>,
}

impl Evicted {
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }
}

/// The only owner of registry state. Every operation holds one lock for its
/// whole read-modify-persist cycle, and memory is only updated after the
/// backend accepted the new contents.
pub struct CredentialStore {
    backend: Arc<dyn RegistryBackend>,
    state: Mutex<Registry>,
}

impl CredentialStore {
    /// Load the registry from `backend`. Missing or corrupt storage starts empty.
    pub fn load(backend: Arc<dyn RegistryBackend>) -> Result<Self, StoreError> {
        let registry = match backend.read() {
            Ok(Some(records)) => Registry::from_records(records),
            Ok(None) => {
                tracing::info!(backend = backend.describe(), "No registry persisted yet, starting empty");
                Registry::default()
            }
            Err(StoreError::Corrupt(reason)) => {
                tracing::warn!(backend = backend.describe(), reason = %reason, "Registry storage corrupt, starting empty");
                Registry::default()
            }
            Err(e) => return Err(e),
        };
        Ok(Self {
            backend,
            state: Mutex::new(registry),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Registry>, StoreError> {
        self.state.lock().map_err(|_| StoreError::Poisoned)
    }

    /// Persist `next`, then make it current. On failure memory is untouched.
    fn commit(&self, guard: &mut MutexGuard<'_, Registry>, next: Registry) -> Result<(), StoreError> {
        self.backend.replace(&next.records())?;
        **guard = next;
        Ok(())
    }

    /// Insert or replace a record by id.
    pub fn upsert(&self, record: CredentialRecord) -> Result<(), StoreError> {
        record.validate()?;
        let mut guard = self.lock()?;
        let mut next = Registry::clone(&guard);
        next.insert(record);
        self.commit(&mut guard, next)
    }

    /// Insert only if the id is free. Returns false, without writing, when taken.
    pub fn insert_unique(&self, record: CredentialRecord) -> Result<bool, StoreError> {
        record.validate()?;
        let mut guard = self.lock()?;
        if guard.by_id.contains_key(record.id()) {
            return Ok(false);
        }
        let mut next = Registry::clone(&guard);
        next.insert(record);
        self.commit(&mut guard, next)?;
        Ok(true)
    }

    /// Remove a record by id; returns whether anything was removed.
    pub fn remove(&self, id: &str) -> Result<bool, StoreError> {
        let mut guard = self.lock()?;
        if !guard.by_id.contains_key(id) {
            return Ok(false);
        }
        let mut next = Registry::clone(&guard);
        next.remove(id);
        self.commit(&mut guard, next)?;
        Ok(true)
    }

    /// Swap in a whole new registry; returns how many records it replaced.
    pub fn replace_all(&self, records: Vec<CredentialRecord>) -> Result<usize, StoreError> {
        for record in &records {
            record.validate()?;
        }
        let mut guard = self.lock()?;
        let replaced = guard.order.len();
        self.commit(&mut guard, Registry::from_records(records))?;
        Ok(replaced)
    }

    /// Keep only records matching `keep`, as one replace-all under the lock.
    /// Nothing is written when every record is kept.
    pub fn retain<F>(&self, mut keep: F) -> Result<Evicted, StoreError>
    where
        F: FnMut(&CredentialRecord) -> bool,
    {
        let mut guard = self.lock()?;
        let evicted: Vec<String> = guard
            .order
            .iter()
            .filter(|id| guard.by_id.get(*id).is_some_and(|r| !keep(r)))
            .cloned()
            .collect();
        if evicted.is_empty() {
            return Ok(Evicted::default());
        }
        let mut next = Registry::clone(&guard);
        for id in &evicted {
            next.remove(id);
        }
        self.commit(&mut guard, next)?;
        Ok(Evicted { ids: evicted })
    }

    /// Mutate one record in place. `f` returning `None` discards its changes
    /// and skips the write; so does a missing id.
    pub fn update<F, R>(&self, id: &str, f: F) -> Result<Option<R>, StoreError>
    where
        F: FnOnce(&mut CredentialRecord) -> Option<R>,
    {
        let mut guard = self.lock()?;
        let mut next = Registry::clone(&guard);
        let Some(record) = next.by_id.get_mut(id) else {
            return Ok(None);
        };
        let Some(result) = f(record) else {
            return Ok(None);
        };
        self.commit(&mut guard, next)?;
        Ok(Some(result))
    }

    pub fn get(&self, id: &str) -> Result<Option<CredentialRecord>, StoreError> {
        Ok(self.lock()?.by_id.get(id).cloned())
    }

    /// Copy of every record in insertion order.
    pub fn snapshot(&self) -> Result<Vec<CredentialRecord>, StoreError> {
        Ok(self.lock()?.records())
    }

    pub fn credential_count(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.order.len())
    }
}
