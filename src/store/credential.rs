use serde::{Deserialize, Serialize};

use super::StoreError;
use crate::registry::id;

/// One issued key. Only `used` changes after construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRecord {
    id:         String,   // PREFIX-XXXX-XXXX-XXXX
    created_at: u64,      // Unix timestamp
    expires_at: u64,      // Unix timestamp, always > created_at
    created_by: String,
    used:       bool,
}

impl CredentialRecord {
    pub fn new(
        id: impl Into<String>,
        created_at: u64,
        expires_at: u64,
        created_by: impl Into<String>,
    ) -> Result<Self, StoreError> {
        let record = Self {
            id: id.into(),
            created_at,
            expires_at,
            created_by: created_by.into(),
            used: false,
        };
        record.validate()?;
        Ok(record)
    }

    /// Re-check the construction invariants. Records read back from storage
    /// bypass `new`, so the store calls this on load.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !id::is_well_formed(&self.id) {
            return Err(StoreError::InvalidRecord(format!("malformed id '{}'", self.id)));
        }
        if self.expires_at <= self.created_at {
            return Err(StoreError::InvalidRecord(format!(
                "{} expires at {} which is not after its creation at {}",
                self.id, self.expires_at, self.created_at
            )));
        }
        Ok(())
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    pub fn expires_at(&self) -> u64 {
        self.expires_at
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn used(&self) -> bool {
        self.used
    }

    pub(crate) fn set_used(&mut self, used: bool) {
        self.used = used;
    }

    /// Active means not yet expired at `now`. `used` plays no part.
    pub fn is_active(&self, now: u64) -> bool {
        self.expires_at > now
    }
}
