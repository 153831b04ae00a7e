pub mod backend;
pub mod credential;
pub mod disk;
pub mod index;

pub use backend::{MemoryBackend, RegistryBackend};
pub use credential::CredentialRecord;
pub use disk::FileBackend;
pub use index::CredentialStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialize: {0}")]
    Serialization(String),
    #[error("Corrupt: {0}")]
    Corrupt(String),
    #[error("Invalid record: {0}")]
    InvalidRecord(String),
    #[error("Persist: {0}")]
    Persist(String),
    #[error("Store lock poisoned")]
    Poisoned,
    #[error("No unused key id after {0} attempts")]
    IdSpaceExhausted(usize),
}

impl StoreError {
    /// Whether repeating the same operation can succeed without outside help.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Io(_) | StoreError::Persist(_))
    }
}
