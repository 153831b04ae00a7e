#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Registry: {0}")]
    Registry(#[from] crate::registry::RegistryError),
    #[error("Store: {0}")]
    Store(#[from] crate::store::StoreError),
    #[error("Config: {0}")]
    Prefix(#[from] crate::registry::InvalidPrefix),
    #[error("I/O: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Internal(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
