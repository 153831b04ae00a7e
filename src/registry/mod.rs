pub mod clock;
pub mod duration;
pub mod id;
pub mod service;
pub mod sweep;

pub use clock::{Clock, ManualClock, SystemClock};
pub use duration::parse_duration;
pub use id::{IdGenerator, InvalidPrefix};
pub use service::RegistryService;
pub use sweep::ExpirySweeper;

use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("invalid duration '{token}' (use e.g. 12h, 7d, 3m, 1a)")]
    InvalidDuration { token: String },
    #[error("permission denied")]
    PermissionDenied,
    #[error("key not found or expired: {id}")]
    NotFound { id: String },
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
}
