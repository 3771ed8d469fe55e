//! Contracts for encrypted-at-rest preference storage.

mod backend;
mod edit;
mod error;
mod value;

pub use backend::{InMemoryPrefsBackend, PrefsBackend};
pub use edit::{EditOp, PrefsEdit};
pub use error::{BackendError, StoreInitializationError};
pub use value::{PrefKind, PrefValue};
