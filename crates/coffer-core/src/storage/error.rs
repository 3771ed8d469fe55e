use thiserror::Error;

/// Steady-state failures raised by a preference backend after it has been opened.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BackendError {
    /// Underlying storage I/O failed.
    #[error("storage i/o failure: {reason}")]
    Io { reason: String },
    /// Encryption or decryption of an entry failed.
    #[error("crypto failure: {reason}")]
    Crypto { reason: String },
    /// A value could not be encoded or decoded.
    #[error("encoding failure: {reason}")]
    Encoding { reason: String },
    /// Internal lock was poisoned by a panicking writer.
    #[error("lock poisoned: {reason}")]
    Poisoned { reason: String },
}

/// Fatal failure while creating the store. Raised once; no store is usable afterwards.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreInitializationError {
    /// The master key could not be loaded or generated.
    #[error("master key unavailable: {reason}")]
    MasterKey { reason: String },
    /// The backing file could not be read or its directory created.
    #[error("storage i/o failure during init: {reason}")]
    Io { reason: String },
    /// Persisted data is malformed or of an unknown version.
    #[error("stored preferences are corrupt: {reason}")]
    Corrupt { reason: String },
    /// Key derivation or entry authentication failed.
    #[error("crypto failure during init: {reason}")]
    Crypto { reason: String },
}
