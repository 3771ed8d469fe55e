use std::{
    fmt,
    sync::{Arc, Mutex},
};

use base64::{engine::general_purpose, Engine as _};
use coffer_core::storage::StoreInitializationError;
use rand::{rngs::OsRng, RngCore};
use thiserror::Error;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Scheme the master key is generated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyScheme {
    Aes256Gcm,
}

/// Root key material. Subkeys for the key and value channels are derived from it.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey {
    /// Identifier for logging/rotation (never log key bytes).
    pub id: String,
    #[zeroize(skip)]
    pub scheme: KeyScheme,
    /// 256-bit symmetric key.
    pub bytes: [u8; 32],
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MasterKey")
            .field("id", &self.id)
            .field("scheme", &self.scheme)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyError {
    #[error("keyring error: {0}")]
    Keyring(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("generation error: {0}")]
    Generation(String),
}

impl From<KeyError> for StoreInitializationError {
    fn from(err: KeyError) -> Self {
        StoreInitializationError::MasterKey {
            reason: err.to_string(),
        }
    }
}

/// Provides the master key (OS keychain in production; memory in tests).
pub trait KeyProvider: Send + Sync {
    fn get_or_create(&self) -> Result<MasterKey, KeyError>;
}

impl<P: KeyProvider + ?Sized> KeyProvider for Arc<P> {
    fn get_or_create(&self) -> Result<MasterKey, KeyError> {
        (**self).get_or_create()
    }
}

/// OS keyring-backed provider. Uses the `keyring` crate to store the key.
pub struct KeyringProvider {
    service: String,
    account: String,
}

impl KeyringProvider {
    pub fn new(service: impl Into<String>, account: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            account: account.into(),
        }
    }
}

impl KeyProvider for KeyringProvider {
    fn get_or_create(&self) -> Result<MasterKey, KeyError> {
        let entry = keyring::Entry::new(&self.service, &self.account)
            .map_err(|e| KeyError::Keyring(e.to_string()))?;

        match entry.get_password() {
            Ok(secret) => decode_key(&secret),
            // Only a missing entry may be replaced; any other failure would
            // orphan the data encrypted under the existing key.
            Err(keyring::Error::NoEntry) => {
                let material = generate_key();
                entry
                    .set_password(&encode_key(&material))
                    .map_err(|e| KeyError::Keyring(e.to_string()))?;
                Ok(material)
            }
            Err(err) => Err(KeyError::Keyring(err.to_string())),
        }
    }
}

/// In-memory key provider for tests and ephemeral sessions.
#[derive(Debug, Default, Clone)]
pub struct InMemoryKeyProvider {
    inner: Arc<Mutex<Option<MasterKey>>>,
}

impl KeyProvider for InMemoryKeyProvider {
    fn get_or_create(&self) -> Result<MasterKey, KeyError> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|err| KeyError::Generation(format!("lock poisoned: {err}")))?;

        if let Some(existing) = guard.clone() {
            return Ok(existing);
        }

        let material = generate_key();
        *guard = Some(material.clone());
        Ok(material)
    }
}

fn generate_key() -> MasterKey {
    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    MasterKey {
        id: "default".to_string(),
        scheme: KeyScheme::Aes256Gcm,
        bytes,
    }
}

fn encode_key(material: &MasterKey) -> String {
    general_purpose::STANDARD.encode(material.bytes)
}

fn decode_key(secret: &str) -> Result<MasterKey, KeyError> {
    let mut bytes = general_purpose::STANDARD
        .decode(secret)
        .map_err(|e| KeyError::Decode(e.to_string()))?;

    if bytes.len() != 32 {
        let len = bytes.len();
        bytes.zeroize();
        return Err(KeyError::Decode(format!("expected 32 bytes, got {len}")));
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(MasterKey {
        id: "default".to_string(),
        scheme: KeyScheme::Aes256Gcm,
        bytes: out,
    })
}
