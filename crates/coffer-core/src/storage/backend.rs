use std::{
    collections::BTreeMap,
    sync::{Arc, RwLock},
};

use super::{BackendError, PrefValue, PrefsEdit};

/// Contract for an encrypted-at-rest key/value preference table.
///
/// Implementations encrypt both keys and values; callers only ever see
/// cleartext [`PrefValue`]s. Construction faults belong to the implementation's
/// constructor, everything here is a steady-state [`BackendError`].
pub trait PrefsBackend: Send + Sync {
    /// Retrieve the value stored under `key`, if any.
    fn get(&self, key: &str) -> Result<Option<PrefValue>, BackendError>;

    /// Whether `key` is present.
    fn contains(&self, key: &str) -> Result<bool, BackendError> {
        Ok(self.get(key)?.is_some())
    }

    /// Point-in-time copy of every entry.
    fn get_all(&self) -> Result<BTreeMap<String, PrefValue>, BackendError>;

    /// Apply a batched edit. Either the whole edit is visible afterwards or none of it.
    fn commit(&self, edit: PrefsEdit) -> Result<(), BackendError>;
}

/// In-memory backend that simulates encryption for tests and smoke runs.
/// This is not cryptographically secure; production code uses the AES-SIV/AES-GCM
/// file backend with a keyring-held master key.
#[derive(Debug, Default, Clone)]
pub struct InMemoryPrefsBackend {
    inner: Arc<RwLock<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl InMemoryPrefsBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PrefsBackend for InMemoryPrefsBackend {
    fn get(&self, key: &str) -> Result<Option<PrefValue>, BackendError> {
        let map = self.inner.read().map_err(|err| BackendError::Poisoned {
            reason: err.to_string(),
        })?;

        map.get(&mask(key.as_bytes()))
            .map(|masked| decode_value(masked))
            .transpose()
    }

    fn get_all(&self) -> Result<BTreeMap<String, PrefValue>, BackendError> {
        let map = self.inner.read().map_err(|err| BackendError::Poisoned {
            reason: err.to_string(),
        })?;

        map.iter()
            .map(|(k, v)| Ok((decode_key(k)?, decode_value(v)?)))
            .collect()
    }

    fn commit(&self, edit: PrefsEdit) -> Result<(), BackendError> {
        let mut map = self.inner.write().map_err(|err| BackendError::Poisoned {
            reason: err.to_string(),
        })?;

        // Decode, apply, re-encode: keeps the edit semantics in one place.
        let mut entries = map
            .iter()
            .map(|(k, v)| Ok((decode_key(k)?, decode_value(v)?)))
            .collect::<Result<BTreeMap<_, _>, BackendError>>()?;
        edit.apply_to(&mut entries);

        let mut masked = BTreeMap::new();
        for (key, value) in &entries {
            masked.insert(mask(key.as_bytes()), encode_value(value)?);
        }
        *map = masked;
        Ok(())
    }
}

const MASK_BYTE: u8 = 0xA5;

fn mask(input: &[u8]) -> Vec<u8> {
    input.iter().map(|b| b ^ MASK_BYTE).collect()
}

fn encode_value(value: &PrefValue) -> Result<Vec<u8>, BackendError> {
    let json = serde_json::to_vec(value).map_err(|e| BackendError::Encoding {
        reason: e.to_string(),
    })?;
    Ok(mask(&json))
}

fn decode_value(masked: &[u8]) -> Result<PrefValue, BackendError> {
    serde_json::from_slice(&mask(masked)).map_err(|e| BackendError::Encoding {
        reason: e.to_string(),
    })
}

fn decode_key(masked: &[u8]) -> Result<String, BackendError> {
    String::from_utf8(mask(masked)).map_err(|e| BackendError::Encoding {
        reason: e.to_string(),
    })
}
