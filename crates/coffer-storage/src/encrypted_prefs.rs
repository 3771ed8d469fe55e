use std::{
    collections::BTreeMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::RwLock,
};

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
    Aes256Gcm, Nonce,
};
use aes_siv::Aes256SivAead;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use coffer_core::storage::{
    BackendError, PrefValue, PrefsBackend, PrefsEdit, StoreInitializationError,
};
use hkdf::Hkdf;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tempfile::NamedTempFile;
use tracing::{debug, instrument, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::key_provider::{KeyProvider, MasterKey};

/// Namespace used when the caller does not pick one.
pub const DEFAULT_NAMESPACE: &str = "secure_prefs";

const FILE_VERSION: u32 = 1;
const GCM_NONCE_LEN: usize = 12;
const KEY_CHANNEL_INFO: &str = "encrypt preference keys";
const VALUE_CHANNEL_INFO: &str = "encrypt preference values";

/// Encrypted preference table persisted as a single JSON file.
///
/// Keys are sealed deterministically with AES-256-SIV so lookups stay stable,
/// values with AES-256-GCM bound to their sealed key. The whole table is held
/// decrypted in memory after [`EncryptedPrefsFile::open`].
pub struct EncryptedPrefsFile {
    path: PathBuf,
    namespace: String,
    keys: ChannelKeys,
    entries: RwLock<BTreeMap<String, PrefValue>>,
}

#[derive(Zeroize, ZeroizeOnDrop)]
struct ChannelKeys {
    siv: [u8; 64],
    gcm: [u8; 32],
}

#[derive(Debug, Serialize, Deserialize)]
struct StoredFile {
    version: u32,
    entries: BTreeMap<String, String>,
}

impl EncryptedPrefsFile {
    /// Open (or create) the table `<root>/<namespace>.json`.
    ///
    /// Every persisted entry is decrypted up front, so a wrong master key or a
    /// tampered file fails here rather than on first read.
    pub fn open<P: KeyProvider + ?Sized>(
        root: impl Into<PathBuf>,
        namespace: &str,
        key_provider: &P,
    ) -> Result<Self, StoreInitializationError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| StoreInitializationError::Io {
            reason: format!("create {}: {e}", root.display()),
        })?;

        let master = key_provider.get_or_create()?;
        let keys = derive_channel_keys(&master, namespace)?;

        let mut store = Self {
            path: root.join(format!("{namespace}.json")),
            namespace: namespace.to_string(),
            keys,
            entries: RwLock::new(BTreeMap::new()),
        };

        let entries = store.load()?;
        debug!(
            path = ?store.path,
            entries = entries.len(),
            key_id = %master.id,
            "opened encrypted preferences"
        );
        store.entries = RwLock::new(entries);
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, PrefValue>, StoreInitializationError> {
        let Some(stored) = read_file(&self.path)? else {
            return Ok(BTreeMap::new());
        };

        if stored.version != FILE_VERSION {
            return Err(StoreInitializationError::Corrupt {
                reason: format!("unsupported file version {}", stored.version),
            });
        }

        let mut entries = BTreeMap::new();
        for (sealed_key, sealed_value) in &stored.entries {
            let key = self
                .open_key(sealed_key)
                .map_err(|reason| StoreInitializationError::Crypto { reason })?;
            let value = self
                .open_value(sealed_key, sealed_value)
                .map_err(|reason| StoreInitializationError::Crypto { reason })?;
            entries.insert(key, value);
        }
        Ok(entries)
    }

    fn persist(&self, entries: &BTreeMap<String, PrefValue>) -> Result<(), BackendError> {
        let mut sealed = BTreeMap::new();
        for (key, value) in entries {
            let sealed_key = self
                .seal_key(key)
                .map_err(|reason| BackendError::Crypto { reason })?;
            let sealed_value = self.seal_value(&sealed_key, value)?;
            sealed.insert(sealed_key, sealed_value);
        }

        let stored = StoredFile {
            version: FILE_VERSION,
            entries: sealed,
        };
        write_file(&self.path, &stored)
    }

    fn seal_key(&self, key: &str) -> Result<String, String> {
        let cipher = Aes256SivAead::new_from_slice(&self.keys.siv)
            .map_err(|e| format!("key cipher init failed: {e}"))?;
        // SIV is deterministic: a fixed nonce keeps equal keys mapping to equal ciphertexts.
        let nonce = aes_siv::Nonce::default();
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: key.as_bytes(),
                    aad: self.namespace.as_bytes(),
                },
            )
            .map_err(|e| format!("key encrypt failed: {e}"))?;
        Ok(URL_SAFE_NO_PAD.encode(ciphertext))
    }

    fn open_key(&self, sealed: &str) -> Result<String, String> {
        let ciphertext = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|e| format!("key decode failed: {e}"))?;
        let cipher = Aes256SivAead::new_from_slice(&self.keys.siv)
            .map_err(|e| format!("key cipher init failed: {e}"))?;
        let nonce = aes_siv::Nonce::default();
        let plaintext = cipher
            .decrypt(
                &nonce,
                Payload {
                    msg: &ciphertext,
                    aad: self.namespace.as_bytes(),
                },
            )
            .map_err(|e| format!("key decrypt failed: {e}"))?;
        String::from_utf8(plaintext).map_err(|e| format!("key is not utf-8: {e}"))
    }

    fn seal_value(&self, sealed_key: &str, value: &PrefValue) -> Result<String, BackendError> {
        let json = serde_json::to_vec(value).map_err(|e| BackendError::Encoding {
            reason: e.to_string(),
        })?;
        let cipher =
            build_value_cipher(&self.keys).map_err(|reason| BackendError::Crypto { reason })?;
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: &json,
                    aad: sealed_key.as_bytes(),
                },
            )
            .map_err(|e| BackendError::Crypto {
                reason: format!("value encrypt failed: {e}"),
            })?;

        let mut blob = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(nonce.as_slice());
        blob.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(blob))
    }

    fn open_value(&self, sealed_key: &str, sealed: &str) -> Result<PrefValue, String> {
        let blob = URL_SAFE_NO_PAD
            .decode(sealed)
            .map_err(|e| format!("value decode failed: {e}"))?;
        if blob.len() < GCM_NONCE_LEN {
            return Err(format!("value too short: {} bytes", blob.len()));
        }
        let (nonce_bytes, ciphertext) = blob.split_at(GCM_NONCE_LEN);
        let cipher = build_value_cipher(&self.keys)?;
        let json = cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: sealed_key.as_bytes(),
                },
            )
            .map_err(|e| format!("value decrypt failed: {e}"))?;
        serde_json::from_slice(&json).map_err(|e| format!("value decode failed: {e}"))
    }
}

impl PrefsBackend for EncryptedPrefsFile {
    #[instrument(skip_all, fields(%key))]
    fn get(&self, key: &str) -> Result<Option<PrefValue>, BackendError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.get(key).cloned())
    }

    #[instrument(skip_all, fields(%key))]
    fn contains(&self, key: &str) -> Result<bool, BackendError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.contains_key(key))
    }

    #[instrument(skip_all)]
    fn get_all(&self) -> Result<BTreeMap<String, PrefValue>, BackendError> {
        let entries = self.entries.read().map_err(poisoned)?;
        Ok(entries.clone())
    }

    #[instrument(skip_all, fields(ops = edit.ops().len(), clear = edit.clears()))]
    fn commit(&self, edit: PrefsEdit) -> Result<(), BackendError> {
        if edit.is_empty() {
            return Ok(());
        }

        let mut entries = self.entries.write().map_err(poisoned)?;
        let previous = entries.clone();
        edit.apply_to(&mut entries);

        if let Err(err) = self.persist(&entries) {
            warn!(error = %err, "persist failed, rolling back edit");
            *entries = previous;
            return Err(err);
        }
        Ok(())
    }
}

fn derive_channel_keys(
    master: &MasterKey,
    namespace: &str,
) -> Result<ChannelKeys, StoreInitializationError> {
    let hk = Hkdf::<Sha256>::new(None, &master.bytes);
    let mut keys = ChannelKeys {
        siv: [0u8; 64],
        gcm: [0u8; 32],
    };

    let key_info = format!("{namespace}:{KEY_CHANNEL_INFO}");
    hk.expand(key_info.as_bytes(), &mut keys.siv)
        .map_err(|e| StoreInitializationError::Crypto {
            reason: format!("derive key-channel key: {e}"),
        })?;

    let value_info = format!("{namespace}:{VALUE_CHANNEL_INFO}");
    hk.expand(value_info.as_bytes(), &mut keys.gcm)
        .map_err(|e| StoreInitializationError::Crypto {
            reason: format!("derive value-channel key: {e}"),
        })?;

    Ok(keys)
}

fn build_value_cipher(keys: &ChannelKeys) -> Result<Aes256Gcm, String> {
    Aes256Gcm::new_from_slice(&keys.gcm).map_err(|e| format!("value cipher init failed: {e}"))
}

fn read_file(path: &Path) -> Result<Option<StoredFile>, StoreInitializationError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => {
            return Err(StoreInitializationError::Io {
                reason: format!("read {}: {err}", path.display()),
            })
        }
    };

    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|e| StoreInitializationError::Corrupt {
            reason: e.to_string(),
        })
}

fn write_file(path: &Path, stored: &StoredFile) -> Result<(), BackendError> {
    let parent = path.parent().ok_or_else(|| BackendError::Io {
        reason: "invalid storage path".to_string(),
    })?;
    fs::create_dir_all(parent).map_err(io_err)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(io_err)?;
    let json = serde_json::to_vec(stored).map_err(|e| BackendError::Encoding {
        reason: e.to_string(),
    })?;
    tmp.write_all(&json).map_err(io_err)?;
    tmp.flush().map_err(io_err)?;
    tmp.as_file().sync_all().map_err(io_err)?;
    tmp.persist(path).map_err(|e| io_err(e.error))?;
    Ok(())
}

fn io_err<E: ToString>(err: E) -> BackendError {
    BackendError::Io {
        reason: err.to_string(),
    }
}

fn poisoned<E: ToString>(err: E) -> BackendError {
    BackendError::Poisoned {
        reason: err.to_string(),
    }
}
