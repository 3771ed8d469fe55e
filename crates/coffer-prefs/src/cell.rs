use std::{
    path::PathBuf,
    sync::{Arc, OnceLock},
};

use coffer_core::storage::{PrefsBackend, StoreInitializationError};
use coffer_storage::{
    encrypted_prefs::{EncryptedPrefsFile, DEFAULT_NAMESPACE},
    key_provider::KeyProvider,
};
use tracing::{debug, error};

use crate::SecurePrefs;

/// Platform inputs needed to open the encrypted store.
pub struct PrefsContext<P: KeyProvider> {
    pub data_dir: PathBuf,
    pub namespace: String,
    pub key_provider: P,
}

impl<P: KeyProvider> PrefsContext<P> {
    pub fn new(data_dir: impl Into<PathBuf>, key_provider: P) -> Self {
        Self {
            data_dir: data_dir.into(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            key_provider,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

type InitResult<B> = Result<Arc<SecurePrefs<B>>, StoreInitializationError>;

/// Caller-owned slot that creates a [`SecurePrefs`] handle exactly once.
///
/// Concurrent first calls are serialized: one opener runs, every caller sees
/// its outcome. A failure is kept too, so all callers observe the same fatal
/// error instead of racing to retry. Build a new cell to try again.
pub struct SecurePrefsCell<B: PrefsBackend> {
    slot: OnceLock<InitResult<B>>,
}

impl<B: PrefsBackend> Default for SecurePrefsCell<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: PrefsBackend> SecurePrefsCell<B> {
    pub const fn new() -> Self {
        Self {
            slot: OnceLock::new(),
        }
    }

    /// Run `open` if no handle exists yet; otherwise return the existing outcome.
    pub fn initialize_with<F>(&self, open: F) -> InitResult<B>
    where
        F: FnOnce() -> Result<B, StoreInitializationError>,
    {
        self.slot
            .get_or_init(|| match open() {
                Ok(backend) => {
                    debug!("secure preferences initialized");
                    Ok(Arc::new(SecurePrefs::new(backend)))
                }
                Err(err) => {
                    error!(error = %err, "secure preferences initialization failed");
                    Err(err)
                }
            })
            .clone()
    }

    /// The handle, if initialization has already succeeded.
    pub fn get(&self) -> Option<Arc<SecurePrefs<B>>> {
        self.slot.get().and_then(|res| res.as_ref().ok().cloned())
    }

    pub fn is_initialized(&self) -> bool {
        self.get().is_some()
    }
}

impl SecurePrefsCell<EncryptedPrefsFile> {
    /// Open the AES-SIV/AES-GCM file store described by `ctx`. Idempotent.
    pub fn initialize<P: KeyProvider>(
        &self,
        ctx: &PrefsContext<P>,
    ) -> InitResult<EncryptedPrefsFile> {
        self.initialize_with(|| {
            EncryptedPrefsFile::open(&ctx.data_dir, &ctx.namespace, &ctx.key_provider)
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use coffer_core::storage::InMemoryPrefsBackend;
    use coffer_storage::key_provider::InMemoryKeyProvider;

    use super::*;

    #[test]
    fn initialize_twice_returns_same_handle() {
        let cell = SecurePrefsCell::new();
        let first = cell
            .initialize_with(|| Ok(InMemoryPrefsBackend::new()))
            .expect("first init");
        first.put_string("k", "v").unwrap();

        let second = cell
            .initialize_with(|| Ok(InMemoryPrefsBackend::new()))
            .expect("second init");

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.get_string("k", "").unwrap(), "v");
    }

    #[test]
    fn concurrent_first_calls_run_opener_once() {
        let cell = Arc::new(SecurePrefsCell::new());
        let opened = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cell = Arc::clone(&cell);
                let opened = Arc::clone(&opened);
                thread::spawn(move || {
                    cell.initialize_with(|| {
                        opened.fetch_add(1, Ordering::SeqCst);
                        Ok(InMemoryPrefsBackend::new())
                    })
                    .expect("init")
                })
            })
            .collect();

        let prefs: Vec<_> = handles
            .into_iter()
            .map(|h| h.join().expect("thread"))
            .collect();

        assert_eq!(opened.load(Ordering::SeqCst), 1);
        assert!(prefs.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn failure_is_reported_to_every_caller() {
        let cell: SecurePrefsCell<InMemoryPrefsBackend> = SecurePrefsCell::new();
        let err = cell
            .initialize_with(|| {
                Err(StoreInitializationError::MasterKey {
                    reason: "keystore locked".into(),
                })
            })
            .err()
            .expect("first call fails");

        let again = cell
            .initialize_with(|| Ok(InMemoryPrefsBackend::new()))
            .err()
            .expect("failure is sticky");

        assert_eq!(err, again);
        assert!(!cell.is_initialized());
        assert!(cell.get().is_none());
    }

    #[test]
    fn get_before_initialize_is_none() {
        let cell: SecurePrefsCell<InMemoryPrefsBackend> = SecurePrefsCell::default();
        assert!(cell.get().is_none());
    }

    #[test]
    fn initializes_encrypted_file_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let provider = InMemoryKeyProvider::default();
        let ctx = PrefsContext::new(dir.path(), provider.clone());

        let cell: SecurePrefsCell<EncryptedPrefsFile> = SecurePrefsCell::new();
        let prefs = cell.initialize(&ctx).expect("init");
        prefs.put_string("my_number", "+351900000000").unwrap();
        let again = cell.initialize(&ctx).expect("idempotent");
        assert!(Arc::ptr_eq(&prefs, &again));
        assert!(dir.path().join("secure_prefs.json").exists());

        // A fresh cell over the same directory and key sees persisted data.
        let reopened = SecurePrefsCell::<EncryptedPrefsFile>::new()
            .initialize(&PrefsContext::new(dir.path(), provider))
            .expect("reopen");
        assert_eq!(
            reopened.get_string("my_number", "").unwrap(),
            "+351900000000"
        );
    }

    #[test]
    fn custom_namespace_uses_its_own_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let ctx = PrefsContext::new(dir.path(), InMemoryKeyProvider::default())
            .with_namespace("session_prefs");

        let prefs = SecurePrefsCell::<EncryptedPrefsFile>::new()
            .initialize(&ctx)
            .expect("init");
        prefs.put_bool("seen_intro", true).unwrap();

        assert!(dir.path().join("session_prefs.json").exists());
    }
}
