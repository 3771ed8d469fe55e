use std::{
    collections::{BTreeMap, BTreeSet},
    sync::Mutex,
};

use coffer_core::storage::{BackendError, PrefValue, PrefsBackend, PrefsEdit};
use tracing::{debug, instrument};

/// Typed accessors over an encrypted [`PrefsBackend`].
///
/// Reads never fail for a missing key or a key stored under another kind; the
/// caller's default is returned instead. Backend faults are passed through
/// unchanged.
///
/// All mutations through one handle are serialized by a store-wide edit lock,
/// which makes [`SecurePrefs::remove_by_prefix`] atomic with respect to other
/// writers on the same handle.
pub struct SecurePrefs<B: PrefsBackend> {
    backend: B,
    edit_lock: Mutex<()>,
}

impl<B: PrefsBackend> SecurePrefs<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            edit_lock: Mutex::new(()),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn get(&self, key: &str) -> Result<Option<PrefValue>, BackendError> {
        self.backend.get(key)
    }

    pub fn contains(&self, key: &str) -> Result<bool, BackendError> {
        self.backend.contains(key)
    }

    pub fn get_string(&self, key: &str, default: &str) -> Result<String, BackendError> {
        self.get_typed(key, default.to_string(), PrefValue::into_string)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> Result<bool, BackendError> {
        self.get_typed(key, default, |v| v.as_bool())
    }

    pub fn get_int(&self, key: &str, default: i32) -> Result<i32, BackendError> {
        self.get_typed(key, default, |v| v.as_int())
    }

    pub fn get_long(&self, key: &str, default: i64) -> Result<i64, BackendError> {
        self.get_typed(key, default, |v| v.as_long())
    }

    pub fn get_float(&self, key: &str, default: f32) -> Result<f32, BackendError> {
        self.get_typed(key, default, |v| v.as_float())
    }

    pub fn get_string_set(
        &self,
        key: &str,
        default: BTreeSet<String>,
    ) -> Result<BTreeSet<String>, BackendError> {
        self.get_typed(key, default, PrefValue::into_string_set)
    }

    pub fn put_string(&self, key: &str, value: impl Into<String>) -> Result<(), BackendError> {
        self.put(key, PrefValue::String(value.into()))
    }

    pub fn put_bool(&self, key: &str, value: bool) -> Result<(), BackendError> {
        self.put(key, PrefValue::Bool(value))
    }

    pub fn put_int(&self, key: &str, value: i32) -> Result<(), BackendError> {
        self.put(key, PrefValue::Int(value))
    }

    pub fn put_long(&self, key: &str, value: i64) -> Result<(), BackendError> {
        self.put(key, PrefValue::Long(value))
    }

    pub fn put_float(&self, key: &str, value: f32) -> Result<(), BackendError> {
        self.put(key, PrefValue::Float(value))
    }

    pub fn put_string_set(&self, key: &str, value: BTreeSet<String>) -> Result<(), BackendError> {
        self.put(key, PrefValue::StringSet(value))
    }

    /// Write any value, replacing whatever kind was stored under `key` before.
    pub fn put(&self, key: &str, value: PrefValue) -> Result<(), BackendError> {
        self.commit(PrefsEdit::new().put(key, value))
    }

    pub fn remove(&self, key: &str) -> Result<(), BackendError> {
        self.commit(PrefsEdit::new().remove(key))
    }

    /// Remove every key starting with `prefix` in one batched edit.
    /// Returns how many entries were removed.
    #[instrument(skip(self))]
    pub fn remove_by_prefix(&self, prefix: &str) -> Result<usize, BackendError> {
        let _guard = self.lock()?;
        let snapshot = self.backend.get_all()?;

        let mut edit = PrefsEdit::new();
        let mut removed = 0;
        for key in snapshot.keys().filter(|k| k.starts_with(prefix)) {
            edit = edit.remove(key.as_str());
            removed += 1;
        }

        self.backend.commit(edit)?;
        debug!(removed, "removed entries by prefix");
        Ok(removed)
    }

    pub fn clear(&self) -> Result<(), BackendError> {
        self.commit(PrefsEdit::new().clear())
    }

    /// Snapshot of every entry; later writes are not reflected in it.
    pub fn get_all(&self) -> Result<BTreeMap<String, PrefValue>, BackendError> {
        self.backend.get_all()
    }

    /// Start a batched edit; apply it with [`SecurePrefs::commit`].
    pub fn edit(&self) -> PrefsEdit {
        PrefsEdit::new()
    }

    pub fn commit(&self, edit: PrefsEdit) -> Result<(), BackendError> {
        let _guard = self.lock()?;
        self.backend.commit(edit)
    }

    fn get_typed<T>(
        &self,
        key: &str,
        default: T,
        extract: impl FnOnce(PrefValue) -> Option<T>,
    ) -> Result<T, BackendError> {
        let Some(value) = self.backend.get(key)? else {
            return Ok(default);
        };
        let kind = value.kind();
        match extract(value) {
            Some(found) => Ok(found),
            None => {
                debug!(key, stored = %kind, "stored kind differs from requested, using default");
                Ok(default)
            }
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, BackendError> {
        self.edit_lock.lock().map_err(|err| BackendError::Poisoned {
            reason: err.to_string(),
        })
    }
}
