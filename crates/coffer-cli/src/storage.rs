use std::{path::PathBuf, sync::Arc};

use crate::config::Config;
use coffer_prefs::{PrefsContext, SecurePrefs, SecurePrefsCell};
use coffer_storage::{
    encrypted_prefs::{EncryptedPrefsFile, DEFAULT_NAMESPACE},
    key_provider::{KeyProvider, KeyringProvider},
};
use color_eyre::Result;
use dirs::data_dir;
use tracing::debug;

const KEYRING_SERVICE: &str = "coffer";
const KEYRING_ACCOUNT: &str = "master-key";

pub type Prefs = Arc<SecurePrefs<EncryptedPrefsFile>>;

/// Resolve the default data directory for Coffer.
pub fn default_data_dir() -> Result<PathBuf> {
    let base = data_dir().ok_or_else(|| color_eyre::eyre::eyre!("no data dir available"))?;
    Ok(base.join("coffer"))
}

/// Build the store context from config overrides, keyed by the OS keychain.
pub fn context_from_config(config: &Config) -> Result<PrefsContext<KeyringProvider>> {
    let root = match &config.data_dir {
        Some(root) => root.clone(),
        None => default_data_dir()?,
    };
    let namespace = config
        .namespace
        .clone()
        .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string());
    debug!(?root, %namespace, "resolved encrypted store location");

    Ok(PrefsContext::new(root, KeyringProvider::new(KEYRING_SERVICE, KEYRING_ACCOUNT))
        .with_namespace(namespace))
}

/// Initialize the store in `cell`; initialization failures are fatal for the command.
pub fn open<P: KeyProvider>(
    cell: &SecurePrefsCell<EncryptedPrefsFile>,
    ctx: &PrefsContext<P>,
) -> Result<Prefs> {
    cell.initialize(ctx)
        .map_err(|e| color_eyre::eyre::eyre!("failed to initialize encrypted store: {e}"))
}

/// Helper for tests to construct a context rooted at a temp dir with an in-memory key.
#[cfg(test)]
pub fn test_context(
    root: impl Into<PathBuf>,
) -> PrefsContext<coffer_storage::key_provider::InMemoryKeyProvider> {
    PrefsContext::new(root, coffer_storage::key_provider::InMemoryKeyProvider::default())
}
