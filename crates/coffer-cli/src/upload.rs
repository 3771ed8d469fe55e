use std::path::Path;

use coffer_core::storage::PrefsBackend;
use coffer_prefs::{SecurePrefs, SecurePrefsCell};
use coffer_storage::encrypted_prefs::EncryptedPrefsFile;
use coffer_transfer::{upload::Uploader, FileBody, PercentProgress, TrackedBody};
use color_eyre::{
    eyre::{bail, eyre},
    Result,
};
use tracing::info;

use crate::{config, storage};

/// Upload `file` to the configured endpoint, printing whole-percent progress.
pub async fn run(
    file: &Path,
    url: Option<String>,
    content_type: Option<String>,
    config: &config::Config,
) -> Result<()> {
    let endpoint = resolve_endpoint(url, config)?;
    let cell = SecurePrefsCell::<EncryptedPrefsFile>::new();
    let prefs = storage::open(&cell, &storage::context_from_config(config)?)?;
    let token = auth_token(prefs.as_ref(), config.token_key())?;

    let producer = FileBody::open(file, content_type.as_deref())
        .map_err(|e| eyre!("cannot read {}: {e}", file.display()))?;
    let file_name = producer
        .file_name()
        .map(str::to_string)
        .ok_or_else(|| eyre!("{} has no usable file name", file.display()))?;
    let progress = PercentProgress::new(|percent| eprintln!("uploaded {percent}%"));
    let body = TrackedBody::with_listener(producer, progress);
    info!(path = %body.inner().path().display(), "uploading");
    let receipt = Uploader::new(endpoint)
        .upload(body, &file_name, &token)
        .await
        .map_err(|e| eyre!("{e:#}"))?;

    println!("Uploaded {} ({} bytes)", receipt.file_name, receipt.file_size);
    println!("{}", receipt.file_url);
    Ok(())
}

fn resolve_endpoint(url: Option<String>, config: &config::Config) -> Result<String> {
    url.or_else(|| config.upload_endpoint().map(str::to_string))
        .ok_or_else(|| eyre!("no upload endpoint; pass --url or set [upload].endpoint"))
}

/// Read the bearer token from the store; an absent or empty token is an error.
fn auth_token<B: PrefsBackend>(prefs: &SecurePrefs<B>, key: &str) -> Result<String> {
    let token = prefs
        .get_string(key, "")
        .map_err(|e| eyre!(e.to_string()))?;
    if token.is_empty() {
        bail!("no auth token stored; run `coffer prefs set {key} <token>`");
    }
    Ok(token)
}
