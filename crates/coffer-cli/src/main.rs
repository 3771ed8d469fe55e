mod cli;
mod config;
mod prefs;
mod storage;
mod upload;

use crate::cli::ConfigCommand;
use clap::Parser;
use coffer_core::storage::PrefsBackend;
use coffer_prefs::{SecurePrefs, SecurePrefsCell};
use coffer_storage::encrypted_prefs::EncryptedPrefsFile;
use color_eyre::Result;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Entry point wiring the CLI to the encrypted store and uploader.
#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    let cli = cli::Cli::parse();
    let config = config::load()?;
    match cli.command {
        cli::Command::Version => print_version(),
        cli::Command::Health => run_health_check(&config)?,
        cli::Command::Config(ConfigCommand::Init) => init_config(&config)?,
        cli::Command::Prefs(cmd) => prefs::handle(cmd, &config)?,
        cli::Command::Upload {
            file,
            url,
            content_type,
        } => upload::run(&file, url, content_type, &config).await?,
    }

    Ok(())
}

fn init_tracing() {
    // Respect user-provided filters, default to info to avoid noisy stdout.
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn print_version() {
    println!("coffer {}", env!("CARGO_PKG_VERSION"));
}

/// Runs a quick health check of the encrypted store.
fn run_health_check(config: &config::Config) -> Result<()> {
    let cell = SecurePrefsCell::<EncryptedPrefsFile>::new();
    let prefs = storage::open(&cell, &storage::context_from_config(config)?)?;
    run_store_health(prefs.as_ref())?;
    println!("Storage: ok ({})", prefs.backend().path().display());
    Ok(())
}

fn run_store_health<B: PrefsBackend>(prefs: &SecurePrefs<B>) -> Result<()> {
    let probe_key = "health/probe";
    let payload = "ok";
    prefs
        .put_string(probe_key, payload)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    let round_trip = prefs
        .get_string(probe_key, "")
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;
    prefs
        .remove(probe_key)
        .map_err(|e| color_eyre::eyre::eyre!(e.to_string()))?;

    if round_trip != payload {
        color_eyre::eyre::bail!("storage round-trip failed");
    }
    Ok(())
}

fn init_config(config: &config::Config) -> Result<()> {
    let path = config::write_default_if_missing(config)?;
    println!("Config initialized at {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_check_with_test_store_succeeds() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cell = SecurePrefsCell::<EncryptedPrefsFile>::new();
        let prefs = storage::open(&cell, &storage::test_context(dir.path())).expect("open");

        run_store_health(prefs.as_ref()).expect("health check should succeed");
        assert!(!prefs.contains("health/probe").expect("contains"));
        assert!(prefs.backend().path().exists());
    }
}
