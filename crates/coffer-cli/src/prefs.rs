use std::{collections::BTreeSet, io::Write};

use coffer_core::storage::{PrefKind, PrefValue, PrefsBackend};
use coffer_prefs::{SecurePrefs, SecurePrefsCell};
use coffer_storage::encrypted_prefs::EncryptedPrefsFile;
use color_eyre::{eyre::eyre, Result};

use crate::{cli::PrefsCommand, config, storage};

/// Execute a prefs subcommand against the encrypted store.
pub fn handle(cmd: PrefsCommand, config: &config::Config) -> Result<()> {
    let cell = SecurePrefsCell::<EncryptedPrefsFile>::new();
    let prefs = storage::open(&cell, &storage::context_from_config(config)?)?;
    let stdout = std::io::stdout();
    run(cmd, prefs.as_ref(), &mut stdout.lock())
}

fn run<B: PrefsBackend>(
    cmd: PrefsCommand,
    prefs: &SecurePrefs<B>,
    out: &mut impl Write,
) -> Result<()> {
    match cmd {
        PrefsCommand::List => {
            let entries = prefs.get_all().map_err(|e| eyre!(e.to_string()))?;
            if entries.is_empty() {
                writeln!(out, "No entries yet. Add one with `coffer prefs set <key> <value>`.")?;
                return Ok(());
            }
            for (key, value) in entries {
                writeln!(out, "{key} [{}] {value}", value.kind())?;
            }
        }
        PrefsCommand::Get { key } => match prefs.get(&key).map_err(|e| eyre!(e.to_string()))? {
            Some(value) => writeln!(out, "{value}")?,
            None => color_eyre::eyre::bail!("no entry for {key}"),
        },
        PrefsCommand::Set { key, value, kind } => {
            let value = parse_value(kind.into(), &value)?;
            let kind = value.kind();
            prefs.put(&key, value).map_err(|e| eyre!(e.to_string()))?;
            writeln!(out, "Stored {key} [{kind}]")?;
        }
        PrefsCommand::Rm { key } => {
            prefs.remove(&key).map_err(|e| eyre!(e.to_string()))?;
            writeln!(out, "Removed {key}")?;
        }
        PrefsCommand::RmPrefix { prefix } => {
            let removed = prefs
                .remove_by_prefix(&prefix)
                .map_err(|e| eyre!(e.to_string()))?;
            writeln!(out, "Removed {removed} entries starting with {prefix:?}")?;
        }
        PrefsCommand::Clear => {
            prefs.clear().map_err(|e| eyre!(e.to_string()))?;
            writeln!(out, "Cleared all entries")?;
        }
    }

    Ok(())
}

/// Parse a command-line value into the requested kind.
fn parse_value(kind: PrefKind, raw: &str) -> Result<PrefValue> {
    let value = match kind {
        PrefKind::String => PrefValue::String(raw.to_string()),
        PrefKind::Bool => PrefValue::Bool(
            raw.parse()
                .map_err(|_| eyre!("expected true or false, got {raw:?}"))?,
        ),
        PrefKind::Int => {
            PrefValue::Int(raw.parse().map_err(|e| eyre!("invalid int {raw:?}: {e}"))?)
        }
        PrefKind::Long => {
            PrefValue::Long(raw.parse().map_err(|e| eyre!("invalid long {raw:?}: {e}"))?)
        }
        PrefKind::Float => {
            PrefValue::Float(raw.parse().map_err(|e| eyre!("invalid float {raw:?}: {e}"))?)
        }
        PrefKind::StringSet => PrefValue::StringSet(
            raw.split(',')
                .map(str::trim)
                .filter(|item| !item.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
        ),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use coffer_core::storage::InMemoryPrefsBackend;

    fn run_to_string<B: PrefsBackend>(cmd: PrefsCommand, prefs: &SecurePrefs<B>) -> String {
        let mut out = Vec::new();
        run(cmd, prefs, &mut out).expect("command should succeed");
        String::from_utf8(out).expect("utf8 output")
    }

    #[test]
    fn parses_each_kind() {
        assert_eq!(
            parse_value(PrefKind::Bool, "true").expect("bool"),
            PrefValue::Bool(true)
        );
        assert_eq!(
            parse_value(PrefKind::Int, "-7").expect("int"),
            PrefValue::Int(-7)
        );
        assert_eq!(
            parse_value(PrefKind::Long, "9000000000").expect("long"),
            PrefValue::Long(9_000_000_000)
        );
        assert_eq!(
            parse_value(PrefKind::Float, "1.5").expect("float"),
            PrefValue::Float(1.5)
        );
        assert_eq!(
            parse_value(PrefKind::StringSet, "b, a,,a").expect("set"),
            PrefValue::StringSet(["a".to_string(), "b".to_string()].into())
        );
        assert_eq!(
            parse_value(PrefKind::String, "+1555").expect("string"),
            PrefValue::String("+1555".into())
        );
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(parse_value(PrefKind::Bool, "yes").is_err());
        assert!(parse_value(PrefKind::Int, "3000000000").is_err());
        assert!(parse_value(PrefKind::Float, "fast").is_err());
    }

    #[test]
    fn set_then_list_shows_kind_and_value() {
        let prefs = SecurePrefs::new(InMemoryPrefsBackend::new());
        run_to_string(
            PrefsCommand::Set {
                key: "logged_in".into(),
                value: "true".into(),
                kind: crate::cli::KindArg::Bool,
            },
            &prefs,
        );
        run_to_string(
            PrefsCommand::Set {
                key: "my_number".into(),
                value: "+1555".into(),
                kind: crate::cli::KindArg::String,
            },
            &prefs,
        );

        let listed = run_to_string(PrefsCommand::List, &prefs);
        assert_eq!(listed, "logged_in [bool] true\nmy_number [string] +1555\n");
    }

    #[test]
    fn infinite_float_can_be_stored_and_read() {
        let prefs = SecurePrefs::new(InMemoryPrefsBackend::new());
        run_to_string(
            PrefsCommand::Set {
                key: "ratio".into(),
                value: "inf".into(),
                kind: crate::cli::KindArg::Float,
            },
            &prefs,
        );
        prefs.put_string("other", "x").expect("later put");

        let out = run_to_string(PrefsCommand::Get { key: "ratio".into() }, &prefs);
        assert_eq!(out, "inf\n");
    }

    #[test]
    fn rm_prefix_reports_count() {
        let prefs = SecurePrefs::new(InMemoryPrefsBackend::new());
        prefs.put_string("chat.1", "a").expect("put");
        prefs.put_string("chat.2", "b").expect("put");
        prefs.put_string("auth_token", "t").expect("put");

        let out = run_to_string(
            PrefsCommand::RmPrefix {
                prefix: "chat.".into(),
            },
            &prefs,
        );
        assert!(out.starts_with("Removed 2 entries"));
        assert_eq!(prefs.get_all().expect("all").len(), 1);
    }

    #[test]
    fn get_missing_key_is_an_error() {
        let prefs = SecurePrefs::new(InMemoryPrefsBackend::new());
        let mut out = Vec::new();
        assert!(run(PrefsCommand::Get { key: "nope".into() }, &prefs, &mut out).is_err());
    }

    #[test]
    fn empty_list_prints_hint() {
        let prefs = SecurePrefs::new(InMemoryPrefsBackend::new());
        let out = run_to_string(PrefsCommand::List, &prefs);
        assert!(out.starts_with("No entries yet"));
    }
}
