use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use coffer_core::storage::PrefKind;

/// CLI surface definition.
#[derive(Parser, Debug)]
#[command(
    name = "coffer",
    about = "Encrypted settings store and progress-tracked uploads",
    version,
    propagate_version = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print version and exit.
    Version,
    /// Run a health check against the encrypted store.
    Health,
    /// Manage CLI configuration.
    #[command(subcommand)]
    Config(ConfigCommand),
    /// Inspect or edit the encrypted settings store.
    #[command(subcommand)]
    Prefs(PrefsCommand),
    /// Upload a file with live progress, authenticated by the stored token.
    Upload {
        /// File to upload.
        file: PathBuf,
        /// Override the configured upload endpoint.
        #[arg(long)]
        url: Option<String>,
        /// Media type sent with the file part.
        #[arg(long)]
        content_type: Option<String>,
    },
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum ConfigCommand {
    /// Create a default config file if one does not exist.
    Init,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum PrefsCommand {
    /// List every entry with its kind.
    List,
    /// Print the value stored under a key.
    Get { key: String },
    /// Store a value, replacing any previous value and kind.
    Set {
        key: String,
        /// Value to store; for sets, a comma-separated list.
        value: String,
        #[arg(long, value_enum, default_value_t = KindArg::String)]
        kind: KindArg,
    },
    /// Remove a single key.
    Rm { key: String },
    /// Remove every key starting with a prefix.
    RmPrefix { prefix: String },
    /// Remove every entry.
    Clear,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KindArg {
    String,
    Bool,
    Int,
    Long,
    Float,
    Set,
}

impl From<KindArg> for PrefKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::String => PrefKind::String,
            KindArg::Bool => PrefKind::Bool,
            KindArg::Int => PrefKind::Int,
            KindArg::Long => PrefKind::Long,
            KindArg::Float => PrefKind::Float,
            KindArg::Set => PrefKind::StringSet,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_health_subcommand() {
        let cli = Cli::try_parse_from(["coffer", "health"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Health);
    }

    #[test]
    fn requires_a_subcommand() {
        assert!(Cli::try_parse_from(["coffer"]).is_err());
    }

    #[test]
    fn parses_config_init_subcommand() {
        let cli = Cli::try_parse_from(["coffer", "config", "init"]).expect("parse should succeed");
        assert_eq!(cli.command, Command::Config(ConfigCommand::Init));
    }

    #[test]
    fn parses_prefs_set_with_kind() {
        let cli = Cli::try_parse_from([
            "coffer",
            "prefs",
            "set",
            "last_event_id",
            "42",
            "--kind",
            "long",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Prefs(PrefsCommand::Set {
                key: "last_event_id".into(),
                value: "42".into(),
                kind: KindArg::Long,
            })
        );
    }

    #[test]
    fn prefs_set_defaults_to_string() {
        let cli = Cli::try_parse_from(["coffer", "prefs", "set", "my_number", "+1555"])
            .expect("parse should succeed");
        let Command::Prefs(PrefsCommand::Set { kind, .. }) = cli.command else {
            panic!("expected prefs set");
        };
        assert_eq!(kind, KindArg::String);
    }

    #[test]
    fn parses_prefs_rm_prefix() {
        let cli = Cli::try_parse_from(["coffer", "prefs", "rm-prefix", "chat."])
            .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Prefs(PrefsCommand::RmPrefix {
                prefix: "chat.".into()
            })
        );
    }

    #[test]
    fn parses_upload_with_overrides() {
        let cli = Cli::try_parse_from([
            "coffer",
            "upload",
            "photo.jpg",
            "--url",
            "https://files.example/upload",
            "--content-type",
            "image/jpeg",
        ])
        .expect("parse should succeed");
        assert_eq!(
            cli.command,
            Command::Upload {
                file: PathBuf::from("photo.jpg"),
                url: Some("https://files.example/upload".into()),
                content_type: Some("image/jpeg".into()),
            }
        );
    }
}
