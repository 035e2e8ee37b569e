#![deny(unsafe_code)]

mod common;
mod config;
mod constants;
mod error;
mod profile;

use std::io::{self, BufRead};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use common::dispatcher::dispatch;
use common::ipc::{JsonLines, Reply, ShellCommand};
use config::{AppPaths, ConfigStore};
use profile::ProfileLifecycleController;

type Output = Arc<JsonLines<io::Stdout>>;

#[derive(Parser)]
#[command(name = "studio-shell")]
#[command(version)]
#[command(about = "Profile and session-partition manager for the studio desktop shell", long_about = None)]
struct Cli {
    /// Directory holding config.json, Partitions/ and backups/
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Read JSON commands from stdin, one per line; replies and signals go to stdout
    Serve,
    /// Print the active profile's settings and the profile list
    Settings,
    /// Print the URL the window should open at launch
    StartUrl,
    /// Print the active profile's session partition directory
    Partition,
    /// Update settings of the active profile, e.g. `set language=ja enableDevTools=true`
    Set {
        #[arg(required = true, value_name = "KEY=VALUE")]
        pairs: Vec<String>,
    },
    /// List profiles
    List,
    Create {
        name: String,
    },
    Switch {
        identity: String,
    },
    Rename {
        old: String,
        new: String,
    },
    Delete {
        identity: String,
    },
    /// Delete the active profile's cookies and cache
    ResetSession,
    /// Manage config snapshots
    Backup {
        #[command(subcommand)]
        action: BackupAction,
    },
}

#[derive(Subcommand)]
enum BackupAction {
    Create,
    List,
    Restore {
        filename: String,
    },
    Delete {
        filename: String,
    },
    /// Remove old automatic snapshots
    Prune {
        /// How many automatic snapshots to keep
        #[arg(long)]
        keep: Option<u32>,
    },
}

/// `key=value` pairs; values that parse as JSON are taken as JSON, anything
/// else as a plain string
fn parse_pairs(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut settings = Map::new();
    for pair in pairs {
        let Some((key, raw)) = pair.split_once('=') else {
            bail!("Expected KEY=VALUE, got {:?}", pair);
        };
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
        settings.insert(key.trim().to_string(), value);
    }
    Ok(settings)
}

fn to_shell_command(command: Command) -> Result<ShellCommand> {
    Ok(match command {
        Command::Settings | Command::List => ShellCommand::GetEffectiveSettings,
        Command::Set { pairs } => ShellCommand::SaveActiveSettings {
            settings: parse_pairs(&pairs)?,
        },
        Command::Create { name } => ShellCommand::CreateProfile { name },
        Command::Switch { identity } => ShellCommand::SwitchProfile { identity },
        Command::Rename { old, new } => ShellCommand::RenameProfile { old, new },
        Command::Delete { identity } => ShellCommand::DeleteProfile { identity },
        Command::ResetSession => ShellCommand::ResetSession,
        Command::Backup { action } => match action {
            BackupAction::Create => ShellCommand::CreateBackup,
            BackupAction::List => ShellCommand::ListBackups,
            BackupAction::Restore { filename } => ShellCommand::RestoreBackup { filename },
            BackupAction::Delete { filename } => ShellCommand::DeleteBackup { filename },
            BackupAction::Prune { keep } => ShellCommand::PruneBackups { keep },
        },
        Command::Serve | Command::StartUrl | Command::Partition => {
            bail!("Not a one-shot command")
        }
    })
}

fn serve(controller: &ProfileLifecycleController<Output>, out: &Output) -> Result<()> {
    info!("Serving commands on stdin");
    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read command from stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let reply = match serde_json::from_str::<ShellCommand>(&line) {
            Ok(command) => dispatch(controller, command),
            Err(e) => {
                warn!(error = %e, "Ignoring malformed command");
                Reply::error("malformed-command", e.to_string())
            }
        };
        out.write(&reply);
    }
    info!("Command stream closed");
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr; stdout carries the JSON stream
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let paths = AppPaths::resolve(cli.config_dir);
    info!(root = %paths.root().display(), "Using config directory");

    let out: Output = Arc::new(JsonLines::new(io::stdout()));
    let store = Arc::new(ConfigStore::new(paths));
    let controller = ProfileLifecycleController::new(store, Arc::clone(&out));

    match cli.command {
        Command::Serve => serve(&controller, &out),
        Command::StartUrl => {
            println!("{}", controller.effective_settings().settings.start_url());
            Ok(())
        }
        Command::Partition => {
            println!("{}", controller.active_partition().display());
            Ok(())
        }
        command => {
            let reply = dispatch(&controller, to_shell_command(command)?);
            out.write(&reply);
            if !reply.ok {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_pairs() {
        let pairs = [
            "enableDevTools=true".to_string(),
            "language=ja".to_string(),
            "customHomePage=https://example.com/?a=b".to_string(),
        ];
        let settings = parse_pairs(&pairs).unwrap();
        assert_eq!(settings["enableDevTools"], json!(true));
        assert_eq!(settings["language"], json!("ja"));
        assert_eq!(settings["customHomePage"], json!("https://example.com/?a=b"));

        assert!(parse_pairs(&["novalue".to_string()]).is_err());
    }

    #[test]
    fn test_cli_maps_to_commands() {
        let cli = Cli::parse_from(["studio-shell", "rename", "work", "office"]);
        assert_eq!(
            to_shell_command(cli.command).unwrap(),
            ShellCommand::RenameProfile {
                old: "work".to_string(),
                new: "office".to_string()
            }
        );

        let cli = Cli::parse_from([
            "studio-shell",
            "--config-dir",
            "/tmp/x",
            "backup",
            "prune",
            "--keep",
            "3",
        ]);
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/x")));
        assert_eq!(
            to_shell_command(cli.command).unwrap(),
            ShellCommand::PruneBackups { keep: Some(3) }
        );
    }

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
