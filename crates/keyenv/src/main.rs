// SPDX-FileCopyrightText: 2026 Keyenv Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! keyenv - an encrypted local store for API keys.
//!
//! This is the binary entry point. Every subcommand performs one store
//! operation and exits.

mod debug;
mod run;

use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use keyenv_config::KeyenvConfig;
use keyenv_core::{KeyenvError, Result};
use keyenv_vault::{AddOutcome, Store, StorePaths};
use zeroize::Zeroizing;

/// keyenv - keep API keys encrypted on disk and hand them to commands.
#[derive(Parser, Debug)]
#[command(name = "keyenv", version, about, long_about = None)]
struct Cli {
    /// Store directory (overrides configuration).
    #[arg(long, global = true, value_name = "PATH")]
    dir: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// List stored credential names.
    List,
    /// Store a credential, replacing any existing value.
    Add {
        name: String,
        /// Value to store. Prompted for (or read from stdin) when omitted.
        value: Option<String>,
    },
    /// Delete a credential.
    Remove { name: String },
    /// Print an export line for one credential, for `eval`.
    Use { name: String },
    /// Run a command with credentials in its environment.
    Run {
        /// Credentials to expose.
        #[arg(required = true)]
        names: Vec<String>,
        /// Command and arguments.
        #[arg(last = true, required = true)]
        command: Vec<String>,
    },
    /// Print export lines for every credential.
    Export,
    /// Re-encrypt the store under a new master key.
    RotateKey,
    /// Back up the key and store, then start empty.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },
    /// Show store paths, permissions and decryption status.
    Debug,
}

fn main() {
    let cli = Cli::parse();

    let config = match keyenv_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            keyenv_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.log.level, cli.verbose);

    match dispatch(cli, &config) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("keyenv: {e}");
            std::process::exit(1);
        }
    }
}

fn dispatch(cli: Cli, config: &KeyenvConfig) -> Result<i32> {
    let store = open_store(cli.dir, config)?;

    match cli.command {
        Commands::List => {
            let names = store.list()?;
            if names.is_empty() {
                eprintln!("no credentials stored");
            }
            for name in names {
                println!("{name}");
            }
        }
        Commands::Add { name, value } => {
            let value = match value {
                Some(v) => Zeroizing::new(v),
                None => keyenv_vault::read_value(&name)?,
            };
            match store.add(&name, &value)? {
                AddOutcome::Inserted => eprintln!("added {name}"),
                AddOutcome::Updated => eprintln!("updated {name}"),
            }
        }
        Commands::Remove { name } => {
            store.remove(&name)?;
            eprintln!("removed {name}");
        }
        Commands::Use { name } => {
            let env = store.get_many(&[name])?;
            print_secret(env.shell_exports().as_str())?;
        }
        Commands::Run { names, command } => {
            let env = store.get_many(&names)?;
            return run::run_with_env(env, &command);
        }
        Commands::Export => {
            let env = store.export_all()?;
            print_secret(env.shell_exports().as_str())?;
        }
        Commands::RotateKey => {
            let report = store.rotate_key()?;
            eprintln!("rotated master key ({} credentials re-encrypted)", report.records);
            if let Some(path) = report.key_backup {
                eprintln!("  previous key:   {}", path.display());
            }
            if let Some(path) = report.store_backup {
                eprintln!("  previous store: {}", path.display());
            }
        }
        Commands::Reset { yes } => {
            if !yes && !confirm_reset(&store)? {
                eprintln!("reset cancelled");
                return Ok(1);
            }
            let report = store.reset()?;
            eprintln!("store reset");
            for path in [report.key_backup, report.store_backup].into_iter().flatten() {
                eprintln!("  backup: {}", path.display());
            }
        }
        Commands::Debug => {
            let failures = debug::run_debug(&store.diagnostics());
            return Ok(if failures == 0 { 0 } else { 1 });
        }
    }
    Ok(0)
}

fn open_store(dir: Option<PathBuf>, config: &KeyenvConfig) -> Result<Store> {
    let dir = dir.or_else(|| config.store.resolved_dir()).ok_or_else(|| {
        KeyenvError::Config(
            "no store directory: set store.dir or KEYENV_STORE_DIR, or pass --dir".to_string(),
        )
    })?;
    let paths = StorePaths::new(dir, &config.store.key_file, &config.store.store_file);
    Ok(Store::open(paths).with_locking(config.store.lock))
}

/// Write shell export lines to stdout, which may be a pipe into `eval`.
fn print_secret(text: &str) -> Result<()> {
    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(text.as_bytes())
        .and_then(|()| stdout.flush())
        .map_err(|e| KeyenvError::Internal(format!("cannot write to stdout: {e}")))
}

fn confirm_reset(store: &Store) -> Result<bool> {
    let stdin = std::io::stdin();
    if !stdin.is_terminal() {
        return Err(KeyenvError::Validation(
            "refusing to reset without --yes when stdin is not a terminal".to_string(),
        ));
    }
    eprint!(
        "This replaces the master key and empties {}.\nBackups are kept. Type 'yes' to continue: ",
        store.paths().dir.display()
    );
    let mut answer = String::new();
    stdin
        .lock()
        .read_line(&mut answer)
        .map_err(|e| KeyenvError::Internal(format!("cannot read confirmation: {e}")))?;
    Ok(answer.trim() == "yes")
}

/// Log to stderr so stdout stays clean for export lines.
fn init_tracing(log_level: &str, verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let level = match verbose {
        0 => log_level,
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("keyenv={level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use secrecy::ExposeSecret;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_splits_names_and_command() {
        let cli = Cli::try_parse_from([
            "keyenv", "run", "OPENAI_API_KEY", "GITHUB_TOKEN", "--", "python", "app.py",
        ])
        .unwrap();
        match cli.command {
            Commands::Run { names, command } => {
                assert_eq!(names, ["OPENAI_API_KEY", "GITHUB_TOKEN"]);
                assert_eq!(command, ["python", "app.py"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["keyenv", "list", "--dir", "/tmp/k", "-vv"]).unwrap();
        assert_eq!(cli.dir, Some(PathBuf::from("/tmp/k")));
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn add_value_is_optional() {
        let cli = Cli::try_parse_from(["keyenv", "add", "X"]).unwrap();
        assert!(matches!(cli.command, Commands::Add { value: None, .. }));
    }

    #[test]
    fn dir_flag_overrides_config() {
        let config = keyenv_config::load_and_validate_str("[store]\ndir = \"/nowhere\"\n").unwrap();
        let dir = tempfile::tempdir().unwrap();
        let store = open_store(Some(dir.path().to_path_buf()), &config).unwrap();
        assert_eq!(store.paths().dir, dir.path());
        assert_eq!(store.paths().key_file, dir.path().join("master.key"));
    }

    #[test]
    fn dispatch_add_then_remove() {
        let dir = tempfile::tempdir().unwrap();
        let config = KeyenvConfig::default();
        let dir_arg = dir.path().to_str().unwrap();

        let add = Cli::try_parse_from(["keyenv", "--dir", dir_arg, "add", "OPENAI_API_KEY", "sk-test-1"]).unwrap();
        assert_eq!(dispatch(add, &config).unwrap(), 0);

        let store = open_store(Some(dir.path().to_path_buf()), &config).unwrap();
        assert_eq!(store.get("OPENAI_API_KEY").unwrap().expose_secret(), "sk-test-1");

        let remove = Cli::try_parse_from(["keyenv", "--dir", dir_arg, "remove", "OPENAI_API_KEY"]).unwrap();
        assert_eq!(dispatch(remove, &config).unwrap(), 0);
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn dispatch_reports_missing_names() {
        let dir = tempfile::tempdir().unwrap();
        let cli = Cli::try_parse_from([
            "keyenv", "--dir", dir.path().to_str().unwrap(), "run", "NOPE", "--", "true",
        ])
        .unwrap();
        let err = dispatch(cli, &KeyenvConfig::default()).unwrap_err();
        assert_eq!(err.to_string(), "credential not found: NOPE");
    }
}
