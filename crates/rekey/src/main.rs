//! `rekey`: operator CLI for encrypted page content.
//!
//! Startup sequence:
//! 1. Parse the command line.
//! 2. Load and validate [`RekeyConfig`] from environment variables, then
//!    apply command-line overrides.
//! 3. Initialise tracing (stderr).
//! 4. Run the subcommand and map its outcome to the process exit code.

mod commands;
mod config;
mod telemetry;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::info;
use vault::Algorithm;

use config::RekeyConfig;

#[derive(Parser)]
#[command(name = "rekey", version)]
#[command(about = "Re-key, audit, and generate keys for encrypted notebook content", long_about = None)]
struct Cli {
    /// Notebook document (overrides DATA_FILE)
    #[arg(long, global = true)]
    data_file: Option<PathBuf>,

    /// Key-derivation identifier (overrides KEY_IDENTIFIER)
    #[arg(long, global = true)]
    identifier: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Re-encrypt every page under a new key
    Rekey {
        /// Key to encrypt under
        #[arg(long, env = "REKEY_NEW_KEY", hide_env_values = true)]
        new_key: String,

        /// Key the content is currently encrypted under; omit to encrypt plaintext
        #[arg(long, env = "REKEY_OLD_KEY", hide_env_values = true)]
        old_key: Option<String>,

        /// Envelope algorithm for rewritten values
        #[arg(long, default_value_t = Algorithm::default())]
        algorithm: Algorithm,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,

        /// Write nothing if any value is unreadable
        #[arg(long)]
        strict: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Check that every page is encrypted under a key
    Verify {
        /// Key to check against; defaults to the configured ENCRYPTION_MASTER_KEY
        #[arg(long, env = "REKEY_NEW_KEY", hide_env_values = true)]
        key: Option<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Print a fresh random master key
    GenerateKey,
}

fn main() -> Result<ExitCode> {
    // -----------------------------------------------------------------------
    // 1. Command line
    // -----------------------------------------------------------------------
    let cli = Cli::parse();

    // -----------------------------------------------------------------------
    // 2. Configuration
    // -----------------------------------------------------------------------
    let cfg = RekeyConfig::from_env()
        .and_then(|c| c.with_overrides(cli.data_file, cli.identifier))
        .map_err(|e| {
            // Telemetry is not yet up; write to stderr directly.
            eprintln!("ERROR: configuration invalid: {e:#}");
            e
        })?;

    // -----------------------------------------------------------------------
    // 3. Telemetry
    // -----------------------------------------------------------------------
    telemetry::init(&cfg.log_level, cfg.json_logs())?;
    info!(
        version = env!("CARGO_PKG_VERSION"),
        data_file = %cfg.data_file.display(),
        "rekey starting"
    );

    // -----------------------------------------------------------------------
    // 4. Command
    // -----------------------------------------------------------------------
    let ok = match cli.command {
        Commands::Rekey {
            new_key,
            old_key,
            algorithm,
            dry_run,
            strict,
            json,
        } => {
            let opts = commands::RekeyOptions {
                algorithm,
                dry_run,
                strict,
                json,
            };
            commands::rekey(&cfg, &new_key, old_key.as_deref(), &opts)?
        }
        Commands::Verify { key, json } => commands::verify(&cfg, key.as_deref(), json)?,
        Commands::GenerateKey => commands::generate_key()?,
    };

    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rekey_flags() {
        let cli = Cli::try_parse_from([
            "rekey",
            "--data-file",
            "/tmp/nb.json",
            "rekey",
            "--new-key",
            "n",
            "--old-key",
            "o",
            "--algorithm",
            "aes-256-gcm-siv",
            "--dry-run",
        ])
        .unwrap();
        assert_eq!(cli.data_file, Some(PathBuf::from("/tmp/nb.json")));
        match cli.command {
            Commands::Rekey {
                new_key,
                old_key,
                algorithm,
                dry_run,
                strict,
                ..
            } => {
                assert_eq!(new_key, "n");
                assert_eq!(old_key.as_deref(), Some("o"));
                assert_eq!(algorithm, Algorithm::Aes256GcmSiv);
                assert!(dry_run);
                assert!(!strict);
            }
            _ => panic!("expected rekey subcommand"),
        }
    }

    #[test]
    fn unknown_algorithm_is_rejected() {
        assert!(Cli::try_parse_from([
            "rekey", "rekey", "--new-key", "n", "--algorithm", "rot13",
        ])
        .is_err());
    }

    #[test]
    fn global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["rekey", "generate-key", "--identifier", "team"]).unwrap();
        assert_eq!(cli.identifier.as_deref(), Some("team"));
        assert!(matches!(cli.command, Commands::GenerateKey));
    }
}
