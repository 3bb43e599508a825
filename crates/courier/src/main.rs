// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Courier - multi-account WhatsApp chat automation backend.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod pair;
mod serve;
mod status;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_config::CourierConfig;

/// Courier - multi-account WhatsApp chat automation backend.
#[derive(Parser, Debug)]
#[command(name = "courier", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the standard locations.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the engine and the admin API.
    Serve,
    /// Validate configuration and exit.
    CheckConfig,
    /// Show whether a local server is running.
    Status {
        /// Output as JSON.
        #[arg(long)]
        json: bool,
        /// Disable colors.
        #[arg(long)]
        plain: bool,
    },
    /// Pair an account by rendering its QR codes in the terminal.
    Pair {
        /// Account to pair; defaults to the single-account `default`.
        #[arg(long)]
        account: Option<String>,
    },
}

fn load_config(path: Option<&PathBuf>) -> CourierConfig {
    courier_config::load_dotenv();
    let loaded = match path {
        Some(path) => courier_config::load_and_validate_path(path),
        None => courier_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            courier_config::render_errors(errors);
            std::process::exit(1);
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_ref());

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::CheckConfig) => {
            println!(
                "courier: config ok (gateway {}:{}, store {})",
                config.gateway.host,
                config.gateway.port,
                if config.store.supabase_url.is_some() {
                    "postgrest"
                } else {
                    "sqlite"
                }
            );
            Ok(())
        }
        Some(Commands::Status { json, plain }) => status::run_status(&config, json, plain).await,
        Some(Commands::Pair { account }) => pair::run_pair(&config, account.as_deref()).await,
        None => {
            println!("courier: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn pair_takes_an_optional_account() {
        let cli = Cli::try_parse_from(["courier", "pair", "--account", "ab12cd34"]).unwrap();
        assert!(matches!(
            cli.command,
            Some(Commands::Pair { account: Some(ref id) }) if id == "ab12cd34"
        ));

        let cli = Cli::try_parse_from(["courier", "--config", "/tmp/c.toml", "check-config"]).unwrap();
        assert_eq!(cli.config.as_deref(), Some(std::path::Path::new("/tmp/c.toml")));
        assert!(matches!(cli.command, Some(Commands::CheckConfig)));
    }

    #[test]
    fn defaults_validate() {
        let config = courier_config::load_and_validate_str("").expect("defaults should be valid");
        assert_eq!(config.gateway.port, 8080);
    }
}
