//! Lumen CLI - command-line access to the authenticated resource cache.
//!
//! This CLI provides a `lumen` command that fetches protected resources
//! through the reference-counted cache and reports what each consumer sees.

mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use commands::{fetch, normalize};

/// Lumen CLI - authenticated resource cache
#[derive(Parser, Debug)]
#[command(name = "lumen", author, version, about = "Lumen - authenticated resource cache")]
struct Args {
    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch resources through the cache
    ///
    /// Binds one consumer per locator, waits for each to settle and prints
    /// one JSON object per locator. Exits with status 1 if any fetch failed.
    Fetch {
        /// Resource locators (absolute URLs, root-relative paths or resource ids)
        #[arg(required = true)]
        locators: Vec<String>,

        /// Access token (falls back to LUMEN_TOKEN)
        #[arg(long)]
        token: Option<String>,

        /// Override the configured base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Config file (defaults to .lumen/config.toml in the current directory)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Include a base64 data URL of each fetched resource
        #[arg(long)]
        data_url: bool,
    },

    /// Print the canonical cache key of each locator
    Normalize {
        /// Resource locators
        #[arg(required = true)]
        locators: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr; stdout carries command output
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Fetch {
            locators,
            token,
            base_url,
            config,
            data_url,
        } => {
            fetch::execute(fetch::FetchOptions {
                locators,
                token,
                base_url,
                config,
                data_url,
            })
            .await?;
        }
        Command::Normalize { locators } => {
            normalize::execute(&locators);
        }
    }

    Ok(())
}
