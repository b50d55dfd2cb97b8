//! KRD CLI - Database migrations and outbox tools.
//!
//! # Usage
//!
//! ```bash
//! # Run document store migrations
//! krd-cli migrate
//!
//! # Count quotes parked in local storage
//! krd-cli quotes pending
//!
//! # Push parked quotes to the database
//! krd-cli quotes sync
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `quotes pending` - Show the local quote outbox
//! - `quotes sync` - Sync the local quote outbox

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "krd-cli")]
#[command(author, version, about = "KRD storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Inspect and sync the local quote outbox
    Quotes {
        #[command(subcommand)]
        action: QuotesAction,
    },
}

#[derive(Subcommand)]
enum QuotesAction {
    /// Print how many quotes are waiting locally
    Pending,
    /// Retry every parked quote against the database
    Sync,
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Quotes { action } => match action {
            QuotesAction::Pending => commands::quotes::pending()?,
            QuotesAction::Sync => commands::quotes::sync().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_quote_subcommands() {
        let cli = Cli::try_parse_from(["krd-cli", "quotes", "sync"]).unwrap_or_else(|e| panic!("{e}"));
        assert!(matches!(
            cli.command,
            Commands::Quotes {
                action: QuotesAction::Sync
            }
        ));
        assert!(Cli::try_parse_from(["krd-cli", "quotes"]).is_err());
    }
}
