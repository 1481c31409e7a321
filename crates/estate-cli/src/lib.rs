//! Administrative sweeps over the photo bucket.
//!
//! Storage is configured from the same environment as the API server. The
//! catalog is never touched, so it defaults to the in-memory backend here.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use estate_core::models::SweepReport;
use estate_core::Config;
use estate_sync::MaintenanceSweeper;

#[derive(Parser, Debug)]
#[command(name = "estate-admin", about = "Bulk maintenance over objects under a key prefix")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Concurrent object calls per page (1-20); defaults to SWEEP_CONCURRENCY
    #[arg(long, global = true)]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Make every object under the prefix publicly readable
    MakePublic {
        /// Key prefix, e.g. "properties/"
        prefix: String,
    },
    /// Delete every object under the prefix
    DeleteAll {
        /// Key prefix, e.g. "properties/prop-42/"
        prefix: String,
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Re-copy every object under the prefix as public-read
    CopyPublic {
        /// Key prefix to copy from
        prefix: String,
        /// Copy to this prefix instead of in place
        #[arg(long, value_name = "DEST_PREFIX")]
        into: Option<String>,
    },
}

/// Initialize tracing for CLI binaries.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Load configuration from the environment; an unset `CATALOG_BACKEND`
/// reads as `memory`.
pub fn load_config() -> anyhow::Result<Config> {
    dotenvy::dotenv().ok();
    Config::from_lookup(|key| {
        std::env::var(key)
            .ok()
            .or_else(|| (key == "CATALOG_BACKEND").then(|| "memory".to_string()))
    })
    .context("Invalid configuration")
}

/// Run one sweep command.
pub async fn run(command: &Command, sweeper: &MaintenanceSweeper) -> anyhow::Result<SweepReport> {
    let report = match command {
        Command::MakePublic { prefix } => sweeper.make_public_all(prefix).await,
        Command::DeleteAll { prefix, yes } => {
            if !yes {
                bail!("delete-all removes every object under '{}'; pass --yes to confirm", prefix);
            }
            tracing::warn!(prefix = %prefix, "Deleting every object under prefix");
            sweeper.delete_all(prefix).await
        }
        Command::CopyPublic { prefix, into } => match into {
            Some(dest) => sweeper.copy_as_public_all_into(prefix, dest).await,
            None => sweeper.copy_as_public_all(prefix).await,
        },
    };
    Ok(report)
}

/// Process exit code for a finished sweep.
pub fn exit_code(report: &SweepReport) -> i32 {
    if report.error_count > 0 {
        1
    } else {
        0
    }
}
