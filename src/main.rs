//! PostgreSQL Container Backup Tool
//!
//! Readiness gating, database provisioning, scheduled backups, remote
//! replication and retention cleanup for a PostgreSQL container.

// pgbackuptool/src/main.rs
mod backup;
mod bootstrap;
mod cleanup;
mod config;
mod errors;
mod storage;
mod utils;

use anyhow::{Context, Result};
use config::AppConfig;
use std::env;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "Usage: pgbackuptool <backup|cleanup|init|wait-ready|config>";

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the container usually passes real environment variables.
    dotenv::dotenv().ok();
    init_tracing();

    match run_app().await {
        Ok(_) => {
            info!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run_app() -> Result<()> {
    let choice = env::args().nth(1).map(|arg| arg.trim().to_string());
    let Some(choice) = choice else {
        anyhow::bail!("No command given. {}", USAGE);
    };

    let app_config = AppConfig::from_env().context("Failed to load configuration from environment")?;

    match choice.as_str() {
        "backup" => {
            backup::run_backup_flow(&app_config)
                .await
                .context("Backup process failed")?;
        }
        "cleanup" => {
            info!("🧹 Starting cleanup of expired backups...");
            cleanup::run_cleanup_flow(&app_config)
                .await
                .context("Cleanup process failed")?;
        }
        "init" => {
            info!("🛠 Initialising PostgreSQL databases...");
            bootstrap::run_init_flow(&app_config)
                .await
                .context("Container initialisation failed")?;
        }
        "wait-ready" => {
            bootstrap::run_wait_ready_flow(&app_config).await?;
        }
        "config" => {
            let summary = serde_json::to_string_pretty(&app_config.summary())
                .context("Failed to render configuration")?;
            println!("{}", summary);
        }
        other => {
            anyhow::bail!("Invalid command '{}'. {}", other, USAGE);
        }
    }
    Ok(())
}
