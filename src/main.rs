//! Grafana Backup Restore Tool
//!
//! Provides CLI interface for restoring Grafana objects from a backup archive

// grafanatool/src/main.rs
mod config;
mod errors;
mod grafana;
mod restore;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::{AppConfig, load_restore_config};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "grafanatool", version, about = "Restore Grafana objects from a backup archive")]
struct Cli {
    /// Path to the JSON configuration file
    #[arg(long, env = "GRAFANA_BACKUP_CONFIG", default_value = "config.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Restore a backup archive into the configured Grafana instance
    Restore {
        /// Local path, blob name in the configured bucket, or s3:// URI of the archive
        archive_file: String,

        /// Comma-separated components to restore (e.g. "folders,dashboards"); all when omitted
        #[arg(long)]
        components: Option<String>,
    },
}

/// Main entry point for the restore tool
#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run_app(cli).await {
        Ok(_) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_app(cli: Cli) -> Result<()> {
    let app_config = AppConfig::load_from_json(&cli.config).with_context(|| {
        format!(
            "Failed to load application configuration from {}",
            cli.config.display()
        )
    })?;

    let spaces_is_configured = app_config.spaces_config.is_some();

    match cli.command {
        Commands::Restore {
            archive_file,
            components,
        } => {
            println!("🔄 Starting Restore Process...");
            let restore_config = load_restore_config(&archive_file, components, spaces_is_configured)
                .context("Failed to load restore configuration")?;

            println!(
                "Restore target: {}, Archive: {}",
                app_config.settings.grafana_url, restore_config.archive_source
            );
            let report = restore::run_restore_flow(&app_config, &restore_config)
                .await
                .context("Restore process failed")?;
            if report.failures().next().is_some() {
                println!("⚠️ Some objects could not be restored; see the summary above.");
            }
        }
    }
    Ok(())
}
