//! ado-mcp - MCP server for Azure DevOps build tooling.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use ado_core::Config;
use ado_downloads::{CleanupFilter, DownloadCategory, DownloadFilter, TempDownloadManager};
use ado_mcp::format::{self, LocationInfo, OutputFormat};
use ado_mcp::McpServer;
use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ado-mcp")]
#[command(author, version, about = "Azure DevOps MCP server with managed download staging", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Use this config file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the MCP server on stdin/stdout
    Serve {
        /// Leave this server's staged downloads in place on exit
        #[arg(long)]
        keep_downloads: bool,
    },

    /// Inspect and clean up staged downloads
    Downloads {
        #[command(subcommand)]
        command: DownloadCommands,
    },

    /// Show or edit configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
enum DownloadCommands {
    /// List downloads staged by a server process
    List {
        /// Process id of the server
        #[arg(long)]
        pid: u32,

        /// Only this category (logs-by-name, job-logs, artifacts)
        #[arg(long)]
        category: Option<DownloadCategory>,

        /// Only this build
        #[arg(long)]
        build_id: Option<u64>,

        /// Print JSON instead of Markdown
        #[arg(long)]
        json: bool,
    },

    /// Delete downloads staged by a server process
    Cleanup {
        /// Process id of the server
        #[arg(long)]
        pid: u32,

        /// Only this category (logs-by-name, job-logs, artifacts)
        #[arg(long)]
        category: Option<DownloadCategory>,

        /// Only this build
        #[arg(long)]
        build_id: Option<u64>,

        /// Only files at least this many minutes old
        #[arg(long)]
        older_than_minutes: Option<u64>,
    },

    /// Show where a server process stages its downloads
    Location {
        /// Process id of the server (defaults to this process)
        #[arg(long)]
        pid: Option<u32>,
    },

    /// Remove download roots abandoned by earlier server processes
    Purge,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show current configuration
    Show,

    /// Print the config file path
    Path,

    /// Get a value (e.g. downloads.stale_after_hours)
    Get { key: String },

    /// Set a value (e.g. downloads.cleanup_on_exit false)
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries the MCP protocol, so logs go to stderr
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = match cli.config {
        Some(path) => path,
        None => Config::config_path()?,
    };
    let config = Config::load_from(&config_path)?;

    match cli.command {
        Some(Commands::Serve { keep_downloads }) => serve(&config, keep_downloads).await?,
        Some(Commands::Downloads { command }) => downloads(&config, command).await?,
        Some(Commands::Config { command }) => edit_config(config, &config_path, command)?,
        None => {
            println!("ado-mcp - Azure DevOps MCP server");
            println!("Run with --help for usage information");
        }
    }

    Ok(())
}

/// Purge stale roots, serve MCP until the client disconnects or the user
/// interrupts, then remove this process's root.
async fn serve(config: &Config, keep_downloads: bool) -> anyhow::Result<()> {
    let manager = Arc::new(TempDownloadManager::new(&config.downloads));

    let purged = manager.purge_stale_roots().await;
    tracing::info!(
        purged,
        location = %manager.location().display(),
        "Download staging ready"
    );

    let cleanup_on_exit = config.downloads.cleanup_on_exit && !keep_downloads;
    let mut guard = manager.cleanup_guard();
    if !cleanup_on_exit {
        guard.disarm();
    }

    let mut server = McpServer::new(Arc::clone(&manager));
    let server_task = tokio::spawn(async move { server.run().await });

    let interrupted = tokio::select! {
        joined = server_task => {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(e)) => tracing::error!("MCP server failed: {}", e),
                Err(e) => tracing::error!("MCP server task panicked: {}", e),
            }
            false
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, shutting down");
            true
        }
    };

    if cleanup_on_exit {
        if let Err(e) = manager.remove_root().await {
            tracing::warn!("Failed to remove download root: {}", e);
        }
    }
    drop(guard);

    if interrupted {
        // The server task may still be blocked reading stdin
        std::process::exit(130);
    }
    Ok(())
}

async fn downloads(config: &Config, command: DownloadCommands) -> anyhow::Result<()> {
    match command {
        DownloadCommands::List {
            pid,
            category,
            build_id,
            json,
        } => {
            let manager = TempDownloadManager::with_pid(&config.downloads, pid);
            let entries = manager
                .list_downloads(DownloadFilter { category, build_id })
                .await?;
            let output_format = if json {
                OutputFormat::Json
            } else {
                OutputFormat::Markdown
            };
            println!("{}", format::downloads(&entries, output_format)?);
        }
        DownloadCommands::Cleanup {
            pid,
            category,
            build_id,
            older_than_minutes,
        } => {
            let manager = TempDownloadManager::with_pid(&config.downloads, pid);
            let report = manager
                .cleanup_downloads(CleanupFilter {
                    category,
                    build_id,
                    older_than: older_than_minutes.map(minutes_to_duration),
                })
                .await?;
            println!("{}", format::cleanup_report_to_markdown(&report));
            if !report.is_clean() {
                anyhow::bail!("{} item(s) could not be removed", report.failures.len());
            }
        }
        DownloadCommands::Location { pid } => {
            let manager = match pid {
                Some(pid) => TempDownloadManager::with_pid(&config.downloads, pid),
                None => TempDownloadManager::new(&config.downloads),
            };
            let info = LocationInfo {
                location: manager.location(),
                exists: manager.root_exists().await,
                pid: manager.pid(),
            };
            println!("{}", format::location(&info, OutputFormat::Markdown)?);
        }
        DownloadCommands::Purge => {
            let manager = TempDownloadManager::new(&config.downloads);
            let removed = manager.purge_stale_roots().await;
            println!(
                "Removed {} stale download root(s) from {}",
                removed,
                manager.temp_dir().display()
            );
        }
    }

    Ok(())
}

fn minutes_to_duration(minutes: u64) -> Duration {
    Duration::from_secs(minutes.saturating_mul(60))
}

fn edit_config(mut config: Config, path: &Path, command: ConfigCommands) -> anyhow::Result<()> {
    match command {
        ConfigCommands::Show => {
            let contents =
                toml::to_string_pretty(&config).context("Failed to serialize configuration")?;
            println!("# {}", path.display());
            println!("{}", contents);
        }
        ConfigCommands::Path => println!("{}", path.display()),
        ConfigCommands::Get { key } => match config.get(&key)? {
            Some(value) => println!("{}", value),
            None => println!("(not set)"),
        },
        ConfigCommands::Set { key, value } => {
            config.set(&key, &value)?;
            config.save_to(path)?;
            tracing::info!("Set {} = {}", key, value);
        }
    }
    Ok(())
}
