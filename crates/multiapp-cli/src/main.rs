//! multiapp - command-line front end for the plugin launcher.
//!
//! Every command opens the launcher root, runs one lifecycle operation through
//! `multiapp-core` and prints the outcome.

mod chronos;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use multiapp_core::{
    CancellationToken, LauncherConfig, PluginLifecycleManager, PluginRegistry, ProgressReporter,
    ProgressUpdate, TextSurface,
};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "multiapp")]
#[command(about = "Install, update and run multiapp plugins")]
struct Args {
    /// Launcher root directory (defaults to the user data directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the remote catalog with local install state
    Catalog {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// List installed plugins
    List,
    /// Install a plugin from the catalog
    Install { name: String },
    /// Update an installed plugin to the catalog version
    Update { name: String },
    /// Remove a plugin
    Uninstall { name: String },
    /// Enable an installed plugin
    Enable { name: String },
    /// Disable an installed plugin
    Disable { name: String },
    /// Flip a plugin's enabled flag
    Toggle { name: String },
    /// Render an enabled plugin
    Open {
        name: String,
        /// Arguments passed to the plugin
        args: Vec<String>,
    },
    /// Check whether a newer launcher is available
    CheckUpdate,
    /// Remove untracked plugin directories and dangling records
    Clean,
    /// Show or change the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print config.toml
    Show,
    /// Set manifest_url or catalog_url
    Set { key: String, value: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { Level::DEBUG } else { Level::WARN };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .init();

    let root = match args.root {
        Some(path) => path,
        None => dirs::data_dir()
            .map(|dir| dir.join("multiapp"))
            .context("No user data directory; pass --root")?,
    };
    debug!("Launcher root: {}", root.display());

    let manager = Arc::new(
        PluginLifecycleManager::new(&root)
            .with_context(|| format!("Failed to open launcher at {}", root.display()))?,
    );

    match args.command {
        Command::Catalog { json } => show_catalog(&manager, json).await?,
        Command::List => list_installed(&manager),
        Command::Install { name } => run_install(&manager, &name, false).await?,
        Command::Update { name } => run_install(&manager, &name, true).await?,
        Command::Uninstall { name } => {
            manager.uninstall(&name).await?;
            println!("{} uninstalled", name);
        }
        Command::Enable { name } => {
            manager.enable(&name)?;
            println!("{} enabled", name);
        }
        Command::Disable { name } => {
            manager.disable(&name)?;
            println!("{} disabled", name);
        }
        Command::Toggle { name } => {
            let enabled = manager.toggle(&name)?;
            println!("{} {}", name, if enabled { "enabled" } else { "disabled" });
        }
        Command::Open { name, args } => open_plugin(&manager, &name, &args)?,
        Command::CheckUpdate => {
            let check = manager.check_launcher_update().await?;
            if check.has_update {
                println!(
                    "Update available: {} -> {}",
                    check.local_version, check.remote_version
                );
            } else {
                println!("Launcher is up to date ({})", check.local_version);
            }
        }
        Command::Clean => {
            let report = manager.cleanup_orphans().await?;
            if report.is_clean() {
                println!("Nothing to clean");
            }
            for name in &report.untracked_dirs {
                println!("Removed untracked directory {}", name);
            }
            for name in &report.dangling_records {
                println!("Dropped record without directory {}", name);
            }
        }
        Command::Config { action } => match action {
            ConfigAction::Show => {
                let config = manager.config();
                for key in LauncherConfig::KEYS {
                    println!("{} = {}", key, config.get(key).unwrap_or_default());
                }
            }
            ConfigAction::Set { key, value } => {
                manager.set_config(&key, &value)?;
                println!("{} = {}", key, value);
            }
        },
    }

    Ok(())
}

async fn show_catalog(manager: &PluginLifecycleManager, json: bool) -> Result<()> {
    let catalog = manager.fetch_catalog().await?;
    let view = manager.effective_catalog_view(&catalog);

    if json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }
    if view.is_empty() {
        println!("The catalog is empty");
        return Ok(());
    }

    println!("{:<24} {:<10} {:<10} STATUS", "NAME", "LOCAL", "REMOTE");
    for row in view {
        let status = match (row.installed, row.enabled, row.has_update) {
            (false, _, _) => "available",
            (true, _, true) => "update available",
            (true, true, false) => "installed",
            (true, false, false) => "disabled",
        };
        let local = if row.installed {
            row.local_version.to_string()
        } else {
            "-".to_string()
        };
        println!(
            "{:<24} {:<10} {:<10} {}",
            row.name, local, row.remote_version, status
        );
    }
    Ok(())
}

fn list_installed(manager: &PluginLifecycleManager) {
    let store = manager.store();
    let state = store.read_installed_state();
    if state.plugins.is_empty() {
        println!("No plugins installed");
        return;
    }

    for (name, record) in &state.plugins {
        println!(
            "{:<24} {:<10} {}",
            name,
            store.read_version(name),
            if record.enabled { "enabled" } else { "disabled" }
        );
    }
}

async fn run_install(manager: &Arc<PluginLifecycleManager>, name: &str, update: bool) -> Result<()> {
    let catalog = manager.fetch_catalog().await?;

    let (tx, rx) = mpsc::channel(64);
    let printer = tokio::spawn(print_progress(rx));

    let cancel = CancellationToken::new();
    let on_ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!("\nCancelling...");
                cancel.cancel();
            }
        })
    };

    let progress = ProgressReporter::new(tx);
    let result = if update {
        manager.update(name, &catalog, &progress, &cancel).await
    } else {
        manager.install(name, &catalog, &progress, &cancel).await
    };

    drop(progress);
    on_ctrl_c.abort();
    printer.await?;

    result?;
    Ok(())
}

async fn print_progress(mut rx: mpsc::Receiver<ProgressUpdate>) {
    let mut stdout = std::io::stdout();
    while let Some(update) = rx.recv().await {
        match update {
            ProgressUpdate::StageChanged { name, step } => {
                println!("{}: {}", name, step.label());
            }
            ProgressUpdate::Download {
                downloaded_bytes,
                total_bytes,
                fraction,
                ..
            } => {
                match (fraction, total_bytes) {
                    (Some(fraction), Some(total)) => print!(
                        "\r  {:>5.1}% ({} / {} bytes)",
                        fraction * 100.0,
                        downloaded_bytes,
                        total
                    ),
                    _ => print!("\r  {} bytes", downloaded_bytes),
                }
                let _ = stdout.flush();
            }
            ProgressUpdate::Completed {
                name,
                success,
                message,
            } => {
                if success {
                    println!("\n{}: done", name);
                } else {
                    println!("\n{}: {}", name, message.unwrap_or_else(|| "failed".to_string()));
                }
            }
        }
    }
}

fn open_plugin(manager: &PluginLifecycleManager, name: &str, args: &[String]) -> Result<()> {
    let mut registry = PluginRegistry::new();
    registry.register(chronos::NAME, Arc::new(chronos::Chronos::from_args(args)));

    let host = manager.discover_plugins(&registry);
    let mut surface = TextSurface::new();
    host.render(name, &mut surface)?;

    for line in surface.lines() {
        println!("{}", line);
    }
    Ok(())
}
