//! # Dispatch
//!
//! Parses arguments, installs logging, opens the storage service and routes
//! each subcommand to one service call. Logs and warnings go to stderr, results
//! to stdout.

use super::render;
use super::setup::{Cli, Commands};
use anyhow::{bail, Context, Result};
use clap::Parser;
use gearkeep::{SaveHooks, StorageConfig, StorageService, StorageWarning};
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut config = StorageConfig::load()?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = Some(dir);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(dispatch(cli.command, &config))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "gearkeep=debug" } else { "gearkeep=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

async fn dispatch(command: Commands, config: &StorageConfig) -> Result<()> {
    let hooks = SaveHooks::new().on_saved(|payload, info| {
        tracing::debug!(
            reason = %info.reason,
            projects = payload.projects.len(),
            warnings = info.warnings.len(),
            "saved"
        );
    });
    let service = StorageService::open(config, hooks)?;
    let result = execute(&service, command).await;
    service.flush().await;
    service.dispose();
    result
}

fn print_warnings(warnings: &[StorageWarning]) {
    for warning in warnings {
        eprintln!("{}", render::warning(warning));
    }
}

async fn execute(service: &StorageService, command: Commands) -> Result<()> {
    match command {
        Commands::Status => {
            let loaded = service.load_state().await;
            print_warnings(&loaded.warnings);
            print!("{}", render::status(&loaded));
        }

        Commands::Export { project, out } => {
            let loaded = service.load_state().await;
            print_warnings(&loaded.warnings);
            let export = match project.as_deref() {
                Some(id) if loaded.state.project(id).is_none() => {
                    bail!("no project with id {id}")
                }
                Some(id) => service.export_project_backup(&loaded.state, id),
                None => service.export_backup(&loaded.state),
            };

            let dir = out.unwrap_or_else(|| PathBuf::from("."));
            fs::create_dir_all(&dir)
                .with_context(|| format!("creating {}", dir.display()))?;
            let path = dir.join(&export.file_name);
            fs::write(&path, &export.json)
                .with_context(|| format!("writing {}", path.display()))?;
            print!("{}", render::exported(&path, export.payload.projects.len()));
        }

        Commands::Import { file } => {
            let raw = fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let loaded = service.load_state().await;
            print_warnings(&loaded.warnings);

            let imported = service.import_backup(&raw, &loaded.state);
            if let Some(warning) = imported.warnings.first() {
                bail!("{warning}");
            }
            let saved = service.save_now(&imported.state).await;
            print_warnings(&saved.warnings);
            print!(
                "{}",
                render::imported(loaded.state.projects.len(), imported.state.projects.len())
            );
        }

        Commands::Backups { json } => {
            let list = service.list_auto_backups().await;
            if json {
                println!("{}", serde_json::to_string_pretty(&list)?);
            } else {
                print!("{}", render::backups(&list));
            }
        }

        Commands::Restore => {
            let restored = service.restore_from_backup().await;
            if restored.warnings.contains(&StorageWarning::NoDeviceBackup) {
                bail!("{}", StorageWarning::NoDeviceBackup);
            }
            print_warnings(&restored.warnings);
            println!("Restored from {}", restored.source);
            print!("{}", render::status(&restored));
        }

        Commands::Reset { yes } => {
            if !yes {
                bail!("refusing to erase all data without --yes; export a backup first");
            }
            let reset = service.factory_reset().await;
            print_warnings(&reset.warnings);
            println!("All data erased.");
        }
    }
    Ok(())
}
