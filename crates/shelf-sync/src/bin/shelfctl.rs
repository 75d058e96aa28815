//! # shelfctl
//!
//! Admin command line for the configuration store. Every command prints a
//! JSON envelope (`{success, data?, error?, platform?, timestamp}`) on
//! stdout; logs go to stderr.
//!
//! ## Usage
//! ```bash
//! # Create backend resources and apply migrations
//! cargo run -p shelf-sync --bin shelfctl -- init
//!
//! # Current configuration / audit trail
//! cargo run -p shelf-sync --bin shelfctl -- show
//! cargo run -p shelf-sync --bin shelfctl -- audit
//!
//! # Reset to defaults, tagged with an actor
//! cargo run -p shelf-sync --bin shelfctl -- reset --actor ops@shop
//!
//! # Backend probe and schema cross-check
//! cargo run -p shelf-sync --bin shelfctl -- health --platform sqlite
//!
//! # Push a locally cached configuration to an empty backend
//! cargo run -p shelf-sync --bin shelfctl -- migrate-cache --config ./shelf.toml
//! ```

use anyhow::{bail, Context};
use serde::Serialize;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use shelf_core::{ApiEnvelope, PlatformInfo, PlatformType};
use shelf_store::{build_adapter, create_adapter};
use shelf_sync::{ConfigManager, MigrationOutcome, SaveOutcome, ShelfConfig};

const USAGE: &str = "usage: shelfctl <init|show|audit|reset|health|migrate-cache> \
                     [--config PATH] [--platform NAME] [--actor TAG]";

/// Parsed command line.
struct Args {
    command: String,
    config_path: Option<PathBuf>,
    platform: Option<PlatformType>,
    actor: Option<String>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    let mut command = None;
    let mut config_path = None;
    let mut platform = None;
    let mut actor = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                i += 1;
                let value = args.get(i).context("--config needs a path")?;
                config_path = Some(PathBuf::from(value));
            }
            "--platform" | "-p" => {
                i += 1;
                let value = args.get(i).context("--platform needs a name")?;
                platform = Some(value.parse::<PlatformType>().map_err(anyhow::Error::msg)?);
            }
            "--actor" | "-a" => {
                i += 1;
                actor = Some(args.get(i).context("--actor needs a tag")?.clone());
            }
            "--help" | "-h" => bail!(USAGE),
            other if other.starts_with('-') => bail!("unknown option {}\n{}", other, USAGE),
            other => {
                if command.is_some() {
                    bail!("unexpected argument {}\n{}", other, USAGE);
                }
                command = Some(other.to_string());
            }
        }
        i += 1;
    }

    Ok(Args {
        command: command.context(USAGE)?,
        config_path,
        platform,
        actor,
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,shelf=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn emit<T: Serialize>(envelope: &ApiEnvelope<T>) -> anyhow::Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(envelope)?);
    Ok(if envelope.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn save_envelope(outcome: SaveOutcome, platform: PlatformInfo) -> ApiEnvelope<shelf_core::Configuration> {
    match outcome {
        SaveOutcome::Synced(config) => ApiEnvelope::success(config, Some(platform)),
        other => ApiEnvelope::failure(other.message(), Some(platform)),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_tracing();

    let args = parse_args()?;
    let mut config = ShelfConfig::load(args.config_path.clone()).context("loading shelf config")?;

    if let Some(platform) = args.platform {
        config.storage.platform = Some(platform);
    }
    if let Some(actor) = args.actor {
        config.manager.default_actor = Some(actor);
    }

    debug!(command = %args.command, platform = %config.storage.resolve_platform(), "shelfctl");

    match args.command.as_str() {
        "init" => {
            let adapter = build_adapter(&config.storage)?;
            adapter.initialize().await?;
            let report = adapter.migrate().await?;

            let config_file = args.config_path.or_else(ShelfConfig::default_config_path);
            if let Some(path) = config_file.filter(|p| !p.exists()) {
                config.save(Some(path))?;
            }

            emit(&ApiEnvelope::success(report, Some(adapter.platform_info())))
        }
        "show" => {
            let adapter = create_adapter(&config.storage).await?;
            let manager = ConfigManager::from_settings(adapter, &config.manager).await;
            let current = manager.get_config().await;

            let envelope = if manager.is_server_available() {
                ApiEnvelope::success(current, Some(manager.platform_info()))
            } else {
                ApiEnvelope::failure("backend unavailable, showing local copy", Some(manager.platform_info()))
            };
            emit(&envelope)
        }
        "audit" => {
            let adapter = create_adapter(&config.storage).await?;
            let log = adapter.get_audit_log().await?;
            emit(&ApiEnvelope::success(log, Some(adapter.platform_info())))
        }
        "reset" => {
            let adapter = create_adapter(&config.storage).await?;
            let manager = ConfigManager::from_settings(adapter, &config.manager).await;
            let outcome = manager.reset_to_defaults().await;
            emit(&save_envelope(outcome, manager.platform_info()))
        }
        "health" => {
            let adapter = build_adapter(&config.storage)?;
            adapter.initialize().await?;

            let report = serde_json::json!({
                "healthy": adapter.check_health().await,
                "schema": adapter.schema_health().await,
            });
            emit(&ApiEnvelope::success(report, Some(adapter.platform_info())))
        }
        "migrate-cache" => {
            let adapter = create_adapter(&config.storage).await?;
            let manager = ConfigManager::from_settings(adapter, &config.manager).await;
            let platform = Some(manager.platform_info());

            let envelope = match manager.migrate_from_local_cache().await {
                MigrationOutcome::Migrated(saved) => ApiEnvelope::success(Some(saved), platform),
                MigrationOutcome::BackendHasConfig | MigrationOutcome::NothingToMigrate => {
                    ApiEnvelope::success(None, platform)
                }
                MigrationOutcome::Failed(reason) => ApiEnvelope::failure(reason, platform),
            };
            emit(&envelope)
        }
        other => bail!("unknown command {}\n{}", other, USAGE),
    }
}
