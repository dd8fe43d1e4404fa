use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use module_registry::catalog::{
    CatalogStore, ModuleId, PublishRequest, SqliteCatalog, VersionMetadata,
};
use module_registry::config::{RegistryConfig, log_path};
use module_registry::logging::init_logging;
use module_registry::server::run_server;

#[derive(Parser)]
#[command(name = "module-registry")]
#[command(version, about = "Private registry for infrastructure modules and providers")]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Args)]
struct GlobalArgs {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Catalog database path (overrides the configuration)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Log to the data directory when no log file is configured
    #[arg(long, global = true)]
    log_to_file: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Serve the registry protocol (default)
    Serve {
        /// Address to listen on (overrides the configuration)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Publish a version into the catalog
    Publish {
        namespace: String,
        name: String,
        target: String,
        version: String,
        /// Version metadata as JSON, e.g. '{"artifact":"vpc-1.0.0.zip"}'
        #[arg(long)]
        metadata: String,
    },
}

fn load_config(global: &GlobalArgs) -> anyhow::Result<RegistryConfig> {
    let mut config = match &global.config {
        Some(path) => RegistryConfig::load(path)?,
        None => RegistryConfig::default(),
    };
    if let Some(database) = &global.database {
        config.database.path = Some(database.clone());
    }
    if global.log_to_file && config.logging.file.is_none() {
        config.logging.file = Some(log_path());
    }
    Ok(config)
}

fn publish(
    config: &RegistryConfig,
    id: ModuleId,
    version: String,
    metadata: &str,
) -> anyhow::Result<()> {
    let metadata: VersionMetadata =
        serde_json::from_str(metadata).context("Invalid --metadata JSON")?;

    let db_path = config.database.resolved_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let catalog = CatalogStore::new(
        Arc::new(SqliteCatalog::new(&db_path)?),
        config.namespaces.case_insensitive,
    );

    let stored = catalog.publish(PublishRequest::new(id.clone(), version, metadata))?;
    info!("Published {} {}", id, stored.version);
    println!("Published {} {}", id, stored.version);
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let mut config = load_config(&cli.global)?;
    let _log_guard = init_logging(&config.logging)?;

    match cli.command {
        None => tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?
            .block_on(run_server(config)),
        Some(Command::Serve { bind }) => {
            if let Some(bind) = bind {
                config.server.bind = bind;
            }
            tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()?
                .block_on(run_server(config))
        }
        Some(Command::Publish {
            namespace,
            name,
            target,
            version,
            metadata,
        }) => publish(
            &config,
            ModuleId::new(namespace, name, target),
            version,
            &metadata,
        ),
    }
}
