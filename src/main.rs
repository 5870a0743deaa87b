//! Command-line interface for mbmirror
//!
//! # Usage Examples
//!
//! ```bash
//! # Follow the upstream packets until there is no newer one
//! mbmirror --config mbmirror.toml sync
//!
//! # Same, with everything on the command line
//! MBMIRROR_TOKEN=... mbmirror \
//!   --connection-string "host=localhost dbname=musicbrainz" \
//!   --base-url https://metabrainz.org/api/musicbrainz/replication-packets \
//!   --durability strict \
//!   sync
//!
//! # Apply packets that were downloaded by hand
//! mbmirror replay replication-151234.tar.bz2 replication-151235.tar.bz2
//!
//! # Print the database position and the status report
//! mbmirror status
//! ```
//!
//! A `base_url` that does not start with `http://` or `https://` is read as
//! a directory holding `replication-<seq>.tar.bz2` files.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use checkpoint::{FilesystemStore, NullStore, StatusStore};
use clap::{Parser, Subcommand};
use mbmirror::config::{Config, Overrides};
use mbmirror::hooks::audit::AuditHook;
use mbmirror::hooks::search::{default_fetchers, IndexSchema, SearchHook};
use mbmirror::sync::{replay_files, run_sync, SyncSummary};
use mbmirror_packet::{DirectoryPacketSource, HttpPacketSource, PacketSource};
use mbmirror_postgresql::{connect, PostgresRowLookup, PostgresTarget, SharedClient};
use mbmirror_replication::{Durability, HookChain, ReplayEngine, ReplicationTarget};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mbmirror")]
#[command(about = "Keeps a MusicBrainz database mirror current from replication packets")]
#[command(long_about = None)]
struct Cli {
    /// Configuration file (default: mbmirror.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Packet base URL, or a directory of packet archives
    #[arg(long, global = true)]
    base_url: Option<String>,

    /// Access token appended to packet requests
    #[arg(long, global = true, env = "MBMIRROR_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// PostgreSQL connection string
    #[arg(long, global = true, env = "MBMIRROR_CONNECTION_STRING")]
    connection_string: Option<String>,

    /// Where to write the status report
    #[arg(long, global = true)]
    status_file: Option<PathBuf>,

    /// What a failing mutation does: best-effort or strict
    #[arg(long, global = true)]
    durability: Option<Durability>,

    /// Log at debug level unless RUST_LOG says otherwise
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply packets newer than the database position until none is left
    Sync,
    /// Apply packet archives from disk, in the given order
    Replay {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Show the database position and the status report
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = run().await {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_directive = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive)),
        )
        .init();

    let mut config = Config::load(cli.config.as_deref())?;
    config.apply(Overrides {
        connection_string: cli.connection_string,
        base_url: cli.base_url,
        token: cli.token,
        status_file: cli.status_file,
        durability: cli.durability,
    });

    let store = status_store(&config);

    match cli.command {
        Commands::Sync => {
            let source = packet_source(&config)?;
            let client = connect(config.connection_string()?).await?;
            let mut target = PostgresTarget::new(client.clone(), &config.database.control_table);
            let mut hooks = build_hooks(&config, client)?;
            let summary = run_sync(
                &engine(&config),
                source.as_ref(),
                &mut target,
                &mut hooks,
                store.as_ref(),
            )
            .await?;
            log_summary(&summary);
        }
        Commands::Replay { files } => {
            let client = connect(config.connection_string()?).await?;
            let mut target = PostgresTarget::new(client.clone(), &config.database.control_table);
            let mut hooks = build_hooks(&config, client)?;
            let summary = replay_files(
                &engine(&config),
                &files,
                &mut target,
                &mut hooks,
                store.as_ref(),
            )
            .await?;
            log_summary(&summary);
        }
        Commands::Status => {
            let client = connect(config.connection_string()?).await?;
            let mut target = PostgresTarget::new(client, &config.database.control_table);
            let position = target.read_position().await?;
            println!("Database position: {position}");
            match store.load().await? {
                Some(report) => println!("{}", serde_json::to_string_pretty(&report)?),
                None => println!("No status report"),
            }
        }
    }

    Ok(())
}

fn engine(config: &Config) -> ReplayEngine {
    ReplayEngine::new(config.resolver())
        .with_durability(config.replication.durability)
        .with_insert_conflict(config.replication.on_insert_conflict)
}

fn status_store(config: &Config) -> Box<dyn StatusStore> {
    match &config.replication.status_file {
        Some(path) => Box::new(FilesystemStore::new(path)),
        None => Box::new(NullStore),
    }
}

fn packet_source(config: &Config) -> anyhow::Result<Box<dyn PacketSource>> {
    let base_url = config.base_url()?;
    if base_url.starts_with("http://") || base_url.starts_with("https://") {
        let source = HttpPacketSource::new(
            base_url,
            config.replication.token.clone(),
            config.replication.timeout()?,
        )?;
        Ok(Box::new(source))
    } else {
        Ok(Box::new(DirectoryPacketSource::new(base_url)))
    }
}

fn build_hooks(config: &Config, client: SharedClient) -> anyhow::Result<HookChain> {
    let mut hooks = HookChain::new();

    if config.audit.enabled {
        tracing::info!("Writing audit logs to {}", config.audit.directory.display());
        hooks.push(Box::new(AuditHook::new(&config.audit.directory)));
    }

    if config.search.enabled {
        let url = config
            .search
            .url
            .as_deref()
            .context("Search indexing is enabled but [search] url is not set")?;
        let index = Arc::new(IndexSchema::musicbrainz(&config.search.index));
        let fetchers = default_fetchers(&index);
        let hook = SearchHook::new(
            index,
            config.destination_schema(),
            fetchers,
            Arc::new(PostgresRowLookup::new(client)),
            url,
            &config.search.fallback_directory,
            config.replication.timeout()?,
        )?;
        tracing::info!("Updating search index at {url}");
        hooks.push(Box::new(hook));
    }

    Ok(hooks)
}

fn log_summary(summary: &SyncSummary) {
    for (table, stats) in summary.stats.iter() {
        tracing::info!("{table}: {stats}");
    }
    tracing::info!(
        "Applied {} packets, now at {} (was {})",
        summary.packets,
        summary.end,
        summary.start
    );
}
