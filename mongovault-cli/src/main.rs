/*!
Mongovault CLI - command-line interface for the backup/restore engine.

The CLI is a thin collaborator: it establishes the session, hands work to
the engines on a spawned task, and renders the progress events coming back
over the channel. All transfer semantics live in `mongovault-core`.
*/

use clap::{Parser, Subcommand};
use mongovault_core::{
    BackupEngine, ChannelSink, ConnectionConfig, Credentials, DocumentStore, MongoStore,
    ProgressEvent, RestoreEngine, RestoreOptions,
};
use std::path::PathBuf;
use std::sync::Arc;
use tabled::{Table, Tabled};
use tracing::warn;

#[derive(Parser)]
#[command(name = "mongovault")]
#[command(about = "Type-preserving MongoDB collection backup and restore")]
#[command(version)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Server host name or address
    #[arg(long, global = true, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(long, global = true, default_value_t = 27017)]
    port: u16,

    /// Username for authentication
    #[arg(short = 'u', long, global = true)]
    username: Option<String>,

    /// Password for authentication
    #[arg(short = 'p', long, global = true)]
    password: Option<String>,

    /// Database to authenticate against
    #[arg(long, global = true, default_value = "admin")]
    auth_database: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Verify the server is reachable and alive
    Ping,
    /// List collections in a database with document counts
    Collections {
        /// Database to enumerate
        #[arg(short, long)]
        database: String,
    },
    /// Back up collections into a timestamped directory
    Backup {
        /// Database to back up from
        #[arg(short, long)]
        database: String,
        /// Root directory backups are created under
        #[arg(short, long, default_value = "./backups")]
        output: PathBuf,
        /// Collection to back up; repeatable, defaults to all
        #[arg(short = 'c', long = "collection")]
        collections: Vec<String>,
    },
    /// Restore collections from a backup directory
    Restore {
        /// Database to restore into
        #[arg(short, long)]
        database: String,
        /// Backup directory created by a previous backup run
        #[arg(long)]
        backup_dir: PathBuf,
        /// Collection to restore; repeatable, defaults to all discovered
        #[arg(short = 'c', long = "collection")]
        collections: Vec<String>,
        /// Drop each destination collection before inserting
        #[arg(long)]
        drop_existing: bool,
        /// Bulk insert batch size
        #[arg(long, default_value_t = 1000)]
        batch_size: usize,
    },
}

#[derive(Tabled)]
struct CollectionRow {
    #[tabled(rename = "Collection")]
    name: String,
    #[tabled(rename = "Documents")]
    documents: String,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();

    init_logging(cli.verbose);

    let config = connection_config(&cli);

    match cli.command {
        Commands::Ping => ping(&config).await?,
        Commands::Collections { database } => list_collections(&config, &database).await?,
        Commands::Backup {
            database,
            output,
            collections,
        } => run_backup(&config, &database, output, collections).await?,
        Commands::Restore {
            database,
            backup_dir,
            collections,
            drop_existing,
            batch_size,
        } => {
            run_restore(
                &config,
                &database,
                backup_dir,
                collections,
                drop_existing,
                batch_size,
            )
            .await?
        }
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("debug"))
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn connection_config(cli: &Cli) -> ConnectionConfig {
    let mut config = ConnectionConfig::new(cli.host.clone()).with_port(cli.port);
    if let (Some(username), Some(password)) = (&cli.username, &cli.password) {
        config = config.with_credentials(
            Credentials::new(username.clone(), password.clone())
                .with_auth_database(cli.auth_database.clone()),
        );
    } else if cli.username.is_some() || cli.password.is_some() {
        warn!("Both --username and --password are required for authentication; connecting unauthenticated");
    }
    config
}

async fn ping(config: &ConnectionConfig) -> Result<(), anyhow::Error> {
    let store = MongoStore::connect(config).await?;
    store.ping().await?;
    println!("✓ Server at {}:{} is alive", config.host, config.port);
    Ok(())
}

async fn list_collections(config: &ConnectionConfig, database: &str) -> Result<(), anyhow::Error> {
    let store = MongoStore::connect(config).await?;
    let collections = store
        .list_collections(database, config.count_time_budget)
        .await?;

    if collections.is_empty() {
        println!("No collections found in database '{database}'");
        return Ok(());
    }

    let rows: Vec<CollectionRow> = collections
        .into_iter()
        .map(|info| CollectionRow {
            name: info.name,
            documents: info
                .count
                .map(|n| n.to_string())
                .unwrap_or_else(|| "unknown".to_string()),
        })
        .collect();
    println!("{}", Table::new(rows));
    Ok(())
}

async fn run_backup(
    config: &ConnectionConfig,
    database: &str,
    output: PathBuf,
    collections: Vec<String>,
) -> Result<(), anyhow::Error> {
    let store = MongoStore::connect(config).await?;

    let collections = if collections.is_empty() {
        let all = store.collection_names(database).await?;
        if all.is_empty() {
            anyhow::bail!("no collections found in database '{database}'");
        }
        all
    } else {
        collections
    };

    let (sink, mut events) = ChannelSink::channel();
    let engine = BackupEngine::new(store, config.clone()).with_progress(Arc::new(sink));

    // Run the engine off the interactive task; progress is marshaled back
    // over the channel.
    let database = database.to_string();
    let handle = tokio::spawn(async move { engine.backup(&database, &collections, &output).await });

    while let Some(event) = events.recv().await {
        render_event(&event);
    }

    let summary = handle.await??;
    println!(
        "Backup completed: {}/{} collections backed up",
        summary.collections_backed_up, summary.total_collections
    );
    println!("Backup saved to: {}", summary.output_directory);

    summary.ensure_complete()?;
    Ok(())
}

async fn run_restore(
    config: &ConnectionConfig,
    database: &str,
    backup_dir: PathBuf,
    collections: Vec<String>,
    drop_existing: bool,
    batch_size: usize,
) -> Result<(), anyhow::Error> {
    let store = MongoStore::connect(config).await?;

    let mut options = RestoreOptions::default()
        .with_drop_existing(drop_existing)
        .with_batch_size(batch_size);
    if !collections.is_empty() {
        options = options.with_collections(collections);
    }

    let (sink, mut events) = ChannelSink::channel();
    let engine = RestoreEngine::new(store).with_progress(Arc::new(sink));

    let database = database.to_string();
    let handle =
        tokio::spawn(async move { engine.restore(&database, &backup_dir, &options).await });

    while let Some(event) = events.recv().await {
        render_event(&event);
    }

    let report = handle.await??;
    for name in report.succeeded() {
        println!("✓ Successfully restored: {name}");
    }
    for name in report.failed() {
        println!("✗ Failed to restore: {name}");
    }
    println!(
        "Restore completed: {}/{} collections restored successfully",
        report.succeeded().len(),
        report.len()
    );

    report.ensure_complete()?;
    Ok(())
}

fn render_event(event: &ProgressEvent) {
    match event {
        ProgressEvent::CollectionStarted {
            collection,
            index,
            total,
        } => println!("[{}/{}] {}...", index + 1, total, collection),
        ProgressEvent::CollectionCompleted {
            collection,
            documents,
        } => println!("  done: {collection} ({documents} documents)"),
        ProgressEvent::CollectionSkipped { collection } => {
            println!("  skipped (empty): {collection}")
        }
        ProgressEvent::CollectionFailed { collection, reason } => {
            println!("  FAILED: {collection}: {reason}")
        }
        ProgressEvent::BatchInserted {
            collection,
            documents,
        } => println!("  inserted {documents} documents into {collection}"),
        ProgressEvent::BackupFinished { .. } | ProgressEvent::RestoreFinished { .. } => {}
    }
}
