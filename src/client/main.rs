/**
 * propsync operator entry point
 *
 * Inspects and drives the local mutation queue: show counts, queue a write
 * by hand, force a pass, wipe the queue, or run the background triggers.
 */
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use propsync::client::config::Config;
use propsync::client::engine::SyncEngine;
use propsync::client::sync::{NetworkStatus, SyncOutcome};
use propsync::shared::{MutationType, SyncStatus};

#[derive(Parser)]
#[command(name = "propsync")]
#[command(about = "Offline-first mutation queue for the property-management client")]
struct Cli {
    /// Treat the device as disconnected for this invocation
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show queue counts and connectivity
    Status,
    /// Queue a write for later replay
    Enqueue {
        /// Mutation type, e.g. maintenance-request
        mutation_type: MutationType,
        /// JSON payload
        payload: String,
    },
    /// Run one sync pass now
    Sync,
    /// Remove every queued write
    Clear,
    /// List queued writes, oldest first
    List {
        /// Only show records in this status
        #[arg(long)]
        status: Option<SyncStatus>,
    },
    /// Run the background triggers until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let network_status = NetworkStatus::from(!cli.offline);
    let engine = SyncEngine::builder(config)
        .network_status(network_status)
        .build();

    let result = run(&engine, cli.command).await;
    engine.shutdown().await;
    result
}

async fn run(engine: &SyncEngine, command: Command) -> Result<(), Box<dyn std::error::Error>> {
    match command {
        Command::Status => {
            let stats = engine.queue_stats().await?;
            println!("server:  {}", engine.config().server_url());
            println!("network: {:?}", engine.network_status());
            println!("pending: {}", stats.unsynced());
            println!("stuck:   {}", stats.stuck);
            println!(
                "         ({} pending, {} syncing, {} synced, {} failed)",
                stats.pending, stats.syncing, stats.synced, stats.failed
            );
        }
        Command::Enqueue {
            mutation_type,
            payload,
        } => {
            let payload: serde_json::Value = serde_json::from_str(&payload)?;
            let id = engine.enqueue(mutation_type, payload).await?;
            println!("{}", id);
        }
        Command::Sync => {
            engine.recover().await?;
            match engine.sync_now().await? {
                SyncOutcome::Completed(report) => {
                    println!(
                        "synced {}, failed {}, stuck at retry cap {} in {:?}",
                        report.synced, report.failed, report.skipped, report.duration
                    );
                    if report.quarantined > 0 {
                        println!("quarantined {} undecodable rows", report.quarantined);
                    }
                }
                SyncOutcome::Offline => println!("offline, nothing sent"),
                SyncOutcome::AlreadyRunning => println!("a sync pass is already running"),
            }
            // Let grace-delay deletions finish before the store closes
            tokio::time::sleep(engine.config().grace_delay()).await;
        }
        Command::Clear => {
            let removed = engine.clear_all().await?;
            println!("removed {}", removed);
        }
        Command::List { status } => {
            for mutation in engine.list(status).await? {
                println!(
                    "{}  {:<8} retries={}  {}",
                    mutation.id,
                    mutation.sync_status.as_str(),
                    mutation.retry_count,
                    mutation.last_error.as_deref().unwrap_or("")
                );
            }
        }
        Command::Run => {
            engine.start().await?;
            tracing::info!("Running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await?;
        }
    }

    Ok(())
}
