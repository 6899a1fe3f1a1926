// RAIDA authentication server daemon

use anyhow::Context;
use raida_commands::{Executive, Stats};
use raida_healing::{HealContext, IntegrityWorker, MerkleStore, PeerRing, TicketPool};
use raida_node::config::{Cli, Config};
use raida_node::dispatch::Dispatcher;
use raida_node::server::Server;
use raida_state::{scan_data_dir, Flusher, FreeIndex, LockerStore, PageCache};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse_args();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config_path = cli.config_path();
    let config = Arc::new(
        Config::load(&config_path, cli.data_dir.clone())
            .with_context(|| format!("loading {}", config_path.display()))?,
    );
    info!(
        raida_id = config.raida_id,
        port = config.port,
        data_dir = %config.data_dir.display(),
        "starting node"
    );

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.threads)
        .enable_all()
        .build()
        .context("building runtime")?;
    runtime.block_on(run(config))
}

async fn run(config: Arc<Config>) -> anyhow::Result<()> {
    // Shared state, built once and handed to the dispatcher
    let cache = Arc::new(PageCache::new(&config.data_dir));
    let free = Arc::new(FreeIndex::new());
    let lockers = Arc::new(LockerStore::new());
    let stats = Arc::new(Stats::new());
    let tickets = Arc::new(TicketPool::new());
    let merkle = Arc::new(MerkleStore::new(&config.data_dir));
    let peers = Arc::new(PeerRing::new(
        config.raida_id,
        config.coin_id,
        config.raida_servers.clone(),
    ));

    let summary = scan_data_dir(&cache, &free, &lockers).context("startup scan")?;
    info!(
        pages = summary.pages_on_disk,
        issued = summary.issued_coins,
        "state loaded"
    );

    // Background workers
    let flusher = Flusher::spawn(Arc::clone(&cache), config.backup_freq)
        .context("spawning persistence thread")?;
    let integrity = if config.synchronization_enabled {
        Some(
            IntegrityWorker::spawn(Arc::clone(&merkle), config.integrity_freq)
                .context("spawning integrity worker")?,
        )
    } else {
        None
    };

    let dispatcher = Arc::new(Dispatcher {
        config: Arc::clone(&config),
        exec: Executive {
            raida_id: config.raida_id,
            admin_key: config.admin_key,
            cache: Arc::clone(&cache),
            free: Arc::clone(&free),
            lockers: Arc::clone(&lockers),
            stats: Arc::clone(&stats),
        },
        heal: HealContext {
            raida_id: config.raida_id,
            cache: Arc::clone(&cache),
            free: Arc::clone(&free),
            tickets,
            merkle,
            peers,
        },
    });

    let server = Server::bind(dispatcher, config.port).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server_task = tokio::spawn(server.run(shutdown_rx));

    tokio::signal::ctrl_c().await.context("signal handler")?;
    info!("shutting down");
    let _ = shutdown_tx.send(true);
    let _ = server_task.await;

    // Final flush happens inside the worker stop paths
    if let Some(worker) = integrity {
        worker.stop();
    }
    flusher.stop();
    Ok(())
}
