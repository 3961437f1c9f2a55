use bias_dashboard::{
    BiasApiClient, CacheStore, Command, DashboardConfig, DashboardRunner, DashboardSession,
    FileStore, KeyValueStore, MemoryStore, WinRateStore,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = DashboardConfig::load()?;

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.max_log_level())
        .init();

    info!("Starting Bias Dashboard...");
    info!("API: {}", config.api_base_url);

    let client = BiasApiClient::new(&config.api_base_url, config.request_timeout())?;
    if let Err(e) = client.health_check().await {
        warn!("⚠ Bias API not reachable yet ({}), continuing", e);
    }

    // Persistent store if a cache directory is configured
    let store: Arc<dyn KeyValueStore> = match &config.cache_dir {
        Some(dir) => {
            let store = FileStore::new(dir);
            store.init().await?;
            info!("✓ Cache directory: {}", dir.display());
            Arc::new(store)
        }
        None => {
            info!("No cache directory configured, cache is in-memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let cache = CacheStore::new(Arc::clone(&store))
        .with_ttl_ms(config.cache_ttl_ms())
        .with_expiry(config.expiry_behavior);
    let session = Arc::new(DashboardSession::new(Arc::new(client), cache));
    let runner = DashboardRunner::new(
        session,
        WinRateStore::new(store),
        config.refresh_interval(),
    );

    let (tx, rx) = mpsc::channel(16);
    tokio::spawn(read_commands(tx));

    tokio::select! {
        _ = runner.run(rx) => {}
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    Ok(())
}

/// Forward terminal lines to the runner as commands
async fn read_commands(tx: mpsc::Sender<Command>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<Command>() {
            Ok(command) => {
                // Full channel means the runner is behind; drop rather than queue
                if let Err(e) = tx.try_send(command) {
                    warn!("Command dropped: {}", e);
                }
            }
            Err(e) => warn!("{}", e),
        }
    }
}
