use std::time::Duration;

use eyre::Context;
use tokio::select;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use sonar_crawl::{Endpoint, Engine};
use sonar_storage::NodesFile;

use crate::config::NodeConfig;
use crate::{dns, ui};

/// The limit of time to wait for the node to shutdown.
const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Node encapsulates the crawler's service graph.
pub struct Node {
    config: NodeConfig,
    cancellation: CancellationToken,
    task_tracker: TaskTracker,
}

impl Node {
    pub fn new(config: NodeConfig) -> Self {
        Self {
            config,
            cancellation: CancellationToken::new(),
            task_tracker: TaskTracker::new(),
        }
    }

    /// Wait for the crawl to end on its own.
    pub async fn cancelled(&self) {
        self.cancellation.cancelled().await
    }

    /// Bootstrap and start every service. Returns once the crawl is running;
    /// an error here is fatal.
    pub async fn run(&self) -> eyre::Result<()> {
        let network = self.config.network;

        let store = NodesFile::create(&self.config.storage.path, network.nodes_file())
            .wrap_err("failed to prepare data directory")?;

        let mut seeds = dns::scan(&self.config.dns, network).await;
        if seeds.is_empty() {
            eyre::bail!("no nodes found from any dns seed");
        }

        // Warm-start: fold in whatever a previous run saved.
        if let Ok(saved) = store.load() {
            info!("loaded {} peers from a previous run", saved.len());
            seeds.extend(
                saved
                    .iter()
                    .filter_map(|entry| Endpoint::from_bracketed(entry))
                    .map(|endpoint| endpoint.host().to_owned()),
            );
        }

        let engine = Engine::new(self.config.to_crawl_config(), store);
        engine.add_seeds(seeds);

        self.task_tracker
            .spawn(ui::consume(engine.ui_events(), self.cancellation.clone()));

        let cancellation = self.cancellation.clone();
        self.task_tracker.spawn(async move {
            engine.run(cancellation.clone()).await;
            // The engine only stops on its own when the crawl drains; either
            // way the process should come down with it.
            cancellation.cancel();
        });

        self.task_tracker.close();
        info!("crawler started on {network}");

        Ok(())
    }

    pub async fn shutdown(&self) {
        info!("Shutting down, waiting for sessions to close...");

        self.cancellation.cancel();

        let timeout = self
            .config
            .shutdown_timeout
            .unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT_SECS);

        select! {
            // Wait until all tasks are finished
            _ = self.task_tracker.wait() => {},
            // Or exit by timeout
            _ = sleep(Duration::from_secs(timeout)) => {
                info!("Shutdown timeout reached, exiting...");
            },
        }
    }
}
