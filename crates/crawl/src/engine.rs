//! The crawl engine: wiring, lifetime, shutdown.

use std::sync::{Arc, Mutex};

use flume as chan;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::info;

use sonar_wire::Network;

use crate::metrics::{Counters, UiEvent};
use crate::registry::AddressRegistry;
use crate::session::SessionConfig;
use crate::store::GoodPeerStore;
use crate::workers;
use crate::Endpoint;

/// Default size of the worker pool.
pub const DEFAULT_CONNECTIONS: usize = 50;

/// Buffer of the address-intake channel. Batches that arrive while it is
/// full are dropped by the sessions.
const INTAKE_BUFFER: usize = 64;

/// Buffer of the session-results channel.
const RESULTS_BUFFER: usize = 64;

/// Buffer of the UI channel. Snapshots are dropped when it is full.
const UI_BUFFER: usize = 32;

/// Crawl engine configuration.
#[derive(Debug, Clone)]
pub struct CrawlConfig {
    pub network: Network,
    /// Size of the worker pool, which is also the cap on concurrent
    /// connections.
    pub connections: usize,
    /// Stop on our own once the queue drains and no sessions remain.
    pub exit_when_idle: bool,
    /// Per-session tunables.
    pub session: SessionConfig,
}

impl CrawlConfig {
    /// Create a configuration with defaults for the given network.
    pub fn new(network: Network) -> Self {
        Self {
            network,
            connections: DEFAULT_CONNECTIONS,
            exit_when_idle: false,
            session: SessionConfig::for_network(network),
        }
    }
}

/// Owns the crawl graph: registry, worker pool, collector, sampler.
///
/// Sessions never hold a reference to the engine; they are handed send-only
/// channel handles at construction.
pub struct Engine<S> {
    config: CrawlConfig,
    registry: Arc<AddressRegistry>,
    counters: Arc<Counters>,
    good: Arc<Mutex<Vec<Endpoint>>>,
    store: Arc<S>,
    intake_tx: chan::Sender<Vec<String>>,
    intake_rx: chan::Receiver<Vec<String>>,
    results_tx: chan::Sender<Endpoint>,
    results_rx: chan::Receiver<Endpoint>,
    ui_tx: chan::Sender<UiEvent>,
    ui_rx: chan::Receiver<UiEvent>,
}

impl<S: GoodPeerStore + 'static> Engine<S> {
    pub fn new(config: CrawlConfig, store: S) -> Self {
        let (intake_tx, intake_rx) = chan::bounded(INTAKE_BUFFER);
        let (results_tx, results_rx) = chan::bounded(RESULTS_BUFFER);
        let (ui_tx, ui_rx) = chan::bounded(UI_BUFFER);

        Self {
            config,
            registry: Arc::new(AddressRegistry::new()),
            counters: Arc::new(Counters::default()),
            good: Arc::new(Mutex::new(Vec::new())),
            store: Arc::new(store),
            intake_tx,
            intake_rx,
            results_tx,
            results_rx,
            ui_tx,
            ui_rx,
        }
    }

    /// Seed the crawl. Safe to call before or after [`Engine::run`];
    /// duplicates are absorbed by the registry.
    pub fn add_seeds(&self, hosts: impl IntoIterator<Item = String>) -> usize {
        let added = self.registry.add_batch(hosts);
        info!("seeded {added} endpoints");
        added
    }

    /// Receiver side of the UI channel, for the dashboard sink.
    pub fn ui_events(&self) -> chan::Receiver<UiEvent> {
        self.ui_rx.clone()
    }

    /// The shared address registry.
    pub fn registry(&self) -> Arc<AddressRegistry> {
        Arc::clone(&self.registry)
    }

    /// The shared crawl counters.
    pub fn counters(&self) -> Arc<Counters> {
        Arc::clone(&self.counters)
    }

    /// Snapshot copy of the good-peer list.
    pub fn good_peers(&self) -> Vec<Endpoint> {
        self.good.lock().expect("good list lock poisoned").clone()
    }

    /// Start every task of the crawl graph and block until the cancellation
    /// fires (or the crawl drains, when `exit_when_idle` is set). All tasks
    /// have exited and all connections are closed by the time this returns.
    pub async fn run(self, cancellation: CancellationToken) {
        let scope = cancellation.child_token();
        let tracker = TaskTracker::new();
        let (dispatch_tx, dispatch_rx) = chan::bounded(self.config.connections);

        tracker.spawn(workers::address_listener(
            Arc::clone(&self.registry),
            self.intake_rx.clone(),
            scope.clone(),
        ));

        tracker.spawn(workers::feeder(
            Arc::clone(&self.registry),
            dispatch_tx,
            scope.clone(),
        ));

        for id in 0..self.config.connections {
            tracker.spawn(workers::worker(
                id,
                dispatch_rx.clone(),
                Arc::clone(&self.counters),
                self.config.session.clone(),
                self.intake_tx.clone(),
                self.results_tx.clone(),
                self.ui_tx.clone(),
                scope.clone(),
            ));
        }

        tracker.spawn(workers::collector(
            self.results_rx.clone(),
            Arc::clone(&self.good),
            Arc::clone(&self.store),
            self.config.session.port,
            scope.clone(),
        ));

        tracker.spawn(workers::sampler(
            Arc::clone(&self.registry),
            Arc::clone(&self.counters),
            Arc::clone(&self.good),
            self.config.connections,
            self.ui_tx.clone(),
            scope.clone(),
        ));

        if self.config.exit_when_idle {
            tracker.spawn(workers::idle_watcher(
                Arc::clone(&self.registry),
                Arc::clone(&self.counters),
                scope.clone(),
            ));
        }

        tracker.close();
        info!(
            "crawl started on {} with {} workers",
            self.config.network, self.config.connections
        );
        tracker.wait().await;
        info!("crawl stopped");
    }
}
