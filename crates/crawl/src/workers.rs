//! Background workers that drive the crawl.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use flume as chan;
use tokio::time::{interval, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace};

use crate::metrics::{Counters, MetricsSnapshot, UiEvent};
use crate::registry::AddressRegistry;
use crate::session::{PeerSession, SessionConfig, Status};
use crate::store::GoodPeerStore;
use crate::Endpoint;

/// How long the feeder naps when the pending queue is empty.
const FEEDER_IDLE: Duration = Duration::from_millis(100);

/// Cadence of the persistence ticker.
const SAVE_INTERVAL: Duration = Duration::from_secs(1);

/// Cadence of the metrics sampler.
const SAMPLE_INTERVAL: Duration = Duration::from_millis(500);

/// Fan-in point for address batches pushed by session listeners.
pub(crate) async fn address_listener(
    registry: Arc<AddressRegistry>,
    intake: chan::Receiver<Vec<String>>,
    cancellation: CancellationToken,
) {
    trace!("address listener started");
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            batch = intake.recv_async() => {
                let Ok(hosts) = batch else { break };
                let added = registry.add_batch(hosts);
                if added > 0 {
                    debug!("{added} new endpoints queued");
                }
            }
        }
    }
    trace!("address listener exited");
}

/// Moves endpoints from the registry queue into the dispatch channel. Only
/// the feeder pops the queue; the dispatch channel is bounded to the worker
/// count so the pull rate matches consumption.
pub(crate) async fn feeder(
    registry: Arc<AddressRegistry>,
    dispatch: chan::Sender<Endpoint>,
    cancellation: CancellationToken,
) {
    trace!("feeder started");
    loop {
        let Some(endpoint) = registry.take_one() else {
            tokio::select! {
                _ = cancellation.cancelled() => break,
                _ = sleep(FEEDER_IDLE) => continue,
            }
        };

        tokio::select! {
            _ = cancellation.cancelled() => break,
            sent = dispatch.send_async(endpoint) => {
                if sent.is_err() {
                    break;
                }
            }
        }
    }
    trace!("feeder exited");
}

/// One slot of the connection pool: drain the dispatch channel, run a
/// session per endpoint, keep the shared counters honest.
#[allow(clippy::too_many_arguments)]
pub(crate) async fn worker(
    id: usize,
    dispatch: chan::Receiver<Endpoint>,
    counters: Arc<Counters>,
    config: SessionConfig,
    intake: chan::Sender<Vec<String>>,
    results: chan::Sender<Endpoint>,
    ui: chan::Sender<UiEvent>,
    cancellation: CancellationToken,
) {
    trace!("conn_{id} worker started");
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            endpoint = dispatch.recv_async() => {
                let Ok(endpoint) = endpoint else { break };

                counters.session_started();
                let session = PeerSession::new(
                    endpoint,
                    config.clone(),
                    intake.clone(),
                    results.clone(),
                    ui.clone(),
                );
                let status = session.run(cancellation.clone()).await;
                if status == Status::Dead {
                    counters.mark_dead();
                }
                counters.session_finished();
            }
        }
    }
    trace!("conn_{id} worker exited");
}

/// Collects endpoints whose handshake completed and persists the list
/// whenever it has grown since the last tick. A failed save is retried on
/// the next tick; it never stops the crawl.
pub(crate) async fn collector<S: GoodPeerStore>(
    results: chan::Receiver<Endpoint>,
    good: Arc<Mutex<Vec<Endpoint>>>,
    store: Arc<S>,
    port: u16,
    cancellation: CancellationToken,
) {
    trace!("collector started");
    let mut ticker = interval(SAVE_INTERVAL);
    let mut saved = 0;

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            endpoint = results.recv_async() => {
                let Ok(endpoint) = endpoint else { break };
                info!("{endpoint} is good");
                good.lock().expect("good list lock poisoned").push(endpoint);
            }
            _ = ticker.tick() => {
                let snapshot: Vec<String> = {
                    let good = good.lock().expect("good list lock poisoned");
                    if good.len() == saved {
                        continue;
                    }
                    good.iter().map(|endpoint| endpoint.bracketed(port)).collect()
                };

                match store.save(&snapshot).await {
                    Ok(()) => {
                        info!("saved {} nodes", snapshot.len());
                        saved = snapshot.len();
                    }
                    Err(err) => error!("failed to save nodes: {err}"),
                }
            }
        }
    }
    trace!("collector exited");
}

/// Samples the crawl counters on a fixed cadence and pushes a snapshot at
/// the UI sink. Snapshots are dropped when the sink lags.
pub(crate) async fn sampler(
    registry: Arc<AddressRegistry>,
    counters: Arc<Counters>,
    good: Arc<Mutex<Vec<Endpoint>>>,
    connections: usize,
    ui: chan::Sender<UiEvent>,
    cancellation: CancellationToken,
) {
    trace!("sampler started");
    let mut ticker = interval(SAMPLE_INTERVAL);

    loop {
        tokio::select! {
            _ = cancellation.cancelled() => break,
            _ = ticker.tick() => {
                let snapshot = MetricsSnapshot {
                    active_connections: counters.active(),
                    total_seen: registry.total_seen(),
                    queued: registry.queue_len(),
                    good: good.lock().expect("good list lock poisoned").len(),
                    dead: counters.dead(),
                    timestamp: SystemTime::now(),
                };
                debug!(
                    "stat: total:{}, connected:{}/{}, queued:{}, good:{}, dead:{}",
                    snapshot.total_seen,
                    snapshot.active_connections,
                    connections,
                    snapshot.queued,
                    snapshot.good,
                    snapshot.dead,
                );
                let _ = ui.try_send(UiEvent::Snapshot(snapshot));
            }
        }
    }
    trace!("sampler exited");
}

/// Optional self-stop: once the queue has drained and no session is in
/// flight for a few consecutive ticks, cancel the crawl scope.
pub(crate) async fn idle_watcher(
    registry: Arc<AddressRegistry>,
    counters: Arc<Counters>,
    scope: CancellationToken,
) {
    const STRIKES: u32 = 3;

    let mut ticker = interval(Duration::from_secs(1));
    let mut strikes = 0;

    loop {
        tokio::select! {
            _ = scope.cancelled() => return,
            _ = ticker.tick() => {
                let drained = registry.total_seen() > 0
                    && registry.queue_len() == 0
                    && counters.active() == 0;
                strikes = if drained { strikes + 1 } else { 0 };

                if strikes >= STRIKES {
                    info!("crawl drained, stopping");
                    scope.cancel();
                    return;
                }
            }
        }
    }
}
