//! UI sink: renders crawl snapshots and session messages as log lines.

use flume as chan;
use tokio_util::sync::CancellationToken;
use tracing::info;

use sonar_crawl::UiEvent;

pub async fn consume(events: chan::Receiver<UiEvent>, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            _ = cancellation.cancelled() => return,
            event = events.recv_async() => {
                let Ok(event) = event else { return };
                match event {
                    UiEvent::Snapshot(s) => info!(
                        "conns:{} total:{} queued:{} good:{} dead:{}",
                        s.active_connections, s.total_seen, s.queued, s.good, s.dead,
                    ),
                    UiEvent::Message(message) => info!("{message}"),
                }
            }
        }
    }
}
