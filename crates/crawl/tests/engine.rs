//! End-to-end crawl against a mock peer on loopback.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use bitcoin::network::address::{AddrV2, AddrV2Message};
use bitcoin::network::constants::ServiceFlags;
use sonar_crawl::{CrawlConfig, Endpoint, Engine, GoodPeerStore};
use sonar_wire::{message, NetworkMessage, Network, RawNetworkMessage};

/// Store handing out its save history, so the test can watch persistence.
#[derive(Clone, Default)]
struct MemoryStore {
    saves: Arc<Mutex<Vec<Vec<String>>>>,
}

#[async_trait]
impl GoodPeerStore for MemoryStore {
    async fn save(&self, peers: &[String]) -> eyre::Result<()> {
        self.saves.lock().unwrap().push(peers.to_vec());
        Ok(())
    }
}

fn frame(payload: NetworkMessage) -> Vec<u8> {
    message::serialize(&RawNetworkMessage {
        magic: Network::Mainnet.magic(),
        payload,
    })
}

/// A peer that completes the handshake and shares three fake addresses.
async fn mock_peer() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

async fn serve_one(listener: &TcpListener) {
    let (mut stream, _) = listener.accept().await.unwrap();

    let version = message::build_version(70016, "/mock:0.1.0/", 1);
    stream
        .write_all(&frame(NetworkMessage::Version(version)))
        .await
        .unwrap();
    stream.write_all(&frame(NetworkMessage::Verack)).await.unwrap();

    let records = [
        AddrV2::Ipv4("203.0.113.1".parse().unwrap()),
        AddrV2::Ipv4("203.0.113.2".parse().unwrap()),
        AddrV2::Ipv6("2001:db8::1".parse().unwrap()),
    ]
    .into_iter()
    .map(|addr| AddrV2Message {
        time: 1_700_000_000,
        services: ServiceFlags::NETWORK,
        addr,
        port: 8333,
    })
    .collect();
    stream
        .write_all(&frame(NetworkMessage::AddrV2(records)))
        .await
        .unwrap();

    let mut sink = [0u8; 1024];
    while matches!(stream.read(&mut sink).await, Ok(n) if n > 0) {}
}

#[tokio::test]
async fn cold_start_with_one_good_peer() {
    let (listener, port) = mock_peer().await;
    tokio::spawn(async move {
        // The crawl will also dial the three shared addresses at this port;
        // only the seed connection gets served.
        serve_one(&listener).await;
    });

    let mut config = CrawlConfig::new(Network::Mainnet);
    config.connections = 4;
    config.session.port = port;
    config.session.dial_timeout = Duration::from_millis(300);
    config.session.ping_timeout = Duration::from_millis(500);
    config.session.settle = Duration::from_millis(50);

    let store = MemoryStore::default();
    let saves = store.saves.clone();

    let engine = Engine::new(config, store);
    engine.add_seeds(vec!["127.0.0.1".to_owned()]);

    let registry = engine.registry();
    let counters = engine.counters();

    let cancellation = CancellationToken::new();
    let handle = tokio::spawn(engine.run(cancellation.clone()));

    // Give the crawl time to handshake, fan out and hit the save tick.
    let deadline = timeout(Duration::from_secs(10), async {
        loop {
            if registry.total_seen() == 4 && !saves.lock().unwrap().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(deadline.is_ok(), "crawl never reached the expected state");

    cancellation.cancel();
    timeout(Duration::from_secs(5), handle)
        .await
        .expect("engine unwound promptly")
        .unwrap();

    // The seed completed the handshake; the fan-out targets did not.
    let last_save = saves.lock().unwrap().last().unwrap().clone();
    assert_eq!(last_save, vec![format!("[127.0.0.1]:{port}")]);

    // Every address the peer shared landed in the seen-set exactly once.
    assert_eq!(registry.total_seen(), 4);
    assert_eq!(counters.active(), 0);
}

#[tokio::test]
async fn good_endpoints_survive_in_order() {
    // Plain unit-level check of the snapshot formatting path.
    let store = MemoryStore::default();
    store
        .save(&[Endpoint::new("2001:db8::1").bracketed(8333)])
        .await
        .unwrap();
    assert_eq!(
        store.saves.lock().unwrap()[0],
        vec!["[2001:db8::1]:8333".to_owned()]
    );
}
