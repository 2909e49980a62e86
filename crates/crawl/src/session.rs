//! Per-peer probe session.
//!
//! A session owns one TCP connection from dial to close. The sender half
//! drives the handshake and keepalive pings; the listener half decodes
//! whatever the peer says and feeds address batches back into the crawl.
//! Neither half shares mutable state with the other: the listener reports
//! events over a small channel and both watch the session token.

use std::io;
use std::time::Duration;

use flume as chan;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::{interval, sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use bitcoin::network::address::AddrV2;
use sonar_wire::{message, Decoder, Network, NetworkMessage, RawNetworkMessage};

use crate::metrics::UiEvent;
use crate::Endpoint;

/// Read buffer size for the listener half.
const READ_BUFFER: usize = 4096;

/// Pause between completing the handshake and asking for peers.
const GETADDR_DELAY: Duration = Duration::from_secs(1);

/// Session lifecycle states. `Disconnected` and `Dead` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    New,
    Connecting,
    Connected,
    /// The peer was reachable and the session ended after some exchange.
    Disconnected,
    /// The TCP dial failed.
    Dead,
}

/// Tunables for a single probe.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub network: Network,
    /// Port to dial. Defaults to the network's well-known port.
    pub port: u16,
    pub protocol_version: u32,
    pub user_agent: String,
    /// TCP dial deadline. A dial that misses it marks the endpoint dead.
    pub dial_timeout: Duration,
    /// How long the keepalive phase waits for a pong (or an address batch)
    /// before the session gives up.
    pub ping_timeout: Duration,
    /// Interval between keepalive pings.
    pub ping_interval: Duration,
    /// Ping retry budget.
    pub ping_retries: u8,
    /// How long to wait for the peer's `version` before acking anyway.
    pub settle: Duration,
}

impl SessionConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            network,
            port: network.port(),
            protocol_version: sonar_wire::PROTOCOL_VERSION,
            user_agent: sonar_wire::USER_AGENT.to_owned(),
            dial_timeout: Duration::from_secs(5),
            ping_timeout: Duration::from_secs(15),
            ping_interval: Duration::from_secs(60),
            ping_retries: 3,
            settle: Duration::from_secs(2),
        }
    }
}

/// What the listener tells the sender about.
#[derive(Debug)]
enum PeerEvent {
    Version(u32),
    Verack,
    Ping(u64),
    Pong(u64),
    /// An address batch was delivered to the intake channel; the probe got
    /// what it came for.
    AddrsReceived(usize),
    /// The peer closed the connection or the stream broke.
    Closed,
}

/// Reasons the protocol conversation stops early.
#[derive(Debug, Error)]
enum SessionError {
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("crawl engine is gone")]
    EngineClosed,
}

/// One outbound probe of one endpoint.
pub struct PeerSession {
    endpoint: Endpoint,
    status: Status,
    ping_nonce: u64,
    pong_count: u8,
    peer_version: Option<u32>,
    config: SessionConfig,
    intake: chan::Sender<Vec<String>>,
    results: chan::Sender<Endpoint>,
    ui: chan::Sender<UiEvent>,
    rng: fastrand::Rng,
}

impl PeerSession {
    pub fn new(
        endpoint: Endpoint,
        config: SessionConfig,
        intake: chan::Sender<Vec<String>>,
        results: chan::Sender<Endpoint>,
        ui: chan::Sender<UiEvent>,
    ) -> Self {
        let mut rng = fastrand::Rng::new();
        let ping_nonce = next_nonce(&mut rng);

        Self {
            endpoint,
            status: Status::New,
            ping_nonce,
            pong_count: 0,
            peer_version: None,
            config,
            intake,
            results,
            ui,
            rng,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Protocol version the peer reported, once its `version` arrived.
    pub fn peer_version(&self) -> Option<u32> {
        self.peer_version
    }

    /// Run the session to completion and return the terminal status.
    pub async fn run(mut self, cancellation: CancellationToken) -> Status {
        let tag = format!("▶︎ {}", self.endpoint);

        self.status = Status::Connecting;
        let Some(addr) = self.endpoint.socket_addr(self.config.port) else {
            debug!("{tag} not a dialable address");
            self.status = Status::Dead;
            return self.status;
        };

        debug!("{tag} connecting...");
        let stream = tokio::select! {
            _ = cancellation.cancelled() => {
                self.status = Status::Disconnected;
                return self.status;
            }
            dialed = timeout(self.config.dial_timeout, TcpStream::connect(addr)) => {
                match dialed {
                    Ok(Ok(stream)) => stream,
                    Ok(Err(err)) => {
                        debug!("{tag} failed to connect: {err}");
                        self.status = Status::Dead;
                        return self.status;
                    }
                    Err(_) => {
                        debug!("{tag} dial timed out");
                        self.status = Status::Dead;
                        return self.status;
                    }
                }
            }
        };
        debug!("{tag} connected");
        self.status = Status::Connected;

        let session = cancellation.child_token();
        let (events_tx, events_rx) = chan::bounded(16);
        let (reader, mut writer) = stream.into_split();

        let listener = tokio::spawn(listen(
            reader,
            self.endpoint.clone(),
            self.config.network,
            session.clone(),
            events_tx,
            self.intake.clone(),
            self.ui.clone(),
        ));

        if let Err(err) = self.talk(&mut writer, &events_rx, &session).await {
            warn!("{tag} session ended: {err}");
        }

        // Unwind the listener and close the socket before reporting terminal
        // state; no task of this session outlives `run`.
        session.cancel();
        let _ = writer.shutdown().await;
        let _ = listener.await;

        self.status = Status::Disconnected;
        debug!("{tag} closed");
        self.status
    }

    /// The sender half: handshake, getaddr, keepalive.
    async fn talk(
        &mut self,
        writer: &mut OwnedWriteHalf,
        events: &chan::Receiver<PeerEvent>,
        session: &CancellationToken,
    ) -> Result<(), SessionError> {
        let tag = format!("▶︎ {}", self.endpoint);

        trace!("{tag} sending version...");
        let nonce = self.next_nonce();
        let version =
            message::build_version(self.config.protocol_version, &self.config.user_agent, nonce);
        self.write(writer, NetworkMessage::Version(version)).await?;

        // Address-format negotiation has to happen before the ack.
        trace!("{tag} sending sendaddrv2...");
        self.write(writer, NetworkMessage::SendAddrV2).await?;

        self.await_version(events, session).await;
        trace!("{tag} sending verack...");
        self.write(writer, NetworkMessage::Verack).await?;

        // Handshake complete: report the endpoint as good, then keep going
        // to collect its view of the network.
        if self.results.send_async(self.endpoint.clone()).await.is_err() {
            return Err(SessionError::EngineClosed);
        }
        self.send_ui(format!("{tag} handshake complete"));

        tokio::select! {
            _ = session.cancelled() => return Ok(()),
            _ = sleep(GETADDR_DELAY) => {}
        }
        trace!("{tag} sending getaddr...");
        self.write(writer, NetworkMessage::GetAddr).await?;

        // Keepalive: hold the connection open while the peer assembles its
        // addr response, pinging until the budget or the phase timeout runs
        // out.
        let mut ticker = interval(self.config.ping_interval);
        let deadline = sleep(self.config.ping_timeout);
        tokio::pin!(deadline);
        let mut pings_sent: u8 = 0;

        loop {
            tokio::select! {
                _ = session.cancelled() => return Ok(()),
                _ = &mut deadline => {
                    debug!("{tag} ping timeout");
                    return Ok(());
                }
                event = events.recv_async() => {
                    let Ok(event) = event else { return Ok(()) };
                    if self.handle_event(event) {
                        return Ok(());
                    }
                }
                _ = ticker.tick() => {
                    if self.pong_count >= 1 {
                        debug!("{tag} pong count reached");
                        return Ok(());
                    }
                    if pings_sent >= self.config.ping_retries {
                        debug!("{tag} ping retry count reached");
                        return Ok(());
                    }
                    trace!("{tag} sending ping...");
                    let nonce = self.next_nonce();
                    self.write(writer, NetworkMessage::Ping(nonce)).await?;
                    pings_sent += 1;
                }
            }
        }
    }

    /// Wait for the peer's `version`, bounded by the settle interval. A
    /// silent peer doesn't stall the handshake; we ack anyway once the
    /// interval elapses.
    async fn await_version(
        &mut self,
        events: &chan::Receiver<PeerEvent>,
        session: &CancellationToken,
    ) {
        let settle = sleep(self.config.settle);
        tokio::pin!(settle);

        loop {
            tokio::select! {
                _ = session.cancelled() => return,
                _ = &mut settle => return,
                event = events.recv_async() => {
                    match event {
                        Ok(PeerEvent::Version(version)) => {
                            self.peer_version = Some(version);
                            return;
                        }
                        Ok(event) => {
                            if self.handle_event(event) {
                                return;
                            }
                        }
                        Err(_) => return,
                    }
                }
            }
        }
    }

    /// Apply a listener event. Returns `true` once the session is done.
    fn handle_event(&mut self, event: PeerEvent) -> bool {
        match event {
            PeerEvent::Version(version) => {
                self.peer_version = Some(version);
                false
            }
            PeerEvent::Verack => false,
            // The crawler only probes; inbound pings are noted, not answered.
            PeerEvent::Ping(_) => false,
            PeerEvent::Pong(nonce) => {
                if nonce == self.ping_nonce {
                    debug!("▶︎ {} pong ok", self.endpoint);
                    self.pong_count += 1;
                    self.next_nonce();
                    true
                } else {
                    warn!(
                        "▶︎ {} pong nonce mismatch, expected {}, got {}",
                        self.endpoint, self.ping_nonce, nonce
                    );
                    false
                }
            }
            PeerEvent::AddrsReceived(_) | PeerEvent::Closed => true,
        }
    }

    /// Draw a fresh nonce; every outbound ping carries a new one and pongs
    /// are matched against the latest only.
    fn next_nonce(&mut self) -> u64 {
        self.ping_nonce = next_nonce(&mut self.rng);
        self.ping_nonce
    }

    async fn write(
        &self,
        writer: &mut OwnedWriteHalf,
        payload: NetworkMessage,
    ) -> Result<(), SessionError> {
        let raw = RawNetworkMessage {
            magic: self.config.network.magic(),
            payload,
        };
        writer.write_all(&message::serialize(&raw)).await?;
        Ok(())
    }

    fn send_ui(&self, message: String) {
        let _ = self.ui.try_send(UiEvent::Message(message));
    }
}

/// Nonces are drawn uniformly from 62 bits.
fn next_nonce(rng: &mut fastrand::Rng) -> u64 {
    rng.u64(..1 << 62)
}

/// The listener half: decode frames until the peer hangs up, a frame fails
/// to parse, or the session is cancelled.
async fn listen(
    mut reader: OwnedReadHalf,
    endpoint: Endpoint,
    network: Network,
    session: CancellationToken,
    events: chan::Sender<PeerEvent>,
    intake: chan::Sender<Vec<String>>,
    ui: chan::Sender<UiEvent>,
) {
    let tag = format!("◀︎ {}", endpoint);
    let mut decoder = Decoder::new(network.magic(), READ_BUFFER);
    let mut buf = vec![0u8; READ_BUFFER];

    loop {
        loop {
            match decoder.decode_next() {
                Ok(Some(msg)) => {
                    if handle_message(&tag, msg.payload, &events, &intake, &ui) == Handled::Done {
                        session.cancel();
                        return;
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!("{tag} {err}");
                    let _ = events.try_send(PeerEvent::Closed);
                    session.cancel();
                    return;
                }
            }
        }

        tokio::select! {
            _ = session.cancelled() => return,
            read = reader.read(&mut buf) => match read {
                Ok(0) => {
                    debug!("{tag} EOF");
                    let _ = events.try_send(PeerEvent::Closed);
                    session.cancel();
                    return;
                }
                Ok(n) => decoder.input(&buf[..n]),
                Err(err) => {
                    debug!("{tag} read error: {err}");
                    let _ = events.try_send(PeerEvent::Closed);
                    session.cancel();
                    return;
                }
            }
        }
    }
}

#[derive(PartialEq)]
enum Handled {
    Continue,
    /// The probe got what it came for; hang up.
    Done,
}

fn handle_message(
    tag: &str,
    msg: NetworkMessage,
    events: &chan::Sender<PeerEvent>,
    intake: &chan::Sender<Vec<String>>,
    ui: &chan::Sender<UiEvent>,
) -> Handled {
    match msg {
        NetworkMessage::Version(version) => {
            debug!(
                "{tag} version {} agent {} height {}",
                version.version, version.user_agent, version.start_height
            );
            let _ = events.try_send(PeerEvent::Version(version.version));
        }
        NetworkMessage::Verack => {
            debug!("{tag} verack");
            let _ = events.try_send(PeerEvent::Verack);
        }
        NetworkMessage::Ping(nonce) => {
            debug!("{tag} ping {nonce}");
            let _ = events.try_send(PeerEvent::Ping(nonce));
        }
        NetworkMessage::Pong(nonce) => {
            debug!("{tag} pong {nonce}");
            let _ = events.try_send(PeerEvent::Pong(nonce));
        }
        NetworkMessage::Addr(list) => {
            debug!("{tag} addr with {} records", list.len());
            let batch: Vec<String> = list
                .iter()
                .filter_map(|(_, addr)| addr.socket_addr().ok())
                .map(|addr| addr.ip().to_string())
                .collect();
            return deliver(tag, batch, events, intake, ui);
        }
        NetworkMessage::AddrV2(list) => {
            debug!("{tag} addrv2 with {} records", list.len());
            let batch: Vec<String> = list
                .iter()
                .filter_map(|record| match &record.addr {
                    AddrV2::Ipv4(ip) => Some(ip.to_string()),
                    AddrV2::Ipv6(ip) => Some(ip.to_string()),
                    // Networks we can't dial (Tor, I2P, CJDNS).
                    _ => None,
                })
                .collect();
            return deliver(tag, batch, events, intake, ui);
        }
        NetworkMessage::Inv(items) => {
            debug!("{tag} inv with {} items", items.len());
        }
        NetworkMessage::FeeFilter(fee) => {
            debug!("{tag} feefilter {fee}");
        }
        NetworkMessage::GetHeaders(msg) => {
            debug!("{tag} getheaders with {} locators", msg.locator_hashes.len());
        }
        NetworkMessage::SendAddrV2 | NetworkMessage::GetAddr => {
            trace!("{tag} {} (ignored)", msg.cmd());
        }
        NetworkMessage::Unknown { command, .. } => {
            debug!("{tag} unknown message {command}, ignoring");
        }
    }
    Handled::Continue
}

/// Push an address batch upstream and end the session; one batch is all a
/// probe wants from a peer.
fn deliver(
    tag: &str,
    batch: Vec<String>,
    events: &chan::Sender<PeerEvent>,
    intake: &chan::Sender<Vec<String>>,
    ui: &chan::Sender<UiEvent>,
) -> Handled {
    let count = batch.len();
    if count > 0 {
        match intake.try_send(batch) {
            Ok(()) => {}
            Err(chan::TrySendError::Full(_)) => {
                warn!("{tag} address intake full, dropping {count} addresses");
            }
            Err(chan::TrySendError::Disconnected(_)) => {}
        }
    }
    let _ = ui.try_send(UiEvent::Message(format!("{tag} got {count} addresses")));
    let _ = events.try_send(PeerEvent::AddrsReceived(count));
    Handled::Done
}
