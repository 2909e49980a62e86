//! Crawl counters and the snapshot record published to the UI sink.

use std::sync::atomic::{AtomicI32, AtomicU32, Ordering};
use std::time::SystemTime;

use serde::Serialize;

/// Counters shared across the worker pool.
#[derive(Debug, Default)]
pub struct Counters {
    active: AtomicI32,
    dead: AtomicU32,
}

impl Counters {
    pub fn session_started(&self) {
        self.active.fetch_add(1, Ordering::Relaxed);
    }

    pub fn session_finished(&self) {
        self.active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn mark_dead(&self) {
        self.dead.fetch_add(1, Ordering::Relaxed);
    }

    /// Sessions currently between dial and close.
    pub fn active(&self) -> i32 {
        self.active.load(Ordering::Relaxed)
    }

    /// Endpoints whose dial failed.
    pub fn dead(&self) -> u32 {
        self.dead.load(Ordering::Relaxed)
    }
}

/// A point-in-time sample of the crawl, produced on a fixed cadence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    /// Sessions currently between dial and close.
    pub active_connections: i32,
    /// Size of the seen-set.
    pub total_seen: usize,
    /// Endpoints awaiting dispatch.
    pub queued: usize,
    /// Endpoints that completed the handshake.
    pub good: usize,
    /// Endpoints whose dial failed.
    pub dead: u32,
    pub timestamp: SystemTime,
}

/// Events published on the UI channel.
///
/// Snapshots are periodic and lossy; messages are session milestones already
/// tagged with their origin prefix (`▶︎` outbound, `◀︎` inbound).
#[derive(Debug, Clone)]
pub enum UiEvent {
    Snapshot(MetricsSnapshot),
    Message(String),
}
