//! The concurrent crawl engine.
//!
//! Seeds go into the [`AddressRegistry`], a bounded worker pool drains them
//! into [`PeerSession`]s, sessions feed the addresses their peers share back
//! into the registry, and endpoints that complete the handshake are collected
//! and periodically handed to the persistence sink.

pub mod endpoint;
pub mod engine;
pub mod metrics;
pub mod registry;
pub mod session;
mod store;
mod workers;

pub use endpoint::Endpoint;
pub use engine::{CrawlConfig, Engine};
pub use metrics::{Counters, MetricsSnapshot, UiEvent};
pub use registry::AddressRegistry;
pub use session::{PeerSession, SessionConfig, Status};
pub use store::GoodPeerStore;
