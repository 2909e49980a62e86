//! The subset of the Bitcoin peer-to-peer wire protocol spoken by the
//! crawler: message framing, the handshake and address-exchange commands,
//! and a stream decoder for turning raw socket bytes into typed messages.

mod error;
pub mod message;
pub mod network;
pub mod stream;

pub use error::Error;
pub use message::{NetworkMessage, RawNetworkMessage};
pub use network::Network;
pub use stream::Decoder;

/// Protocol version advertised to peers.
pub const PROTOCOL_VERSION: u32 = 70016;

/// User agent advertised in our `version` message.
pub const USER_AGENT: &str = "/sonar:0.1.0/";
