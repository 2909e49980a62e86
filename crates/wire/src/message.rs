//! Peer-to-peer network messages.
//!
//! Frames are laid out as: 4-byte network magic, 12-byte NUL-padded ASCII
//! command, 4-byte little-endian payload length, 4-byte checksum (leading
//! bytes of the double-SHA-256 of the payload), then the payload itself.

use std::io::{self, Read};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::{SystemTime, UNIX_EPOCH};

use bitcoin::consensus::{
    encode::{self, CheckedData},
    Decodable, Encodable,
};
use bitcoin::network::address::{Address, AddrV2Message};
use bitcoin::network::constants::ServiceFlags;
use bitcoin::network::message::CommandString;
use bitcoin::network::message_blockdata::{GetHeadersMessage, Inventory};
use bitcoin::network::message_network::VersionMessage;
use bitcoin::network::Magic;

/// Frames advertising a larger payload than this are rejected outright.
const MAX_MSG_SIZE: u64 = 5_000_000;

/// Raw message which is sent between peers.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct RawNetworkMessage {
    pub magic: Magic,
    pub payload: NetworkMessage,
}

/// The commands this crawler sends or expects to receive.
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum NetworkMessage {
    /// VERSION method. Opens the handshake.
    Version(VersionMessage),

    /// VERACK method.
    Verack,

    /// SENDADDRV2 method. Signals willingness to receive `addrv2`.
    SendAddrV2,

    /// GETADDR method. Asks the peer for its view of the network.
    GetAddr,

    /// ADDR method. Timestamped legacy address records.
    Addr(Vec<(u32, Address)>),

    /// ADDRV2 method. BIP-155 address records.
    AddrV2(Vec<AddrV2Message>),

    /// PING method. Contains a random nonce.
    Ping(u64),

    /// PONG method. Echoes the nonce of the ping it answers.
    Pong(u64),

    /// INV method. Parsed and logged only; the crawler does not relay.
    Inv(Vec<Inventory>),

    /// FEEFILTER method. Parsed and logged only.
    FeeFilter(i64),

    /// GETHEADERS method. Parsed and logged only.
    GetHeaders(GetHeadersMessage),

    /// Any other well-framed message.
    Unknown {
        /// The command of this message.
        command: CommandString,
        /// The payload of this message.
        payload: Vec<u8>,
    },
}

impl NetworkMessage {
    pub fn cmd(&self) -> &'static str {
        match *self {
            NetworkMessage::Version(_) => "version",
            NetworkMessage::Verack => "verack",
            NetworkMessage::SendAddrV2 => "sendaddrv2",
            NetworkMessage::GetAddr => "getaddr",
            NetworkMessage::Addr(_) => "addr",
            NetworkMessage::AddrV2(_) => "addrv2",
            NetworkMessage::Ping(_) => "ping",
            NetworkMessage::Pong(_) => "pong",
            NetworkMessage::Inv(_) => "inv",
            NetworkMessage::FeeFilter(_) => "feefilter",
            NetworkMessage::GetHeaders(_) => "getheaders",
            NetworkMessage::Unknown { .. } => "unknown",
        }
    }

    /// Return the CommandString for the message command.
    pub fn command(&self) -> CommandString {
        match self {
            NetworkMessage::Unknown { command, .. } => command.clone(),
            _ => CommandString::try_from_static(self.cmd()).expect("cmd returns valid commands"),
        }
    }
}

impl RawNetworkMessage {
    /// Return the CommandString for the message command.
    pub fn command(&self) -> CommandString {
        self.payload.command()
    }
}

impl Encodable for RawNetworkMessage {
    fn consensus_encode<W: io::Write + ?Sized>(&self, w: &mut W) -> Result<usize, io::Error> {
        let mut len = 0;
        len += self.magic.consensus_encode(w)?;
        len += self.command().consensus_encode(w)?;
        len += CheckedData(match self.payload {
            NetworkMessage::Version(ref dat) => serialize(dat),
            NetworkMessage::Addr(ref dat) => serialize(dat),
            NetworkMessage::AddrV2(ref dat) => serialize(dat),
            NetworkMessage::Ping(ref dat) => serialize(dat),
            NetworkMessage::Pong(ref dat) => serialize(dat),
            NetworkMessage::Inv(ref dat) => serialize(dat),
            NetworkMessage::FeeFilter(ref dat) => serialize(dat),
            NetworkMessage::GetHeaders(ref dat) => serialize(dat),
            NetworkMessage::Verack
            | NetworkMessage::SendAddrV2
            | NetworkMessage::GetAddr => vec![],
            NetworkMessage::Unknown {
                payload: ref dat, ..
            } => serialize(dat),
        })
        .consensus_encode(w)?;
        Ok(len)
    }
}

impl Decodable for RawNetworkMessage {
    fn consensus_decode_from_finite_reader<R: io::Read + ?Sized>(
        r: &mut R,
    ) -> Result<Self, encode::Error> {
        let magic = Decodable::consensus_decode(r)?;
        let cmd = CommandString::consensus_decode(r)?;
        let raw_payload = CheckedData::consensus_decode(r)?.0;

        let mut mem_d = io::Cursor::new(raw_payload);

        let payload = match &cmd.to_string()[..] {
            "version" => NetworkMessage::Version(Decodable::consensus_decode(&mut mem_d)?),
            "verack" => NetworkMessage::Verack,
            "sendaddrv2" => NetworkMessage::SendAddrV2,
            "getaddr" => NetworkMessage::GetAddr,
            "addr" => NetworkMessage::Addr(Decodable::consensus_decode(&mut mem_d)?),
            "addrv2" => NetworkMessage::AddrV2(Decodable::consensus_decode(&mut mem_d)?),
            "ping" => NetworkMessage::Ping(Decodable::consensus_decode(&mut mem_d)?),
            "pong" => NetworkMessage::Pong(Decodable::consensus_decode(&mut mem_d)?),
            "inv" => NetworkMessage::Inv(Decodable::consensus_decode(&mut mem_d)?),
            "feefilter" => NetworkMessage::FeeFilter(Decodable::consensus_decode(&mut mem_d)?),
            "getheaders" => NetworkMessage::GetHeaders(Decodable::consensus_decode(&mut mem_d)?),
            _ => NetworkMessage::Unknown {
                command: cmd,
                payload: mem_d.into_inner(),
            },
        };
        Ok(RawNetworkMessage { magic, payload })
    }

    #[inline]
    fn consensus_decode<R: Read + ?Sized>(r: &mut R) -> Result<Self, encode::Error> {
        Self::consensus_decode_from_finite_reader(r.take(MAX_MSG_SIZE).by_ref())
    }
}

/// Serialize a value with Bitcoin consensus encoding.
pub fn serialize<T: Encodable + ?Sized>(data: &T) -> Vec<u8> {
    let mut encoder = Vec::new();
    let len = data
        .consensus_encode(&mut encoder)
        .expect("in-memory writers don't error");
    debug_assert_eq!(len, encoder.len());
    encoder
}

/// Build the `version` message that opens the handshake with a peer.
///
/// The receiver record is a placeholder: peers don't use it, and advertising
/// the dialed address proved unreliable in practice.
pub fn build_version(protocol_version: u32, user_agent: &str, nonce: u64) -> VersionMessage {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default();

    let receiver = Address::new(
        &SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 0),
        ServiceFlags::NETWORK,
    );
    let sender = Address {
        services: ServiceFlags::NETWORK,
        address: [0; 8],
        port: 0,
    };

    VersionMessage {
        version: protocol_version,
        services: ServiceFlags::NETWORK,
        timestamp,
        receiver,
        sender,
        nonce,
        user_agent: user_agent.to_owned(),
        start_height: 0,
        relay: false,
    }
}

#[cfg(test)]
mod tests {
    use std::net::Ipv6Addr;

    use bitcoin::consensus::deserialize;
    use bitcoin::hashes::Hash;
    use bitcoin::network::address::AddrV2;
    use bitcoin::BlockHash;

    use crate::Network;

    use super::*;

    fn roundtrip(payload: NetworkMessage) {
        let msg = RawNetworkMessage {
            magic: Network::Mainnet.magic(),
            payload,
        };
        let bytes = serialize(&msg);
        let decoded: RawNetworkMessage = deserialize(&bytes).expect("decodes");
        assert_eq!(decoded, msg);
    }

    #[test]
    fn roundtrips_every_supported_message() {
        roundtrip(NetworkMessage::Version(build_version(
            crate::PROTOCOL_VERSION,
            crate::USER_AGENT,
            7,
        )));
        roundtrip(NetworkMessage::Verack);
        roundtrip(NetworkMessage::SendAddrV2);
        roundtrip(NetworkMessage::GetAddr);
        roundtrip(NetworkMessage::Addr(vec![(
            1_700_000_000,
            Address::new(
                &SocketAddr::new(IpAddr::V4(Ipv4Addr::new(203, 0, 113, 1)), 8333),
                ServiceFlags::NETWORK,
            ),
        )]));
        roundtrip(NetworkMessage::AddrV2(vec![AddrV2Message {
            time: 1_700_000_000,
            services: ServiceFlags::NETWORK,
            addr: AddrV2::Ipv6(Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1)),
            port: 8333,
        }]));
        roundtrip(NetworkMessage::Ping(0xDEAD_BEEF));
        roundtrip(NetworkMessage::Pong(0xDEAD_BEEF));
        roundtrip(NetworkMessage::Inv(vec![Inventory::Block(
            BlockHash::all_zeros(),
        )]));
        roundtrip(NetworkMessage::FeeFilter(1_000));
        roundtrip(NetworkMessage::GetHeaders(GetHeadersMessage::new(
            vec![BlockHash::all_zeros()],
            BlockHash::all_zeros(),
        )));
    }

    #[test]
    fn unknown_command_decodes_to_unknown() {
        let msg = RawNetworkMessage {
            magic: Network::Mainnet.magic(),
            payload: NetworkMessage::Unknown {
                command: CommandString::try_from_static("sendcmpct").unwrap(),
                payload: vec![0x00, 0x02, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00],
            },
        };
        let bytes = serialize(&msg);
        let decoded: RawNetworkMessage = deserialize(&bytes).expect("unknown frames still decode");
        assert_eq!(decoded, msg);
        assert_eq!(decoded.command().to_string(), "sendcmpct");
    }

    #[test]
    fn checksum_flip_is_rejected() {
        let msg = RawNetworkMessage {
            magic: Network::Mainnet.magic(),
            payload: NetworkMessage::Ping(99),
        };
        let mut bytes = serialize(&msg);
        // Flip one bit in the payload; the checksum in the header no longer matches.
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let err = deserialize::<RawNetworkMessage>(&bytes).unwrap_err();
        assert!(matches!(err, encode::Error::InvalidChecksum { .. }));
    }

    #[test]
    fn version_builder_sets_advertised_fields() {
        let version = build_version(70016, "/sonar:0.1.0/", 42);
        assert_eq!(version.version, 70016);
        assert_eq!(version.user_agent, "/sonar:0.1.0/");
        assert_eq!(version.nonce, 42);
        assert_eq!(version.start_height, 0);
        assert!(!version.relay);
    }
}
