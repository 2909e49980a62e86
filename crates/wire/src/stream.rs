//! Message stream utilities.

use std::io;

use bitcoin::consensus::{deserialize_partial, encode};
use bitcoin::network::Magic;

use crate::error::Error;
use crate::message::RawNetworkMessage;

/// Message stream decoder.
///
/// Turns a byte stream into network messages: feed it whatever the socket
/// produced and drain decoded frames out of it.
#[derive(Debug)]
pub struct Decoder {
    magic: Magic,
    unparsed: Vec<u8>,
}

impl Decoder {
    /// Create a new stream decoder for the given network.
    pub fn new(magic: Magic, capacity: usize) -> Self {
        Self {
            magic,
            unparsed: Vec::with_capacity(capacity),
        }
    }

    /// Input bytes into the decoder.
    pub fn input(&mut self, bytes: &[u8]) {
        self.unparsed.extend_from_slice(bytes);
    }

    /// Decode and return the next message. Returns [`None`] if the buffered
    /// bytes don't hold a whole frame yet.
    pub fn decode_next(&mut self) -> Result<Option<RawNetworkMessage>, Error> {
        match deserialize_partial::<RawNetworkMessage>(self.unparsed.as_slice()) {
            Ok((msg, index)) => {
                self.unparsed.drain(..index);

                if msg.magic != self.magic {
                    return Err(Error::WrongMagic(msg.magic));
                }
                Ok(Some(msg))
            }

            Err(encode::Error::Io(ref err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Parse a single frame from the front of `bytes`, returning the number of
/// bytes consumed alongside the message. A prefix of a valid frame yields
/// [`Error::Truncated`], never a partial message.
pub fn parse(magic: Magic, bytes: &[u8]) -> Result<(usize, RawNetworkMessage), Error> {
    match deserialize_partial::<RawNetworkMessage>(bytes) {
        Ok((msg, index)) => {
            if msg.magic != magic {
                return Err(Error::WrongMagic(msg.magic));
            }
            Ok((index, msg))
        }
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use crate::message::{serialize, NetworkMessage};
    use crate::Network;

    use super::*;

    fn frame(payload: NetworkMessage) -> Vec<u8> {
        serialize(&RawNetworkMessage {
            magic: Network::Mainnet.magic(),
            payload,
        })
    }

    #[test]
    fn decodes_frames_fed_byte_by_byte() {
        let bytes = frame(NetworkMessage::Ping(7));
        let mut decoder = Decoder::new(Network::Mainnet.magic(), 64);

        for byte in &bytes[..bytes.len() - 1] {
            decoder.input(&[*byte]);
            assert!(decoder.decode_next().unwrap().is_none());
        }
        decoder.input(&bytes[bytes.len() - 1..]);

        let msg = decoder.decode_next().unwrap().expect("whole frame buffered");
        assert_eq!(msg.payload, NetworkMessage::Ping(7));
        assert!(decoder.decode_next().unwrap().is_none());
    }

    #[test]
    fn decodes_back_to_back_frames() {
        let mut bytes = frame(NetworkMessage::Verack);
        bytes.extend(frame(NetworkMessage::GetAddr));

        let mut decoder = Decoder::new(Network::Mainnet.magic(), 64);
        decoder.input(&bytes);

        assert_eq!(
            decoder.decode_next().unwrap().unwrap().payload,
            NetworkMessage::Verack
        );
        assert_eq!(
            decoder.decode_next().unwrap().unwrap().payload,
            NetworkMessage::GetAddr
        );
        assert!(decoder.decode_next().unwrap().is_none());
    }

    #[test]
    fn rejects_frames_from_another_network() {
        let bytes = serialize(&RawNetworkMessage {
            magic: Network::Testnet.magic(),
            payload: NetworkMessage::Verack,
        });
        let mut decoder = Decoder::new(Network::Mainnet.magic(), 64);
        decoder.input(&bytes);

        assert!(matches!(decoder.decode_next(), Err(Error::WrongMagic(_))));
    }

    #[test]
    fn parse_reports_truncation() {
        let bytes = frame(NetworkMessage::Ping(7));
        let err = parse(Network::Mainnet.magic(), &bytes[..bytes.len() / 2]).unwrap_err();
        assert!(matches!(err, Error::Truncated));
    }

    #[test]
    fn parse_returns_bytes_consumed() {
        let mut bytes = frame(NetworkMessage::Pong(9));
        let frame_len = bytes.len();
        bytes.extend([0xAA; 16]);

        let (consumed, msg) = parse(Network::Mainnet.magic(), &bytes).unwrap();
        assert_eq!(consumed, frame_len);
        assert_eq!(msg.payload, NetworkMessage::Pong(9));
    }
}
