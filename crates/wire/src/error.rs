//! Codec error taxonomy.

use std::io;

use bitcoin::consensus::encode;
use bitcoin::network::Magic;
use thiserror::Error;

/// Errors produced while reading frames off the wire.
///
/// Note that an unknown command is *not* an error: well-framed messages the
/// crawler does not understand decode to [`NetworkMessage::Unknown`] so the
/// listener can skip them.
///
/// [`NetworkMessage::Unknown`]: crate::message::NetworkMessage::Unknown
#[derive(Debug, Error)]
pub enum Error {
    /// The frame checksum did not match the payload.
    #[error("payload checksum mismatch")]
    Checksum,
    /// The input ended before a whole frame was available.
    #[error("truncated frame")]
    Truncated,
    /// The frame carried the magic of a different network.
    #[error("wrong network magic: {0}")]
    WrongMagic(Magic),
    /// The payload could not be decoded as its command's message type.
    #[error("malformed payload: {0}")]
    Malformed(encode::Error),
    /// An I/O error from the underlying stream.
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<encode::Error> for Error {
    fn from(err: encode::Error) -> Self {
        match err {
            encode::Error::InvalidChecksum { .. } => Error::Checksum,
            encode::Error::Io(ref io_err) if io_err.kind() == io::ErrorKind::UnexpectedEof => {
                Error::Truncated
            }
            err => Error::Malformed(err),
        }
    }
}
