//! The BitTorrent peer handshake: the fixed 68-byte message exchanged
//! before any wire messages, proving both sides agree on the info-hash.
//!
//! ```text
//! offset size field
//!  0      1  protocol_length = 19
//!  1     19  "BitTorrent protocol"
//! 20      8  reserved (zeros)
//! 28     20  info_hash
//! 48     20  peer_id
//! ```
use std::io::{Read, Write};

use super::PeerError;

const PROTOCOL: &[u8; 19] = b"BitTorrent protocol";

/// A parsed handshake message, ours or a peer's.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handshake {
    pub info_hash: [u8; 20],
    pub peer_id: [u8; 20],
}

impl Handshake {
    pub fn new(info_hash: [u8; 20], peer_id: [u8; 20]) -> Self {
        Self { info_hash, peer_id }
    }

    /// Serializes this handshake into its 68-byte wire layout.
    pub fn serialize(&self) -> [u8; 68] {
        let mut buf = [0u8; 68];
        buf[0] = PROTOCOL.len() as u8;
        buf[1..20].copy_from_slice(PROTOCOL);
        buf[20..28].copy_from_slice(&[0u8; 8]);
        buf[28..48].copy_from_slice(&self.info_hash);
        buf[48..68].copy_from_slice(&self.peer_id);
        buf
    }

    /// Reads a 68-byte handshake off `reader`, without validating its
    /// info-hash against anything — callers that know what they expect
    /// should follow up with [`Handshake::validate`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, PeerError> {
        let mut buf = [0u8; 68];
        reader.read_exact(&mut buf).map_err(map_read_error)?;

        let protocol_len = buf[0];
        if protocol_len as usize != PROTOCOL.len() || &buf[1..20] != PROTOCOL.as_slice() {
            return Err(PeerError::HandshakeProtocolError);
        }

        let mut info_hash = [0u8; 20];
        info_hash.copy_from_slice(&buf[28..48]);
        let mut peer_id = [0u8; 20];
        peer_id.copy_from_slice(&buf[48..68]);

        Ok(Self { info_hash, peer_id })
    }

    /// Writes this handshake's 68-byte wire layout to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), PeerError> {
        writer.write_all(&self.serialize()).map_err(PeerError::ConnectFailed)
    }

    /// Confirms this handshake's info-hash matches `expected`.
    pub fn validate(&self, expected_info_hash: [u8; 20]) -> Result<(), PeerError> {
        if self.info_hash != expected_info_hash {
            return Err(PeerError::HandshakeInfoHashMismatch);
        }
        Ok(())
    }
}

fn map_read_error(err: std::io::Error) -> PeerError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof => PeerError::Closed,
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => PeerError::Timeout,
        _ => PeerError::ConnectFailed(err),
    }
}
