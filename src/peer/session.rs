//! The peer session state machine: handshake, bitfield, interested/
//! unchoke negotiation, and block-by-block piece retrieval with SHA-1
//! verification.
//!
//! ```text
//!   Fresh
//!     |  send+receive Handshake OK
//!     v
//!   Handshaked
//!     |  receive Bitfield
//!     v
//!   HaveBitfield
//!     |  send Interested, receive Unchoke
//!     v
//!   Unchoked --- download loop ---> Unchoked --- done ---> Closed
//! ```
use std::io::Write;
use std::net::{SocketAddrV4, TcpStream};
use std::time::Duration;

use sha1::{Digest, Sha1};

use crate::torrent::TorrentMetadata;

use super::{Handshake, Message, PeerError, PeerResult};

const BLOCK_SIZE: usize = 16 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Fresh,
    Handshaked,
    HaveBitfield,
    Unchoked,
    Closed,
}

/// A connection to a single peer, scoped to one torrent's metadata.
///
/// Owns the TCP stream exclusively; no other component may read or
/// write it. Dropping the session closes the socket on
/// every exit path.
pub struct PeerSession<'a> {
    stream: TcpStream,
    metadata: &'a TorrentMetadata,
    peer_id: [u8; 20],
    bitfield: Option<Vec<u8>>,
    state: State,
}

impl<'a> PeerSession<'a> {
    /// Connects to `addr` and performs the handshake, leaving the
    /// session in the `Handshaked` state.
    pub fn connect(addr: SocketAddrV4, metadata: &'a TorrentMetadata, peer_id: [u8; 20]) -> PeerResult<Self> {
        let stream = TcpStream::connect(addr).map_err(PeerError::ConnectFailed)?;
        Self::from_stream(stream, metadata, peer_id)
    }

    /// Wraps an already-open stream (e.g. one accepted by a test
    /// `TcpListener`) and performs the handshake over it.
    pub fn from_stream(stream: TcpStream, metadata: &'a TorrentMetadata, peer_id: [u8; 20]) -> PeerResult<Self> {
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .map_err(PeerError::ConnectFailed)?;
        stream
            .set_write_timeout(Some(READ_TIMEOUT))
            .map_err(PeerError::ConnectFailed)?;

        let mut session = Self {
            stream,
            metadata,
            peer_id,
            bitfield: None,
            state: State::Fresh,
        };
        session.handshake()?;
        Ok(session)
    }

    /// The peer's handshake-advertised id, once handshaked.
    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// The peer's announced bitfield, once received.
    pub fn bitfield(&self) -> Option<&[u8]> {
        self.bitfield.as_deref()
    }

    fn handshake(&mut self) -> PeerResult<()> {
        let info_hash = self.metadata.info_hash();
        let ours = Handshake::new(info_hash, self.peer_id);
        ours.write_to(&mut self.stream)?;

        let theirs = Handshake::read_from(&mut self.stream)?;
        theirs.validate(info_hash)?;
        self.peer_id = theirs.peer_id;
        self.state = State::Handshaked;
        Ok(())
    }

    /// Blocks until the peer's bitfield arrives, tolerating interleaved
    /// `have` messages.
    pub fn await_bitfield(&mut self) -> PeerResult<()> {
        debug_assert_eq!(self.state, State::Handshaked);
        loop {
            match Message::read_from(&mut self.stream)? {
                Message::Bitfield(bits) => {
                    self.bitfield = Some(bits);
                    self.state = State::HaveBitfield;
                    return Ok(());
                }
                Message::Have { piece_index } => self.record_have(piece_index),
                _ => return Err(PeerError::ProtocolDesync),
            }
        }
    }

    /// Sends `interested` and blocks until the peer unchokes us.
    pub fn become_interested(&mut self) -> PeerResult<()> {
        debug_assert_eq!(self.state, State::HaveBitfield);
        Message::Interested.write_to(&mut self.stream)?;
        loop {
            match Message::read_from(&mut self.stream)? {
                Message::Unchoke => {
                    self.state = State::Unchoked;
                    return Ok(());
                }
                Message::Have { piece_index } => self.record_have(piece_index),
                Message::Choke => continue,
                _ => return Err(PeerError::ProtocolDesync),
            }
        }
    }

    /// Downloads a single piece, requesting it in `BLOCK_SIZE` blocks
    /// and writing each block to `sink` as it arrives, while folding it
    /// into a running SHA-1 hasher. Only callable in the `Unchoked` state.
    ///
    /// On a hash mismatch the bytes already written to `sink` are NOT
    /// unwound; callers that need transactional semantics should pass a
    /// temporary buffer and only copy it to its final destination after
    /// this call returns `Ok`.
    pub fn download_piece(&mut self, index: usize, sink: &mut impl Write) -> PeerResult<()> {
        if self.state != State::Unchoked {
            return Err(PeerError::ProtocolDesync);
        }
        if index >= self.metadata.piece_count() {
            return Err(PeerError::InvalidPieceIndex(index));
        }

        let piece_len = self.metadata.piece_length_of(index) as usize;
        let mut hasher = Sha1::new();
        let mut offset = 0usize;

        while offset < piece_len {
            let req_len = (piece_len - offset).min(BLOCK_SIZE);
            Message::Request {
                index: index as u32,
                begin: offset as u32,
                length: req_len as u32,
            }
            .write_to(&mut self.stream)?;

            let block = self.await_block(index as u32, offset as u32)?;
            sink.write_all(&block).map_err(PeerError::SinkWriteFailed)?;
            hasher.update(&block);
            offset += req_len;
        }

        let digest = hasher.finalize();
        if digest.as_slice() != self.metadata.piece_hash(index) {
            return Err(PeerError::PieceHashMismatch { index });
        }
        Ok(())
    }

    /// Waits for the `piece` message matching `(expected_index,
    /// expected_begin)`, ignoring interleaved `have`/keep-alive
    /// messages and treating a mid-download `choke` as fatal.
    fn await_block(&mut self, expected_index: u32, expected_begin: u32) -> PeerResult<Vec<u8>> {
        loop {
            match Message::read_from(&mut self.stream)? {
                Message::Piece { index, begin, block } if index == expected_index && begin == expected_begin => {
                    return Ok(block)
                }
                Message::Have { piece_index } => self.record_have(piece_index),
                Message::Choke => return Err(PeerError::Choked),
                _ => return Err(PeerError::ProtocolDesync),
            }
        }
    }

    /// Downloads every piece in order, streaming each into `sink` as it
    /// completes. Pipelining is not attempted; each piece is fully
    /// retrieved before the next is requested.
    pub fn download_file(&mut self, sink: &mut impl Write) -> PeerResult<()> {
        for index in 0..self.metadata.piece_count() {
            self.download_piece(index, sink)?;
        }
        self.state = State::Closed;
        Ok(())
    }

    fn record_have(&mut self, piece_index: u32) {
        let Some(bits) = &mut self.bitfield else {
            return;
        };
        let byte = (piece_index / 8) as usize;
        if byte >= bits.len() {
            bits.resize(byte + 1, 0);
        }
        bits[byte] |= 1 << (7 - (piece_index % 8));
    }
}

impl<'a> Drop for PeerSession<'a> {
    fn drop(&mut self) {
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}
