//! The peer wire protocol: handshake, length-prefixed message framing,
//! and the session state machine that drives block-by-block piece
//! retrieval.
use thiserror::Error;

pub mod handshake;
pub mod message;
pub mod session;

pub use handshake::Handshake;
pub use message::Message;
pub use session::PeerSession;

/// Errors raised by the handshake, wire framer, and session state
/// machine.
#[derive(Debug, Error)]
pub enum PeerError {
    #[error("could not connect to peer: {0}")]
    ConnectFailed(#[from] std::io::Error),

    #[error("timed out waiting for peer")]
    Timeout,

    #[error("peer closed the connection")]
    Closed,

    #[error("peer handshake used an unrecognized protocol identifier")]
    HandshakeProtocolError,

    #[error("peer handshake info-hash did not match the requested torrent")]
    HandshakeInfoHashMismatch,

    #[error("received a message with an unrecognized id")]
    InvalidMessage,

    #[error("received an unexpected message for the current download state")]
    ProtocolDesync,

    #[error("peer choked mid-download")]
    Choked,

    #[error("piece {index} failed SHA-1 verification")]
    PieceHashMismatch { index: usize },

    #[error("piece index {0} is out of range for this torrent")]
    InvalidPieceIndex(usize),

    #[error("failed writing downloaded data to the destination sink: {0}")]
    SinkWriteFailed(std::io::Error),
}

pub type PeerResult<T> = std::result::Result<T, PeerError>;
