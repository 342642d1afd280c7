//! Top-of-stack error type, used by the CLI binary to render a
//! single-line diagnostic and select an exit code.
use thiserror::Error;

use crate::peer::PeerError;
use crate::torrent::MetainfoError;
use crate::tracker::TrackerError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Metainfo(#[from] MetainfoError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error("could not connect to any peer in the tracker's peer list")]
    ErrorConnectingToPeers,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
