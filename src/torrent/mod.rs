//! Torrent metainfo parsing and error handling logic.
//!
//! This module provides types and error handling for working with .torrent
//! files: projecting a decoded bencode tree onto typed records, and deriving
//! the info-hash and piece-hash sequence from them.
use thiserror::Error;

pub mod metainfo;

pub use metainfo::{FileEntry, PieceHashes, TorrentInfo, TorrentMetadata};

/// Errors raised while projecting a decoded bencode tree onto
/// [`TorrentMetadata`].
#[derive(Debug, Error)]
pub enum MetainfoError {
    #[error("bencode decoding error: {0}")]
    Bencode(#[from] crate::bencode::BencodeError),

    #[error("malformed metainfo: {0}")]
    MalformedMetainfo(String),
}

/// Result type for torrent metainfo operations.
pub type TorrentResult<T> = std::result::Result<T, MetainfoError>;
