//! Library root for torrentctl.
//!
//! Re-exports core modules: bencode, torrent, tracker, and peer for use
//! in the binary and any other consumer.
pub mod bencode;
pub mod error;
pub mod peer;
pub mod torrent;
pub mod tracker;

pub use error::{AppError, AppResult};
