//! Command-line surface: argument parsing and subcommand dispatch.
use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about = "A command-line BitTorrent client")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Decode a bencoded string and print its JSON rendering
    Decode {
        /// The bencoded string to decode
        value: String,
    },
    /// Print a .torrent file's tracker URL, length, info hash, piece
    /// length, and piece hashes
    Info {
        /// Path to the .torrent file
        path: String,
    },
    /// Announce to the tracker and print the peer list
    Peers {
        /// Path to the .torrent file
        path: String,
    },
    /// Perform the peer handshake and print the peer's id
    Handshake {
        /// Path to the .torrent file
        path: String,
        /// Peer address, as "HOST:PORT"
        peer: String,
    },
    /// Download a single piece from a peer and write it to a file
    DownloadPiece {
        /// Output file path
        #[arg(short = 'o', long = "out")]
        output: String,
        /// Path to the .torrent file
        path: String,
        /// Zero-based piece index
        index: usize,
    },
    /// Download the whole file from a peer
    Download {
        /// Output file path
        #[arg(short = 'o', long = "out")]
        output: String,
        /// Path to the .torrent file
        path: String,
    },
}
