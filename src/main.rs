//! `torrentctl` binary entry point: wires the `clap`-derived CLI onto
//! the library's bencode/torrent/tracker/peer modules.
mod cli;

use std::fs;
use std::io::{BufWriter, Write};
use std::net::TcpStream;
use std::process::ExitCode;

use clap::Parser;
use tracing::info;

use cli::{Args, Command};
use torrentctl::bencode::{decode_bytes, json};
use torrentctl::peer::PeerSession;
use torrentctl::torrent::TorrentMetadata;
use torrentctl::tracker::{Client as TrackerClient, PeerAddress, DEFAULT_PORT};
use torrentctl::{AppError, AppResult};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> AppResult<()> {
    match command {
        Command::Decode { value } => decode(&value),
        Command::Info { path } => info_cmd(&path),
        Command::Peers { path } => peers_cmd(&path),
        Command::Handshake { path, peer } => handshake_cmd(&path, &peer),
        Command::DownloadPiece { output, path, index } => download_piece_cmd(&output, &path, index),
        Command::Download { output, path } => download_cmd(&output, &path),
    }
}

fn decode(value: &str) -> AppResult<()> {
    let decoded = decode_bytes(value.as_bytes()).map_err(torrentctl::torrent::MetainfoError::Bencode)?;
    println!("{}", json::to_json(&decoded));
    Ok(())
}

fn load_metadata(path: &str) -> AppResult<TorrentMetadata> {
    let bytes = fs::read(path)?;
    Ok(TorrentMetadata::from_bytes(&bytes)?)
}

fn info_cmd(path: &str) -> AppResult<()> {
    let metadata = load_metadata(path)?;
    println!("Tracker URL: {}", metadata.announce);
    println!("Length: {}", metadata.total_length());
    println!("Info Hash: {}", hex::encode(metadata.info_hash()));
    println!("Piece Length: {}", metadata.info.piece_length);
    println!("Piece Hashes:");
    for hash in metadata.info.piece_hashes() {
        println!("{}", hex::encode(hash));
    }
    Ok(())
}

fn fetch_peers(metadata: &TorrentMetadata) -> AppResult<(TrackerClient, Vec<PeerAddress>)> {
    let client = TrackerClient::new(DEFAULT_PORT);
    let response = client.announce(&metadata.announce, metadata.info_hash(), metadata.total_length())?;
    info!(interval = response.interval, peer_count = response.peers.len(), "tracker announce complete");
    Ok((client, response.peers))
}

fn peers_cmd(path: &str) -> AppResult<()> {
    let metadata = load_metadata(path)?;
    let (_client, peers) = fetch_peers(&metadata)?;
    for peer in peers {
        println!("{peer}");
    }
    Ok(())
}

fn handshake_cmd(path: &str, peer_addr: &str) -> AppResult<()> {
    let metadata = load_metadata(path)?;
    let peer_id = torrentctl::tracker::Client::new(DEFAULT_PORT).peer_id();

    let stream = TcpStream::connect(peer_addr).map_err(torrentctl::peer::PeerError::ConnectFailed)?;
    let session = PeerSession::from_stream(stream, &metadata, peer_id)?;
    println!("Peer ID: {}", hex::encode(session.peer_id()));
    Ok(())
}

/// Connects to peers in order, stopping at the first successful
/// handshake and treating connection failures as retryable.
fn connect_to_any_peer<'a>(
    peers: &[PeerAddress],
    metadata: &'a TorrentMetadata,
    peer_id: [u8; 20],
) -> AppResult<PeerSession<'a>> {
    for peer in peers {
        match PeerSession::connect(peer.socket_addr(), metadata, peer_id) {
            Ok(session) => return Ok(session),
            Err(torrentctl::peer::PeerError::ConnectFailed(_)) => continue,
            Err(other) => return Err(AppError::from(other)),
        }
    }
    Err(AppError::ErrorConnectingToPeers)
}

fn download_piece_cmd(output: &str, path: &str, index: usize) -> AppResult<()> {
    let metadata = load_metadata(path)?;
    let (client, peers) = fetch_peers(&metadata)?;
    let mut session = connect_to_any_peer(&peers, &metadata, client.peer_id())?;

    session.await_bitfield()?;
    session.become_interested()?;

    let mut buf = Vec::new();
    session.download_piece(index, &mut buf)?;

    let file = fs::File::create(output)?;
    let mut writer = BufWriter::new(file);
    writer.write_all(&buf)?;
    writer.flush()?;
    info!(index, output, "piece downloaded and verified");
    Ok(())
}

fn download_cmd(output: &str, path: &str) -> AppResult<()> {
    let metadata = load_metadata(path)?;
    let (client, peers) = fetch_peers(&metadata)?;
    let mut session = connect_to_any_peer(&peers, &metadata, client.peer_id())?;

    session.await_bitfield()?;
    session.become_interested()?;

    let file = fs::File::create(output)?;
    let mut writer = BufWriter::new(file);
    session.download_file(&mut writer)?;
    writer.flush()?;
    info!(output, "download complete");
    Ok(())
}
