//! Integration-style coverage that exercises the peer engine end to
//! end over a real loopback TCP connection: handshake, bitfield,
//! interested/unchoke, multi-block piece retrieval, and SHA-1
//! verification against a metainfo file whose last piece is shorter
//! than `piece_length`.
use std::collections::BTreeMap;
use std::io::Read;
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use sha1::{Digest, Sha1};

use torrentctl::bencode::BencodeValue;
use torrentctl::peer::{Handshake, Message, PeerSession};
use torrentctl::torrent::TorrentMetadata;

const PIECE_LENGTH: u64 = 32768;
const TOTAL_LENGTH: u64 = 92063; // three pieces, last one short

fn sample_content() -> Vec<u8> {
    (0..TOTAL_LENGTH).map(|i| (i % 251) as u8).collect()
}

fn sample_metadata() -> (TorrentMetadata, Vec<u8>) {
    let content = sample_content();
    let piece_count = content.chunks(PIECE_LENGTH as usize).count();
    let pieces: Vec<u8> = content
        .chunks(PIECE_LENGTH as usize)
        .flat_map(|chunk| Sha1::digest(chunk).to_vec())
        .collect();
    assert_eq!(piece_count, 3);

    let mut info = BTreeMap::new();
    info.insert(b"name".to_vec(), BencodeValue::String(b"sample".to_vec()));
    info.insert(b"piece length".to_vec(), BencodeValue::Integer(PIECE_LENGTH as i64));
    info.insert(b"pieces".to_vec(), BencodeValue::String(pieces));
    info.insert(b"length".to_vec(), BencodeValue::Integer(TOTAL_LENGTH as i64));

    let mut top = BTreeMap::new();
    top.insert(
        b"announce".to_vec(),
        BencodeValue::String(b"http://tracker.example/announce".to_vec()),
    );
    top.insert(b"info".to_vec(), BencodeValue::Dict(info));

    let metadata = TorrentMetadata::from_bencode(&BencodeValue::Dict(top)).unwrap();
    (metadata, content)
}

/// Plays the seeder side of the protocol for exactly one full-file
/// download: handshake, bitfield, interested/unchoke, then answers
/// every `request` with the matching `piece` until the stream closes.
fn run_seeder(mut stream: TcpStream, content: Vec<u8>) {
    let theirs = Handshake::read_from(&mut stream).unwrap();
    Handshake::new(theirs.info_hash, [0xAB; 20]).write_to(&mut stream).unwrap();

    Message::Bitfield(vec![0xE0]).write_to(&mut stream).unwrap();
    assert_eq!(Message::read_from(&mut stream).unwrap(), Message::Interested);
    Message::Unchoke.write_to(&mut stream).unwrap();

    loop {
        let message = match Message::read_from(&mut stream) {
            Ok(m) => m,
            Err(_) => break,
        };
        match message {
            Message::Request { index, begin, length } => {
                let start = index as usize * PIECE_LENGTH as usize + begin as usize;
                let end = start + length as usize;
                let block = content[start..end].to_vec();
                Message::Piece { index, begin, block }.write_to(&mut stream).unwrap();
            }
            other => panic!("unexpected message from downloader: {other:?}"),
        }
    }
}

#[test]
fn downloads_whole_file_and_verifies_every_piece() {
    let (metadata, content) = sample_metadata();
    assert_eq!(metadata.piece_count(), 3);
    assert_eq!(metadata.piece_length_of(2), TOTAL_LENGTH - 2 * PIECE_LENGTH);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = match listener.local_addr().unwrap() {
        SocketAddr::V4(v4) => v4,
        _ => unreachable!(),
    };

    let seeder_content = content.clone();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        run_seeder(stream, seeder_content);
    });

    let mut session = PeerSession::connect(addr, &metadata, [1u8; 20]).unwrap();
    session.await_bitfield().unwrap();
    session.become_interested().unwrap();

    let mut downloaded = Vec::new();
    session.download_file(&mut downloaded).unwrap();
    assert_eq!(downloaded, content);

    drop(session); // closes the socket, letting the seeder's read loop end
    handle.join().unwrap();
}

#[test]
fn downloads_single_piece_via_tempfile_sink() {
    let (metadata, content) = sample_metadata();

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = match listener.local_addr().unwrap() {
        SocketAddr::V4(v4) => v4,
        _ => unreachable!(),
    };

    let seeder_content = content.clone();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        run_seeder(stream, seeder_content);
    });

    let mut session = PeerSession::connect(addr, &metadata, [2u8; 20]).unwrap();
    session.await_bitfield().unwrap();
    session.become_interested().unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("piece-2.bin");
    let mut buf = Vec::new();
    session.download_piece(2, &mut buf).unwrap();
    std::fs::write(&path, &buf).unwrap();

    let expected_start = 2 * PIECE_LENGTH as usize;
    let expected = &content[expected_start..];
    let mut on_disk = Vec::new();
    std::fs::File::open(&path).unwrap().read_to_end(&mut on_disk).unwrap();
    assert_eq!(on_disk, expected);

    drop(session);
    handle.join().unwrap();
}
