//! Tracker client logic for the BitTorrent protocol.
//!
//! Builds the URL-encoded GET request an HTTP tracker expects and parses its bencoded reply back into a typed
//! [`AnnounceResponse`], decoding the compact peer list into
//! [`PeerAddress`] values.
use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use crate::bencode::{decode_bytes, BencodeError, BencodeValue};

/// Port advertised to the tracker when the caller doesn't listen for
/// incoming connections.
pub const DEFAULT_PORT: u16 = 6881;

/// Errors raised while announcing to a tracker or parsing its reply.
#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("tracker returned non-success HTTP status {0}")]
    ServerError(reqwest::StatusCode),

    #[error("malformed tracker response: {0}")]
    MalformedResponse(String),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("bencode decoding error: {0}")]
    Bencode(#[from] BencodeError),
}

pub type TrackerResult<T> = std::result::Result<T, TrackerError>;

/// A peer address as reported in a tracker's compact peer list: an IPv4
/// address plus a port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerAddress {
    pub ip: Ipv4Addr,
    pub port: u16,
}

impl PeerAddress {
    pub fn socket_addr(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }
}

impl std::fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.ip, self.port)
    }
}

/// The parsed reply to an announce request.
#[derive(Debug, Clone)]
pub struct AnnounceResponse {
    pub interval: i64,
    pub peers: Vec<PeerAddress>,
}

/// A client communicating with a BitTorrent tracker over HTTP.
#[derive(Debug)]
pub struct Client {
    peer_id: [u8; 20],
    port: u16,
    http: reqwest::blocking::Client,
}

impl Client {
    pub fn new(port: u16) -> Self {
        Self {
            peer_id: generate_peer_id(),
            port,
            http: reqwest::blocking::Client::new(),
        }
    }

    /// This client's 20-byte peer id, as sent in every announce request.
    pub fn peer_id(&self) -> [u8; 20] {
        self.peer_id
    }

    /// Sends an announce request to `announce_url` and parses the reply.
    ///
    /// `info_hash` and `left` (bytes remaining to download, the whole
    /// torrent length for a fresh client) parameterize the request;
    /// `uploaded`/`downloaded` are always 0 and `compact` is always 1.
    #[tracing::instrument(skip(self), level = "debug")]
    pub fn announce(&self, announce_url: &str, info_hash: [u8; 20], left: u64) -> TrackerResult<AnnounceResponse> {
        let url = build_announce_url(announce_url, &info_hash, &self.peer_id, self.port, left);
        tracing::debug!(url = %url, "making announce request to tracker");

        let response = self
            .http
            .get(&url)
            .timeout(Duration::from_secs(30))
            .send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::ServerError(status));
        }
        let body = response.bytes()?;
        parse_announce_response(&body)
    }
}

/// Builds the tracker GET URL. `info_hash` and `peer_id` are raw
/// 20-byte strings, percent-encoded byte-by-byte rather than through a
/// generic URL-encoding library, since they are not valid UTF-8 text.
fn build_announce_url(
    announce_url: &str,
    info_hash: &[u8; 20],
    peer_id: &[u8; 20],
    port: u16,
    left: u64,
) -> String {
    let separator = if announce_url.contains('?') { '&' } else { '?' };
    format!(
        "{announce_url}{separator}info_hash={}&peer_id={}&port={port}&uploaded=0&downloaded=0&left={left}&compact=1",
        percent_encode_bytes(info_hash),
        percent_encode_bytes(peer_id),
    )
}

/// Percent-encodes a byte slice per RFC 3986: unreserved characters
/// (`a-z`, `A-Z`, `0-9`, `-`, `.`, `_`, `~`) pass through unchanged,
/// every other byte becomes `%XX`.
fn percent_encode_bytes(bytes: &[u8]) -> String {
    let mut encoded = String::with_capacity(bytes.len() * 3);
    for &byte in bytes {
        match byte {
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                encoded.push(byte as char);
            }
            _ => {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        }
    }
    encoded
}

/// Parses a tracker's bencoded reply, extracting `interval` and the
/// compact `peers` string.
fn parse_announce_response(bytes: &[u8]) -> TrackerResult<AnnounceResponse> {
    let value = decode_bytes(bytes)?;
    let BencodeValue::Dict(dict) = value else {
        return Err(TrackerError::MalformedResponse(
            "tracker reply is not a dictionary".to_string(),
        ));
    };

    let interval = match dict.get(b"interval".as_slice()) {
        Some(BencodeValue::Integer(i)) => *i,
        _ => {
            return Err(TrackerError::MalformedResponse(
                "missing or non-integer interval".to_string(),
            ))
        }
    };

    let peers_bytes = match dict.get(b"peers".as_slice()) {
        Some(BencodeValue::String(s)) => s,
        _ => {
            return Err(TrackerError::MalformedResponse(
                "missing or non-string compact peers field".to_string(),
            ))
        }
    };
    let peers = parse_compact_peers(peers_bytes)?;

    Ok(AnnounceResponse { interval, peers })
}

/// Decodes the compact peer list: consecutive 6-byte groups of `IPv4
/// (4B) || port (2B big-endian)`.
fn parse_compact_peers(bytes: &[u8]) -> TrackerResult<Vec<PeerAddress>> {
    if bytes.len() % 6 != 0 {
        return Err(TrackerError::MalformedResponse(format!(
            "compact peers length {} is not a multiple of 6",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(6)
        .map(|chunk| PeerAddress {
            ip: Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]),
            port: u16::from_be_bytes([chunk[4], chunk[5]]),
        })
        .collect())
}

/// Generates a 20-byte client identifier: an 8-byte prefix identifying
/// this client, followed by 12 random bytes for uniqueness.
fn generate_peer_id() -> [u8; 20] {
    let mut peer_id = [0u8; 20];
    let prefix = b"-RC0001-";
    peer_id[..prefix.len()].copy_from_slice(prefix);
    let mut rng = rand::rng();
    rng.fill(&mut peer_id[prefix.len()..]);
    peer_id
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_encodes_non_unreserved_bytes() {
        let encoded = percent_encode_bytes(&[0x12, b'a', 0xff]);
        assert_eq!(encoded, "%12a%FF");
    }

    #[test]
    fn builds_url_with_params_in_spec_order() {
        let info_hash = [0u8; 20];
        let peer_id = [1u8; 20];
        let url = build_announce_url("http://tracker.example/announce", &info_hash, &peer_id, 6881, 1024);
        assert!(url.starts_with("http://tracker.example/announce?info_hash="));
        assert!(url.contains("&peer_id="));
        assert!(url.contains("&port=6881"));
        assert!(url.contains("&uploaded=0"));
        assert!(url.contains("&downloaded=0"));
        assert!(url.contains("&left=1024"));
        assert!(url.ends_with("&compact=1"));
    }

    #[test]
    fn parses_compact_peer_list() {
        let mut body = std::collections::BTreeMap::new();
        body.insert(b"interval".to_vec(), BencodeValue::Integer(1800));
        body.insert(
            b"peers".to_vec(),
            BencodeValue::String(vec![127, 0, 0, 1, 0x1A, 0xE1, 10, 0, 0, 5, 0x1A, 0xE2]),
        );
        let encoded = crate::bencode::encode_to_vec(&BencodeValue::Dict(body));
        let response = parse_announce_response(&encoded).unwrap();
        assert_eq!(response.interval, 1800);
        assert_eq!(response.peers.len(), 2);
        assert_eq!(response.peers[0].ip, Ipv4Addr::new(127, 0, 0, 1));
        assert_eq!(response.peers[0].port, 0x1AE1);
        assert_eq!(response.peers[1].ip, Ipv4Addr::new(10, 0, 0, 5));
        assert_eq!(response.peers[1].port, 0x1AE2);
    }

    #[test]
    fn rejects_peers_length_not_multiple_of_6() {
        let mut body = std::collections::BTreeMap::new();
        body.insert(b"interval".to_vec(), BencodeValue::Integer(1800));
        body.insert(b"peers".to_vec(), BencodeValue::String(vec![1, 2, 3]));
        let encoded = crate::bencode::encode_to_vec(&BencodeValue::Dict(body));
        let err = parse_announce_response(&encoded).unwrap_err();
        assert!(matches!(err, TrackerError::MalformedResponse(_)));
    }

    #[test]
    fn rejects_non_200_status_via_server_error_variant() {
        // ServerError is constructed directly here rather than through a
        // live HTTP round-trip; its Display impl is what the CLI surfaces.
        let err = TrackerError::ServerError(reqwest::StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("404"));
    }
}
