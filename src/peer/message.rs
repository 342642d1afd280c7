//! Length-prefixed peer wire messages.
//!
//! Every message after the handshake is a big-endian `u32` length
//! followed by that many bytes; a length of zero is a keep-alive and is
//! transparently skipped by [`Message::read_from`] rather than exposed
//! as a variant, since it is framing noise, not a message a caller ever
//! needs to act on.
use std::io::{Read, Write};

use super::PeerError;

const MSG_CHOKE: u8 = 0;
const MSG_UNCHOKE: u8 = 1;
const MSG_INTERESTED: u8 = 2;
const MSG_NOT_INTERESTED: u8 = 3;
const MSG_HAVE: u8 = 4;
const MSG_BITFIELD: u8 = 5;
const MSG_REQUEST: u8 = 6;
const MSG_PIECE: u8 = 7;
const MSG_CANCEL: u8 = 8;

/// The nine wire message kinds a peer connection exchanges post-handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Choke,
    Unchoke,
    Interested,
    NotInterested,
    Have { piece_index: u32 },
    Bitfield(Vec<u8>),
    Request { index: u32, begin: u32, length: u32 },
    Piece { index: u32, begin: u32, block: Vec<u8> },
    Cancel { index: u32, begin: u32, length: u32 },
}

impl Message {
    /// Reads the next non-keep-alive message from `reader`, retrying on
    /// zero-length keep-alive frames.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self, PeerError> {
        loop {
            let mut len_buf = [0u8; 4];
            reader.read_exact(&mut len_buf).map_err(map_read_error)?;
            let length = u32::from_be_bytes(len_buf) as usize;
            if length == 0 {
                continue; // keep-alive
            }

            let mut payload = vec![0u8; length];
            reader.read_exact(&mut payload).map_err(map_read_error)?;
            return Self::from_payload(payload[0], &payload[1..]);
        }
    }

    fn from_payload(id: u8, body: &[u8]) -> Result<Self, PeerError> {
        match id {
            MSG_CHOKE => Ok(Message::Choke),
            MSG_UNCHOKE => Ok(Message::Unchoke),
            MSG_INTERESTED => Ok(Message::Interested),
            MSG_NOT_INTERESTED => Ok(Message::NotInterested),
            MSG_HAVE => {
                let piece_index = read_u32(body, 0)?;
                Ok(Message::Have { piece_index })
            }
            MSG_BITFIELD => Ok(Message::Bitfield(body.to_vec())),
            MSG_REQUEST => {
                let (index, begin, length) = read_request_fields(body)?;
                Ok(Message::Request { index, begin, length })
            }
            MSG_PIECE => {
                if body.len() < 8 {
                    return Err(PeerError::InvalidMessage);
                }
                let index = read_u32(body, 0)?;
                let begin = read_u32(body, 4)?;
                Ok(Message::Piece {
                    index,
                    begin,
                    block: body[8..].to_vec(),
                })
            }
            MSG_CANCEL => {
                let (index, begin, length) = read_request_fields(body)?;
                Ok(Message::Cancel { index, begin, length })
            }
            _ => Err(PeerError::InvalidMessage),
        }
    }

    /// Writes this message's length-prefixed wire form to `writer`.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), PeerError> {
        let mut buf = Vec::new();
        match self {
            Message::Choke => buf.push(MSG_CHOKE),
            Message::Unchoke => buf.push(MSG_UNCHOKE),
            Message::Interested => buf.push(MSG_INTERESTED),
            Message::NotInterested => buf.push(MSG_NOT_INTERESTED),
            Message::Have { piece_index } => {
                buf.push(MSG_HAVE);
                buf.extend_from_slice(&piece_index.to_be_bytes());
            }
            Message::Bitfield(bits) => {
                buf.push(MSG_BITFIELD);
                buf.extend_from_slice(bits);
            }
            Message::Request { index, begin, length } => {
                buf.push(MSG_REQUEST);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
            }
            Message::Piece { index, begin, block } => {
                buf.push(MSG_PIECE);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(block);
            }
            Message::Cancel { index, begin, length } => {
                buf.push(MSG_CANCEL);
                buf.extend_from_slice(&index.to_be_bytes());
                buf.extend_from_slice(&begin.to_be_bytes());
                buf.extend_from_slice(&length.to_be_bytes());
            }
        }

        let len = (buf.len() as u32).to_be_bytes();
        writer.write_all(&len).map_err(PeerError::ConnectFailed)?;
        writer.write_all(&buf).map_err(PeerError::ConnectFailed)?;
        Ok(())
    }
}

fn read_request_fields(body: &[u8]) -> Result<(u32, u32, u32), PeerError> {
    if body.len() < 12 {
        return Err(PeerError::InvalidMessage);
    }
    Ok((read_u32(body, 0)?, read_u32(body, 4)?, read_u32(body, 8)?))
}

fn read_u32(body: &[u8], offset: usize) -> Result<u32, PeerError> {
    body.get(offset..offset + 4)
        .map(|s| u32::from_be_bytes(s.try_into().expect("slice of length 4")))
        .ok_or(PeerError::InvalidMessage)
}

fn map_read_error(err: std::io::Error) -> PeerError {
    match err.kind() {
        std::io::ErrorKind::UnexpectedEof => PeerError::Closed,
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => PeerError::Timeout,
        _ => PeerError::ConnectFailed(err),
    }
}
