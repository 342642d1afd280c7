//! Typed projection of a decoded `.torrent` bencode tree.
//!
//! [`TorrentMetadata`] and [`TorrentInfo`] mirror exactly the keys a real
//! `.torrent` file carries. The only part of this tree that participates in the
//! info-hash is the `info` sub-dictionary; [`TorrentMetadata`] retains that
//! sub-dictionary verbatim (as parsed) and hashes it directly with SHA-1,
//! rather than reconstructing it from `TorrentInfo`'s typed fields, so info
//! keys this client doesn't model still affect the hash correctly.
use std::collections::BTreeMap;
use std::path::PathBuf;

use sha1::{Digest, Sha1};

use crate::bencode::{decode_bytes, encode_to_vec, BencodeValue};

use super::{MetainfoError, TorrentResult};

/// A single entry in a multi-file torrent's `info.files` list.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct FileEntry {
    pub length: u64,
    pub path: Vec<String>,
}

/// The `info` sub-dictionary of a `.torrent` file.
///
/// `length` is `Some` for single-file torrents and `None` for multi-file
/// torrents, where `files` carries the per-file breakdown instead; exactly
/// one of the two is populated (`TorrentInfo::total_length` hides the
/// distinction from callers that only care about the aggregate).
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct TorrentInfo {
    pub name: String,
    pub piece_length: u64,
    pub pieces: Vec<u8>,
    pub private: bool,
    pub length: Option<u64>,
    pub files: Option<Vec<FileEntry>>,
}

impl TorrentInfo {
    /// Total length of the torrent's content, summing multi-file entries
    /// when present.
    pub fn total_length(&self) -> u64 {
        match &self.files {
            Some(files) => files.iter().map(|f| f.length).sum(),
            None => self.length.unwrap_or(0),
        }
    }

    /// Number of pieces, derived from the length of the concatenated
    /// piece-hash string.
    pub fn piece_count(&self) -> usize {
        self.pieces.len() / 20
    }

    /// Length of piece `index`: `piece_length` for every piece but the
    /// last, and the remainder for the last.
    pub fn piece_length_of(&self, index: usize) -> u64 {
        let count = self.piece_count();
        if index >= count {
            return 0;
        }
        if index < count - 1 {
            self.piece_length
        } else {
            self.total_length() - self.piece_length * (count as u64 - 1)
        }
    }

    /// The expected 20-byte SHA-1 digest of piece `index`.
    pub fn piece_hash(&self, index: usize) -> [u8; 20] {
        let start = index * 20;
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.pieces[start..start + 20]);
        hash
    }

    /// A lazy view over the concatenated `pieces` string, yielding one
    /// 20-byte digest per piece in order.
    pub fn piece_hashes(&self) -> PieceHashes<'_> {
        PieceHashes {
            pieces: &self.pieces,
            index: 0,
        }
    }

    /// Paths (relative to the torrent's name) of the files that contain
    /// data for piece `index`. For single-file torrents this is always the
    /// torrent's own name; for multi-file torrents a piece may straddle the
    /// boundary between two files.
    pub fn file_paths_for_piece(&self, index: usize) -> Vec<PathBuf> {
        let Some(files) = &self.files else {
            return vec![PathBuf::from(&self.name)];
        };
        if index >= self.piece_count() {
            return Vec::new();
        }
        let piece_start = index as u64 * self.piece_length;
        let piece_end = piece_start + self.piece_length_of(index);

        let mut paths = Vec::new();
        let mut cursor = 0u64;
        for file in files {
            let file_start = cursor;
            let file_end = file_start + file.length;
            if file_end > piece_start && file_start < piece_end {
                let mut path = PathBuf::from(&self.name);
                for component in &file.path {
                    path.push(component);
                }
                paths.push(path);
            }
            cursor = file_end;
        }
        paths
    }

    fn from_bencode_dict(dict: &BTreeMap<Vec<u8>, BencodeValue>) -> TorrentResult<Self> {
        let name = get_string(dict, "name")?;
        let piece_length = get_u64(dict, "piece length")?;
        let pieces = get_bytes(dict, "pieces")?.to_vec();
        if pieces.len() % 20 != 0 {
            return Err(MetainfoError::MalformedMetainfo(
                "pieces length is not a multiple of 20".to_string(),
            ));
        }
        let private = matches!(dict.get(b"private".as_slice()), Some(BencodeValue::Integer(1)));

        let length = match dict.get(b"length".as_slice()) {
            Some(BencodeValue::Integer(i)) if *i >= 0 => Some(*i as u64),
            Some(_) => {
                return Err(MetainfoError::MalformedMetainfo(
                    "length must be a non-negative integer".to_string(),
                ))
            }
            None => None,
        };

        let files = match dict.get(b"files".as_slice()) {
            Some(BencodeValue::List(entries)) => Some(parse_file_entries(entries)?),
            Some(_) => {
                return Err(MetainfoError::MalformedMetainfo(
                    "files must be a list".to_string(),
                ))
            }
            None => None,
        };

        if length.is_none() && files.is_none() {
            return Err(MetainfoError::MalformedMetainfo(
                "info dictionary has neither length nor files".to_string(),
            ));
        }
        if piece_length == 0 {
            return Err(MetainfoError::MalformedMetainfo(
                "piece length must be positive".to_string(),
            ));
        }

        Ok(TorrentInfo {
            name,
            piece_length,
            pieces,
            private,
            length,
            files,
        })
    }
}

fn parse_file_entries(entries: &[BencodeValue]) -> TorrentResult<Vec<FileEntry>> {
    entries
        .iter()
        .map(|entry| {
            let BencodeValue::Dict(file_dict) = entry else {
                return Err(MetainfoError::MalformedMetainfo(
                    "files entry is not a dictionary".to_string(),
                ));
            };
            let length = get_u64(file_dict, "length")?;
            let path = match file_dict.get(b"path".as_slice()) {
                Some(BencodeValue::List(components)) => components
                    .iter()
                    .map(|c| match c {
                        BencodeValue::String(s) => String::from_utf8(s.clone()).map_err(|e| {
                            MetainfoError::MalformedMetainfo(format!("path component not UTF-8: {e}"))
                        }),
                        _ => Err(MetainfoError::MalformedMetainfo(
                            "path component is not a string".to_string(),
                        )),
                    })
                    .collect::<TorrentResult<Vec<String>>>()?,
                _ => {
                    return Err(MetainfoError::MalformedMetainfo(
                        "files entry missing path".to_string(),
                    ))
                }
            };
            Ok(FileEntry { length, path })
        })
        .collect()
}

/// A lazy iterator over the 20-byte piece hashes packed into `pieces`.
pub struct PieceHashes<'a> {
    pieces: &'a [u8],
    index: usize,
}

impl<'a> Iterator for PieceHashes<'a> {
    type Item = [u8; 20];

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.index * 20;
        if start >= self.pieces.len() {
            return None;
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&self.pieces[start..start + 20]);
        self.index += 1;
        Some(hash)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.pieces.len() / 20 - self.index;
        (remaining, Some(remaining))
    }
}

/// A fully-parsed `.torrent` file: the tracker URL plus the `info`
/// dictionary and the handful of optional bookkeeping fields real files
/// carry.
#[derive(Debug, Clone)]
pub struct TorrentMetadata {
    pub announce: String,
    pub announce_list: Vec<Vec<String>>,
    pub info: TorrentInfo,
    pub creation_date: Option<i64>,
    pub comment: Option<String>,
    pub created_by: Option<String>,
    pub encoding: Option<String>,
    /// The `info` sub-dictionary exactly as parsed, kept verbatim for
    /// [`TorrentMetadata::info_hash`]. `TorrentInfo` only projects the
    /// keys this client understands; a real `.torrent` file may carry
    /// additional keys (`source`, `md5sum`, `name.utf-8`, BEP extension
    /// fields, ...) that `TorrentInfo` drops on the floor but that the
    /// info-hash must still account for.
    raw_info: BencodeValue,
}

impl TorrentMetadata {
    /// Parses a `.torrent` file's raw bytes end to end: bencode decode,
    /// then project onto the typed record.
    pub fn from_bytes(bytes: &[u8]) -> TorrentResult<Self> {
        let value = decode_bytes(bytes)?;
        Self::from_bencode(&value)
    }

    /// Projects an already-decoded top-level dictionary onto
    /// `TorrentMetadata`.
    pub fn from_bencode(value: &BencodeValue) -> TorrentResult<Self> {
        let BencodeValue::Dict(dict) = value else {
            return Err(MetainfoError::MalformedMetainfo(
                "top-level value is not a dictionary".to_string(),
            ));
        };

        let announce = get_string(dict, "announce")?;

        let info_value = dict.get(b"info".as_slice()).ok_or_else(|| {
            MetainfoError::MalformedMetainfo("missing info dictionary".to_string())
        })?;
        let BencodeValue::Dict(info_dict) = info_value else {
            return Err(MetainfoError::MalformedMetainfo(
                "info is not a dictionary".to_string(),
            ));
        };
        let info = TorrentInfo::from_bencode_dict(info_dict)?;
        let raw_info = info_value.clone();

        let announce_list = match dict.get(b"announce-list".as_slice()) {
            Some(BencodeValue::List(tiers)) => parse_announce_list(tiers)?,
            Some(_) => {
                return Err(MetainfoError::MalformedMetainfo(
                    "announce-list is not a list".to_string(),
                ))
            }
            None => Vec::new(),
        };

        let creation_date = match dict.get(b"creation date".as_slice()) {
            Some(BencodeValue::Integer(i)) => Some(*i),
            _ => None,
        };
        let comment = optional_string(dict, "comment");
        let created_by = optional_string(dict, "created by");
        let encoding = optional_string(dict, "encoding");

        Ok(TorrentMetadata {
            announce,
            announce_list,
            info,
            creation_date,
            comment,
            created_by,
            encoding,
            raw_info,
        })
    }

    /// SHA-1 over the canonical bencoding of the `info` sub-dictionary
    /// exactly as parsed. This hashes `raw_info`, not a reconstruction
    /// from `TorrentInfo`'s typed fields, so keys the typed model
    /// doesn't know about still participate in the hash, per spec.
    pub fn info_hash(&self) -> [u8; 20] {
        let encoded = encode_to_vec(&self.raw_info);
        let digest = Sha1::digest(&encoded);
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&digest);
        hash
    }

    pub fn piece_count(&self) -> usize {
        self.info.piece_count()
    }

    pub fn piece_length_of(&self, index: usize) -> u64 {
        self.info.piece_length_of(index)
    }

    pub fn piece_hash(&self, index: usize) -> [u8; 20] {
        self.info.piece_hash(index)
    }

    pub fn total_length(&self) -> u64 {
        self.info.total_length()
    }
}

fn parse_announce_list(tiers: &[BencodeValue]) -> TorrentResult<Vec<Vec<String>>> {
    tiers
        .iter()
        .map(|tier| {
            let BencodeValue::List(trackers) = tier else {
                return Err(MetainfoError::MalformedMetainfo(
                    "announce-list tier is not a list".to_string(),
                ));
            };
            trackers
                .iter()
                .map(|tracker| match tracker {
                    BencodeValue::String(s) => String::from_utf8(s.clone()).map_err(|e| {
                        MetainfoError::MalformedMetainfo(format!("tracker URL not UTF-8: {e}"))
                    }),
                    _ => Err(MetainfoError::MalformedMetainfo(
                        "tracker URL is not a string".to_string(),
                    )),
                })
                .collect()
        })
        .collect()
}

fn get_bytes<'a>(dict: &'a BTreeMap<Vec<u8>, BencodeValue>, key: &str) -> TorrentResult<&'a [u8]> {
    match dict.get(key.as_bytes()) {
        Some(BencodeValue::String(s)) => Ok(s),
        Some(_) => Err(MetainfoError::MalformedMetainfo(format!(
            "{key} must be a string"
        ))),
        None => Err(MetainfoError::MalformedMetainfo(format!(
            "missing field {key}"
        ))),
    }
}

fn get_string(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &str) -> TorrentResult<String> {
    let bytes = get_bytes(dict, key)?;
    String::from_utf8(bytes.to_vec())
        .map_err(|e| MetainfoError::MalformedMetainfo(format!("{key} not UTF-8: {e}")))
}

fn optional_string(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &str) -> Option<String> {
    match dict.get(key.as_bytes()) {
        Some(BencodeValue::String(s)) => String::from_utf8(s.clone()).ok(),
        _ => None,
    }
}

fn get_u64(dict: &BTreeMap<Vec<u8>, BencodeValue>, key: &str) -> TorrentResult<u64> {
    match dict.get(key.as_bytes()) {
        Some(BencodeValue::Integer(i)) if *i >= 0 => Ok(*i as u64),
        Some(_) => Err(MetainfoError::MalformedMetainfo(format!(
            "{key} must be a non-negative integer"
        ))),
        None => Err(MetainfoError::MalformedMetainfo(format!(
            "missing field {key}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bencode::encode_to_vec;

    fn sample_bytes(pieces: usize) -> BencodeValue {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), BencodeValue::String(b"sample".to_vec()));
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(32768));
        info.insert(
            b"pieces".to_vec(),
            BencodeValue::String(vec![0u8; 20 * pieces]),
        );
        info.insert(b"length".to_vec(), BencodeValue::Integer(92063));

        let mut top = BTreeMap::new();
        top.insert(
            b"announce".to_vec(),
            BencodeValue::String(b"http://tracker.example/announce".to_vec()),
        );
        top.insert(b"info".to_vec(), BencodeValue::Dict(info));
        BencodeValue::Dict(top)
    }

    #[test]
    fn parses_required_fields() {
        let metadata = TorrentMetadata::from_bencode(&sample_bytes(3)).unwrap();
        assert_eq!(metadata.announce, "http://tracker.example/announce");
        assert_eq!(metadata.info.name, "sample");
        assert_eq!(metadata.total_length(), 92063);
    }

    #[test]
    fn piece_count_and_lengths_match_spec_example() {
        let metadata = TorrentMetadata::from_bencode(&sample_bytes(3)).unwrap();
        assert_eq!(metadata.piece_count(), 3);
        assert_eq!(metadata.piece_length_of(0), 32768);
        assert_eq!(metadata.piece_length_of(1), 32768);
        assert_eq!(metadata.piece_length_of(2), 92063 - 2 * 32768);

        let sum: u64 = (0..metadata.piece_count())
            .map(|i| metadata.piece_length_of(i))
            .sum();
        assert_eq!(sum, metadata.total_length());
    }

    #[test]
    fn missing_info_is_malformed() {
        let mut top = BTreeMap::new();
        top.insert(
            b"announce".to_vec(),
            BencodeValue::String(b"http://x".to_vec()),
        );
        let err = TorrentMetadata::from_bencode(&BencodeValue::Dict(top)).unwrap_err();
        assert!(matches!(err, MetainfoError::MalformedMetainfo(_)));
    }

    #[test]
    fn rejects_pieces_not_multiple_of_20() {
        let value = sample_bytes(3);
        let BencodeValue::Dict(mut top) = value else {
            unreachable!()
        };
        let BencodeValue::Dict(mut info) = top.remove(b"info".as_slice()).unwrap() else {
            unreachable!()
        };
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![0u8; 19]));
        top.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let err = TorrentMetadata::from_bencode(&BencodeValue::Dict(top)).unwrap_err();
        assert!(matches!(err, MetainfoError::MalformedMetainfo(_)));
    }

    #[test]
    fn info_hash_is_independent_of_source_key_order() {
        // Re-encoding an already-parsed `info` dict and decoding it back
        // reproduces the same bytes (BTreeMap normalizes to ascending key
        // order regardless of how the source file ordered them), so the
        // hash computed from a fresh parse of the round-tripped bytes
        // matches the original.
        let a = TorrentMetadata::from_bencode(&sample_bytes(2)).unwrap();
        let reencoded_top = encode_to_vec(&sample_bytes(2));
        let b = TorrentMetadata::from_bytes(&reencoded_top).unwrap();
        assert_eq!(a.info_hash(), b.info_hash());
    }

    #[test]
    fn info_hash_retains_keys_the_typed_model_does_not_project() {
        // `source` is a real-world info-dict key (used by some trackers
        // to mark a release) that `TorrentInfo` has no field for. The
        // info-hash must still differ when it's present, since it hashes
        // the raw parsed `info` dict, not a reconstruction from
        // `TorrentInfo`'s fields.
        let BencodeValue::Dict(mut top) = sample_bytes(2) else {
            unreachable!()
        };
        let without_source = TorrentMetadata::from_bencode(&BencodeValue::Dict(top.clone())).unwrap();

        let BencodeValue::Dict(mut info) = top.remove(b"info".as_slice()).unwrap() else {
            unreachable!()
        };
        info.insert(b"source".to_vec(), BencodeValue::String(b"EXAMPLE".to_vec()));
        top.insert(b"info".to_vec(), BencodeValue::Dict(info));
        let with_source = TorrentMetadata::from_bencode(&BencodeValue::Dict(top)).unwrap();

        assert_ne!(without_source.info_hash(), with_source.info_hash());
        // The typed projection is unaffected either way, since it has no
        // `source` field — only the hash, which is sourced from `raw_info`,
        // notices the difference.
        assert_eq!(without_source.info.name, with_source.info.name);
    }

    #[test]
    fn piece_hashes_iterator_yields_expected_count() {
        let metadata = TorrentMetadata::from_bencode(&sample_bytes(3)).unwrap();
        assert_eq!(metadata.info.piece_hashes().count(), 3);
    }

    #[test]
    fn multi_file_piece_paths_span_boundaries() {
        let mut info = BTreeMap::new();
        info.insert(b"name".to_vec(), BencodeValue::String(b"multi".to_vec()));
        info.insert(b"piece length".to_vec(), BencodeValue::Integer(10));
        info.insert(b"pieces".to_vec(), BencodeValue::String(vec![0u8; 40]));
        let files = vec![
            {
                let mut f = BTreeMap::new();
                f.insert(b"length".to_vec(), BencodeValue::Integer(15));
                f.insert(
                    b"path".to_vec(),
                    BencodeValue::List(vec![BencodeValue::String(b"a.txt".to_vec())]),
                );
                BencodeValue::Dict(f)
            },
            {
                let mut f = BTreeMap::new();
                f.insert(b"length".to_vec(), BencodeValue::Integer(25));
                f.insert(
                    b"path".to_vec(),
                    BencodeValue::List(vec![BencodeValue::String(b"b.txt".to_vec())]),
                );
                BencodeValue::Dict(f)
            },
        ];
        info.insert(b"files".to_vec(), BencodeValue::List(files));

        let torrent_info = TorrentInfo::from_bencode_dict(&info).unwrap();
        assert_eq!(torrent_info.total_length(), 40);
        // Piece 1 spans bytes [10, 20), which straddles a.txt ([0,15)) and
        // b.txt ([15,40)).
        let paths = torrent_info.file_paths_for_piece(1);
        assert_eq!(paths.len(), 2);
    }
}
