//! Canonical bencode encoding.
//!
//! Dictionaries always emit their entries in ascending key byte-order (free
//! here since `BencodeValue::Dict` is a `BTreeMap`), integers emit their
//! minimal decimal form, and strings emit a length-prefixed raw byte run.
//! Round-tripping an already-canonical input through [`decode_bytes`] and
//! back through [`encode`] reproduces the original bytes exactly — this is
//! what makes the info-hash stable regardless of how the source file ordered
//! the `info` dictionary's keys.
//!
//! [`decode_bytes`]: super::decode_bytes
use super::BencodeResult;
use super::BencodeValue;
use std::io::Write;

/// Encodes a `BencodeValue` tree to its canonical bencode bytes.
pub fn encode<W: Write>(writer: &mut W, value: &BencodeValue) -> BencodeResult<()> {
    match value {
        BencodeValue::String(s) => encode_string(writer, s),
        BencodeValue::Integer(i) => encode_integer(writer, *i),
        BencodeValue::List(list) => encode_list(writer, list),
        BencodeValue::Dict(dict) => encode_dict(writer, dict),
    }
}

/// Encodes a `BencodeValue` tree and returns the resulting bytes.
pub fn encode_to_vec(value: &BencodeValue) -> Vec<u8> {
    let mut buf = Vec::new();
    // A `Vec<u8>` writer never fails, so the only possible error would be a
    // bug in the encoder itself.
    encode(&mut buf, value).expect("encoding to an in-memory buffer cannot fail");
    buf
}

fn encode_string<W: Write>(writer: &mut W, s: &[u8]) -> BencodeResult<()> {
    write!(writer, "{}:", s.len())?;
    writer.write_all(s)?;
    Ok(())
}

fn encode_integer<W: Write>(writer: &mut W, i: i64) -> BencodeResult<()> {
    write!(writer, "i{i}e")?;
    Ok(())
}

fn encode_list<W: Write>(writer: &mut W, list: &[BencodeValue]) -> BencodeResult<()> {
    writer.write_all(b"l")?;
    for item in list {
        encode(writer, item)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

fn encode_dict<W: Write>(
    writer: &mut W,
    dict: &std::collections::BTreeMap<Vec<u8>, BencodeValue>,
) -> BencodeResult<()> {
    writer.write_all(b"d")?;
    // BTreeMap iteration is already ascending by key, so no explicit sort is
    // needed here — the ordering invariant is structural, not incidental.
    for (key, value) in dict {
        encode_string(writer, key)?;
        encode(writer, value)?;
    }
    writer.write_all(b"e")?;
    Ok(())
}

/// Projects a typed record onto a [`BencodeValue::Dict`] as if its fields
/// were dictionary entries, so the record can be hashed or serialized with
/// the same canonical encoder used for already-decoded trees.
pub trait ToBencode {
    fn to_bencode(&self) -> BencodeValue;

    fn encode_to_vec(&self) -> Vec<u8> {
        encode_to_vec(&self.to_bencode())
    }
}

impl ToBencode for BencodeValue {
    fn to_bencode(&self) -> BencodeValue {
        self.clone()
    }
}
