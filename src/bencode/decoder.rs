//! Bencode decoding.
//!
//! Two entry points are provided over the same grammar (string, integer,
//! list, dictionary):
//!
//! - [`decode_bytes`] walks an in-memory slice with an advancing cursor.
//!   This is what the rest of the crate uses; the returned tree owns copies
//!   of every string so it has no lifetime tied to the input.
//! - [`decode_reader`] walks any [`Read`] with a one-byte lookahead buffer,
//!   for sources that aren't already fully buffered in memory.
use super::BencodeError;
use super::BencodeResult;
use super::BencodeValue;

use std::collections::BTreeMap;
use std::io::{self, Read};
use tracing::instrument;

/// Decodes a single bencode value from a byte slice.
///
/// Trailing bytes after the value are rejected with
/// [`BencodeError::TrailingBytes`].
#[instrument(skip(input), level = "trace")]
pub fn decode_bytes(input: &[u8]) -> BencodeResult<BencodeValue> {
    let (value, consumed) = decode_value_at(input, 0)?;
    if consumed != input.len() {
        return Err(BencodeError::TrailingBytes);
    }
    Ok(value)
}

/// Decodes the value starting at `offset`, returning it along with the
/// offset of the first byte past the value.
fn decode_value_at(input: &[u8], offset: usize) -> BencodeResult<(BencodeValue, usize)> {
    let &tag = input.get(offset).ok_or(BencodeError::UnexpectedEof)?;
    match tag {
        b'0'..=b'9' => {
            let (s, next) = decode_string_at(input, offset)?;
            Ok((BencodeValue::String(s), next))
        }
        b'i' => {
            let (i, next) = decode_integer_at(input, offset)?;
            Ok((BencodeValue::Integer(i), next))
        }
        b'l' => decode_list_at(input, offset),
        b'd' => decode_dict_at(input, offset),
        _ => Err(BencodeError::InvalidToken { offset }),
    }
}

fn decode_string_at(input: &[u8], offset: usize) -> BencodeResult<(Vec<u8>, usize)> {
    let colon = input[offset..]
        .iter()
        .position(|&b| b == b':')
        .ok_or(BencodeError::UnexpectedEof)?
        + offset;
    let len_str = std::str::from_utf8(&input[offset..colon])
        .map_err(|e| BencodeError::InvalidLength(e.to_string()))?;
    let len: usize = len_str
        .parse()
        .map_err(|_| BencodeError::InvalidLength(len_str.to_string()))?;
    let start = colon + 1;
    let end = start
        .checked_add(len)
        .ok_or_else(|| BencodeError::InvalidLength(len_str.to_string()))?;
    if end > input.len() {
        return Err(BencodeError::UnexpectedEof);
    }
    Ok((input[start..end].to_vec(), end))
}

fn decode_integer_at(input: &[u8], offset: usize) -> BencodeResult<(i64, usize)> {
    debug_assert_eq!(input[offset], b'i');
    let end = input[offset..]
        .iter()
        .position(|&b| b == b'e')
        .ok_or(BencodeError::UnexpectedEof)?
        + offset;
    let num_str = std::str::from_utf8(&input[offset + 1..end])
        .map_err(|e| BencodeError::InvalidInteger(e.to_string()))?;
    validate_integer_body(num_str)?;
    let value = num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger(num_str.to_string()))?;
    Ok((value, end + 1))
}

/// Rejects the grammar's informally-specified malformed integer bodies:
/// empty bodies, "-0", and leading zeros on multi-digit numbers.
fn validate_integer_body(num_str: &str) -> BencodeResult<()> {
    if num_str.is_empty() {
        return Err(BencodeError::InvalidInteger("empty integer".to_string()));
    }
    if num_str == "-0" {
        return Err(BencodeError::InvalidInteger(
            "-0 is not allowed".to_string(),
        ));
    }
    let digits = num_str.strip_prefix('-').unwrap_or(num_str);
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(BencodeError::InvalidInteger(num_str.to_string()));
    }
    if digits.len() > 1 && digits.starts_with('0') {
        return Err(BencodeError::InvalidInteger(format!(
            "leading zero in {num_str}"
        )));
    }
    Ok(())
}

fn decode_list_at(input: &[u8], offset: usize) -> BencodeResult<(BencodeValue, usize)> {
    debug_assert_eq!(input[offset], b'l');
    let mut items = Vec::new();
    let mut pos = offset + 1;
    loop {
        match input.get(pos) {
            None => return Err(BencodeError::UnexpectedEof),
            Some(b'e') => {
                pos += 1;
                break;
            }
            Some(_) => {
                let (item, next) = decode_value_at(input, pos)?;
                items.push(item);
                pos = next;
            }
        }
    }
    Ok((BencodeValue::List(items), pos))
}

fn decode_dict_at(input: &[u8], offset: usize) -> BencodeResult<(BencodeValue, usize)> {
    debug_assert_eq!(input[offset], b'd');
    let mut map = BTreeMap::new();
    let mut pos = offset + 1;
    loop {
        match input.get(pos) {
            None => return Err(BencodeError::UnexpectedEof),
            Some(b'e') => {
                pos += 1;
                break;
            }
            Some(b'0'..=b'9') => {
                let (key, next) = decode_string_at(input, pos)?;
                let (value, next) = decode_value_at(input, next)?;
                map.insert(key, value);
                pos = next;
            }
            Some(_) => return Err(BencodeError::DictKeyNotString),
        }
    }
    Ok((BencodeValue::Dict(map), pos))
}

/// Decodes a bencode string from a reader using a one-byte lookahead buffer.
///
/// Reads a bencode string in the format `<length>:<data>` where `<length>`
/// is a decimal number and `<data>` is that many raw bytes.
#[instrument(skip(reader), level = "trace")]
pub fn decode_string<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<u8>> {
    let length_str = read_until(reader, b':')?;
    let length = length_str
        .parse::<usize>()
        .map_err(|_| BencodeError::InvalidLength(length_str))?;

    let mut string_bytes = vec![0; length];
    for byte in string_bytes.iter_mut() {
        *byte = reader
            .next()
            .ok_or(BencodeError::UnexpectedEof)?
            .map_err(BencodeError::Io)?;
    }
    Ok(string_bytes)
}

/// Reads bytes from the reader until a specified delimiter is encountered,
/// returning the bytes read (excluding the delimiter) as a UTF-8 string.
#[instrument(skip(reader), level = "trace")]
pub fn read_until<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
    delimiter: u8,
) -> BencodeResult<String> {
    let mut buffer = Vec::new();

    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEof)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == delimiter {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEof)?
                .map_err(BencodeError::Io)?;
            break;
        }
        buffer.push(
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEof)?
                .map_err(BencodeError::Io)?,
        );
    }

    String::from_utf8(buffer)
        .map_err(|e| BencodeError::InvalidLength(format!("non-UTF8 digits: {e}")))
}

/// Decodes a bencode integer (`i<digits>e`) from a reader.
#[instrument(skip(reader), level = "trace")]
pub fn decode_integer<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<i64> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEof)?
        .map_err(BencodeError::Io)?;
    if first_byte != b'i' {
        return Err(BencodeError::InvalidInteger(
            "integer must start with 'i'".to_string(),
        ));
    }

    let num_str = read_until(reader, b'e')?;
    validate_integer_body(&num_str)?;
    num_str
        .parse::<i64>()
        .map_err(|_| BencodeError::InvalidInteger(num_str))
}

#[instrument(skip(reader), level = "trace")]
fn decode_list<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<Vec<BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEof)?
        .map_err(BencodeError::Io)?;
    if first_byte != b'l' {
        return Err(BencodeError::InvalidToken { offset: 0 });
    }

    let mut list = Vec::new();
    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEof)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEof)?
                .map_err(BencodeError::Io)?;
            break;
        }
        list.push(decode_next(reader)?);
    }
    Ok(list)
}

#[instrument(skip(reader), level = "trace")]
fn decode_dict<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<BTreeMap<Vec<u8>, BencodeValue>> {
    let first_byte = reader
        .next()
        .ok_or(BencodeError::UnexpectedEof)?
        .map_err(BencodeError::Io)?;
    if first_byte != b'd' {
        return Err(BencodeError::InvalidToken { offset: 0 });
    }

    let mut dict = BTreeMap::new();
    loop {
        let &current_byte = reader
            .peek()
            .ok_or(BencodeError::UnexpectedEof)?
            .as_ref()
            .map_err(|e| BencodeError::Io(e.kind().into()))?;

        if current_byte == b'e' {
            reader
                .next()
                .ok_or(BencodeError::UnexpectedEof)?
                .map_err(BencodeError::Io)?;
            break;
        }
        let key = decode_string(reader)?;
        let value = decode_next(reader)?;
        dict.insert(key, value);
    }
    Ok(dict)
}

#[instrument(skip(reader), level = "trace")]
fn decode_next<R: Read>(
    reader: &mut std::iter::Peekable<io::Bytes<R>>,
) -> BencodeResult<BencodeValue> {
    let &first_byte = reader
        .peek()
        .ok_or(BencodeError::UnexpectedEof)?
        .as_ref()
        .map_err(|e| BencodeError::Io(e.kind().into()))?;

    match first_byte {
        b'0'..=b'9' => decode_string(reader).map(BencodeValue::String),
        b'i' => decode_integer(reader).map(BencodeValue::Integer),
        b'l' => decode_list(reader).map(BencodeValue::List),
        b'd' => decode_dict(reader).map(BencodeValue::Dict),
        _ => Err(BencodeError::InvalidToken { offset: 0 }),
    }
}

/// Decodes a single bencode value from any [`Read`] source, buffered one
/// byte at a time via a peekable iterator so the variant tag can be
/// inspected without consuming it.
#[instrument(skip(reader), level = "debug")]
pub fn decode_reader<R: Read>(reader: R) -> BencodeResult<BencodeValue> {
    let mut peekable = reader.bytes().peekable();
    decode_next(&mut peekable)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_empty_string() {
        assert_eq!(
            decode_bytes(b"0:").unwrap(),
            BencodeValue::String(Vec::new())
        );
    }

    #[test]
    fn decodes_string() {
        assert_eq!(
            decode_bytes(b"5:hello").unwrap(),
            BencodeValue::String(b"hello".to_vec())
        );
    }

    #[test]
    fn decodes_integer() {
        assert_eq!(decode_bytes(b"i52e").unwrap(), BencodeValue::Integer(52));
        assert_eq!(decode_bytes(b"i0e").unwrap(), BencodeValue::Integer(0));
        assert_eq!(decode_bytes(b"i-42e").unwrap(), BencodeValue::Integer(-42));
    }

    #[test]
    fn rejects_negative_zero() {
        assert!(decode_bytes(b"i-0e").is_err());
    }

    #[test]
    fn rejects_leading_zero() {
        assert!(decode_bytes(b"i042e").is_err());
    }

    #[test]
    fn decodes_list() {
        assert_eq!(
            decode_bytes(b"l5:helloi52ee").unwrap(),
            BencodeValue::List(vec![
                BencodeValue::String(b"hello".to_vec()),
                BencodeValue::Integer(52),
            ])
        );
    }

    #[test]
    fn decodes_empty_list_and_dict() {
        assert_eq!(decode_bytes(b"le").unwrap(), BencodeValue::List(vec![]));
        assert_eq!(
            decode_bytes(b"de").unwrap(),
            BencodeValue::Dict(BTreeMap::new())
        );
    }

    #[test]
    fn decodes_dict_sorted_by_key() {
        let value = decode_bytes(b"d3:bar4:spam3:fooi42ee").unwrap();
        let BencodeValue::Dict(map) = value else {
            panic!("expected dict");
        };
        let keys: Vec<&Vec<u8>> = map.keys().collect();
        assert_eq!(keys, vec![&b"bar".to_vec(), &b"foo".to_vec()]);
    }

    #[test]
    fn rejects_truncated_input() {
        assert!(matches!(
            decode_bytes(b"5:hel"),
            Err(BencodeError::UnexpectedEof)
        ));
    }

    #[test]
    fn rejects_bad_first_byte() {
        assert!(matches!(
            decode_bytes(b"x"),
            Err(BencodeError::InvalidToken { .. })
        ));
    }

    #[test]
    fn rejects_trailing_bytes() {
        assert!(matches!(
            decode_bytes(b"i1ei2e"),
            Err(BencodeError::TrailingBytes)
        ));
    }

    #[test]
    fn reader_decoder_matches_slice_decoder() {
        let input: &[u8] = b"d3:bar4:spam3:fooi42ee";
        let from_slice = decode_bytes(input).unwrap();
        let from_reader = decode_reader(input).unwrap();
        assert_eq!(from_slice, from_reader);
    }
}
