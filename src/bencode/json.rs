//! JSON rendering of a decoded bencode tree, used by the `decode` CLI
//! subcommand. Bencode strings are rendered as JSON strings on the
//! assumption that they're UTF-8 text; bencode integers become JSON
//! numbers; lists become arrays; dictionaries become objects with keys
//! in ascending order, which falls out of `BencodeValue::Dict` already
//! being a `BTreeMap`.
use super::BencodeValue;
use serde_json::Value;

pub fn to_json(value: &BencodeValue) -> Value {
    match value {
        BencodeValue::String(s) => Value::String(String::from_utf8_lossy(s).into_owned()),
        BencodeValue::Integer(i) => Value::Number((*i).into()),
        BencodeValue::List(items) => Value::Array(items.iter().map(to_json).collect()),
        BencodeValue::Dict(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (String::from_utf8_lossy(k).into_owned(), to_json(v)))
                .collect(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::super::decoder::decode_bytes;
    use super::*;

    #[test]
    fn renders_scalar_values() {
        assert_eq!(to_json(&decode_bytes(b"5:hello").unwrap()), "hello");
        assert_eq!(to_json(&decode_bytes(b"i52e").unwrap()), 52);
    }

    #[test]
    fn renders_list_and_dict() {
        let list = to_json(&decode_bytes(b"l5:helloi52ee").unwrap());
        assert_eq!(list, serde_json::json!(["hello", 52]));

        let dict = to_json(&decode_bytes(b"d3:bar4:spam3:fooi42ee").unwrap());
        assert_eq!(dict, serde_json::json!({"bar": "spam", "foo": 42}));
    }
}
