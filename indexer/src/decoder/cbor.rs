//! Accessors over `ciborium::Value` and canonical re-encoding.
//!
//! Node payloads are heterogeneous positional arrays, so the decoder works
//! on the untyped value tree and checks every shape by hand. Each accessor
//! takes a short label that ends up in the `DecodeError`.

use ciborium::value::Value;

use super::DecodeError;
use crate::crypto::Hash;

/// CBOR tag wrapping an embedded CBOR byte string.
pub const TAG_ENCODED_CBOR: u64 = 24;

/// Indefinite-length array start marker.
const INDEFINITE_ARRAY: u8 = 0x9f;

/// "break" stop code closing an indefinite-length item.
const BREAK: u8 = 0xff;

pub fn decode(bytes: &[u8]) -> Result<Value, DecodeError> {
    ciborium::de::from_reader(bytes).map_err(|e| DecodeError::Cbor(format!("{e:?}")))
}

pub fn encode(value: &Value) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    ciborium::ser::into_writer(value, &mut out).map_err(|e| DecodeError::Cbor(format!("{e:?}")))?;
    Ok(out)
}

/// Encode `items` as an indefinite-length array: `0x9f item.. 0xff`.
pub fn encode_indefinite(items: &[Value]) -> Result<Vec<u8>, DecodeError> {
    let mut out = vec![INDEFINITE_ARRAY];
    for item in items {
        out.extend_from_slice(&encode(item)?);
    }
    out.push(BREAK);
    Ok(out)
}

pub fn array<'a>(value: &'a Value, what: &'static str) -> Result<&'a [Value], DecodeError> {
    match value {
        Value::Array(items) => Ok(items),
        other => Err(DecodeError::malformed(what, format!("expected array, got {}", kind(other)))),
    }
}

/// An array with at least `len` elements.
pub fn array_min<'a>(
    value: &'a Value,
    len: usize,
    what: &'static str,
) -> Result<&'a [Value], DecodeError> {
    let items = array(value, what)?;
    if items.len() < len {
        return Err(DecodeError::malformed(
            what,
            format!("expected at least {len} elements, got {}", items.len()),
        ));
    }
    Ok(items)
}

pub fn uint(value: &Value, what: &'static str) -> Result<u64, DecodeError> {
    match value {
        Value::Integer(i) => {
            u64::try_from(*i).map_err(|_| DecodeError::malformed(what, "integer out of u64 range"))
        }
        other => Err(DecodeError::malformed(what, format!("expected integer, got {}", kind(other)))),
    }
}

pub fn bytes<'a>(value: &'a Value, what: &'static str) -> Result<&'a [u8], DecodeError> {
    match value {
        Value::Bytes(b) => Ok(b),
        other => Err(DecodeError::malformed(what, format!("expected bytes, got {}", kind(other)))),
    }
}

pub fn hash(value: &Value, what: &'static str) -> Result<Hash, DecodeError> {
    let raw = bytes(value, what)?;
    <[u8; 32]>::try_from(raw)
        .map_err(|_| DecodeError::malformed(what, format!("expected 32 bytes, got {}", raw.len())))
}

/// Unwrap `tag(24, bytes)` and decode the embedded CBOR.
pub fn embedded(value: &Value, what: &'static str) -> Result<Value, DecodeError> {
    match value {
        Value::Tag(TAG_ENCODED_CBOR, inner) => decode(bytes(inner, what)?),
        other => Err(DecodeError::malformed(
            what,
            format!("expected tag 24, got {}", kind(other)),
        )),
    }
}

/// True for `[]`, `{}`, empty byte/text strings and null.
pub fn is_empty(value: &Value) -> bool {
    match value {
        Value::Array(items) => items.is_empty(),
        Value::Map(entries) => entries.is_empty(),
        Value::Bytes(b) => b.is_empty(),
        Value::Text(t) => t.is_empty(),
        Value::Null => true,
        _ => false,
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Integer(_) => "integer",
        Value::Bytes(_) => "bytes",
        Value::Float(_) => "float",
        Value::Text(_) => "text",
        Value::Bool(_) => "bool",
        Value::Null => "null",
        Value::Tag(_, _) => "tag",
        Value::Array(_) => "array",
        Value::Map(_) => "map",
        _ => "unknown",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indefinite_array_framing() {
        let items = vec![Value::Integer(1.into()), Value::Integer(2.into())];
        let encoded = encode_indefinite(&items).unwrap();
        assert_eq!(encoded, vec![0x9f, 0x01, 0x02, 0xff]);

        let empty = encode_indefinite(&[]).unwrap();
        assert_eq!(empty, vec![0x9f, 0xff]);
    }

    #[test]
    fn indefinite_array_decodes_to_same_items() {
        let items = vec![Value::Bytes(vec![1, 2, 3]), Value::Text("x".into())];
        let encoded = encode_indefinite(&items).unwrap();
        assert_eq!(decode(&encoded).unwrap(), Value::Array(items));
    }

    #[test]
    fn embedded_cbor_unwraps_tag_24() {
        let inner = encode(&Value::Array(vec![Value::Integer(7.into())])).unwrap();
        let tagged = Value::Tag(TAG_ENCODED_CBOR, Box::new(Value::Bytes(inner)));
        let value = embedded(&tagged, "input").unwrap();
        assert_eq!(value, Value::Array(vec![Value::Integer(7.into())]));

        let wrong = Value::Tag(25, Box::new(Value::Bytes(vec![])));
        assert!(embedded(&wrong, "input").is_err());
    }

    #[test]
    fn accessors_reject_wrong_shapes() {
        assert!(uint(&Value::Text("1".into()), "n").is_err());
        assert!(hash(&Value::Bytes(vec![0; 31]), "h").is_err());
        assert!(array_min(&Value::Array(vec![]), 1, "a").is_err());
        assert_eq!(uint(&Value::Integer(42.into()), "n").unwrap(), 42);
    }

    #[test]
    fn emptiness() {
        assert!(is_empty(&Value::Array(vec![])));
        assert!(is_empty(&Value::Null));
        assert!(!is_empty(&Value::Array(vec![Value::Null])));
        assert!(!is_empty(&Value::Integer(0.into())));
    }
}
