//! Value records
//!
//! The engine stores a value as a fixed 16-byte record `{t, u, d}`. Whole
//! values are flattened little-endian: every value starts with its record,
//! and bodies follow it directly. Strings are UTF-16 code units and `d` holds
//! their count. Bytes are copied verbatim with `d` as the length. Arrays are
//! followed by `d` encoded items, maps by `d` encoded key/value pairs.
//!
//! Native functors travel as their tag and come back as plain function
//! references. Writing a functor's record exports it: from then on the
//! closure stays registered until the engine releases the tag, whatever
//! happens to the host-side copies.

use super::{Data, Value, ValueType};
use crate::error::{Error, Result, ValueResult};

/// Size of one record
pub const RECORD_SIZE: usize = 16;

/// Deepest container nesting [`decode`] accepts
pub const MAX_DEPTH: usize = 512;

/// `VALUE`
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawValue {
    pub t: u32,
    pub u: u32,
    pub d: u64,
}

impl RawValue {
    pub fn to_le_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut out = [0u8; RECORD_SIZE];
        out[0..4].copy_from_slice(&self.t.to_le_bytes());
        out[4..8].copy_from_slice(&self.u.to_le_bytes());
        out[8..16].copy_from_slice(&self.d.to_le_bytes());
        out
    }

    pub fn from_le_bytes(bytes: [u8; RECORD_SIZE]) -> Self {
        let mut t = [0u8; 4];
        let mut u = [0u8; 4];
        let mut d = [0u8; 8];
        t.copy_from_slice(&bytes[0..4]);
        u.copy_from_slice(&bytes[4..8]);
        d.copy_from_slice(&bytes[8..16]);
        Self { t: u32::from_le_bytes(t), u: u32::from_le_bytes(u), d: u64::from_le_bytes(d) }
    }
}

/// Record header of a value, without its body. Exports native functors.
pub fn header(value: &Value) -> RawValue {
    let d = match &value.data {
        Data::Scalar(d) => *d,
        Data::Text(s) => s.encode_utf16().count() as u64,
        Data::Bytes(b) => b.len() as u64,
        Data::Array(items) => items.len() as u64,
        Data::Map(pairs) => pairs.len() as u64,
        Data::Functor(f) => f.export() as u64,
    };
    RawValue { t: value.t as u32, u: value.u, d }
}

/// Flatten a value into records and bodies
pub fn encode(value: &Value) -> Vec<u8> {
    let mut out = Vec::with_capacity(RECORD_SIZE);
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut Vec<u8>) {
    out.extend_from_slice(&header(value).to_le_bytes());
    match &value.data {
        Data::Text(s) => {
            for unit in s.encode_utf16() {
                out.extend_from_slice(&unit.to_le_bytes());
            }
        }
        Data::Bytes(b) => out.extend_from_slice(b),
        Data::Array(items) => {
            for item in items {
                write_value(item, out);
            }
        }
        Data::Map(pairs) => {
            for (k, v) in pairs {
                write_value(k, out);
                write_value(v, out);
            }
        }
        Data::Scalar(_) | Data::Functor(_) => {}
    }
}

/// Rebuild a value from its flattened form; the input must hold exactly one value
pub fn decode(bytes: &[u8]) -> Result<Value> {
    let mut reader = Reader { bytes, pos: 0 };
    let value = reader.value(0)?;
    if reader.pos != bytes.len() {
        return Err(bad_parameter());
    }
    Ok(value)
}

fn bad_parameter() -> Error {
    Error::Value { result: ValueResult::BadParameter, op: "ValueDecode" }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Reader<'_> {
    fn take(&mut self, len: usize) -> Result<&[u8]> {
        let end = self.pos.checked_add(len).ok_or_else(bad_parameter)?;
        let slice = self.bytes.get(self.pos..end).ok_or_else(bad_parameter)?;
        self.pos = end;
        Ok(slice)
    }

    fn record(&mut self) -> Result<RawValue> {
        let mut buf = [0u8; RECORD_SIZE];
        buf.copy_from_slice(self.take(RECORD_SIZE)?);
        Ok(RawValue::from_le_bytes(buf))
    }

    fn count(raw: &RawValue) -> Result<usize> {
        usize::try_from(raw.d).map_err(|_| bad_parameter())
    }

    fn value(&mut self, depth: usize) -> Result<Value> {
        if depth > MAX_DEPTH {
            return Err(bad_parameter());
        }
        let raw = self.record()?;
        let t = ValueType::from_raw(raw.t).ok_or(Error::Value {
            result: ValueResult::IncompatibleType,
            op: "ValueDecode",
        })?;
        let value = match t {
            ValueType::String => {
                let len = Self::count(&raw)?;
                let body = self.take(len.checked_mul(2).ok_or_else(bad_parameter)?)?;
                let units: Vec<u16> = body
                    .chunks_exact(2)
                    .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
                    .collect();
                let text = String::from_utf16(&units).map_err(|_| bad_parameter())?;
                Value { t, u: raw.u, data: Data::Text(text) }
            }
            ValueType::Bytes => {
                let len = Self::count(&raw)?;
                Value { t, u: raw.u, data: Data::Bytes(self.take(len)?.to_vec()) }
            }
            ValueType::Array => {
                let mut items = Vec::new();
                for _ in 0..Self::count(&raw)? {
                    items.push(self.value(depth + 1)?);
                }
                Value { t, u: raw.u, data: Data::Array(items) }
            }
            ValueType::Map => {
                let mut pairs = Vec::new();
                for _ in 0..Self::count(&raw)? {
                    let k = self.value(depth + 1)?;
                    let v = self.value(depth + 1)?;
                    // Keys are unique
                    if pairs.iter().any(|(seen, _)| *seen == k) {
                        return Err(bad_parameter());
                    }
                    pairs.push((k, v));
                }
                Value { t, u: raw.u, data: Data::Map(pairs) }
            }
            _ => Value::from_raw_parts(t, raw.u, raw.d),
        };
        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::unit;

    fn roundtrip(v: &Value) -> Value {
        decode(&encode(v)).unwrap()
    }

    #[test]
    fn test_record_layout() {
        assert_eq!(std::mem::size_of::<RawValue>(), RECORD_SIZE);
        let raw = RawValue { t: 3, u: 0, d: 0xFFFF_FFFF_FFFF_FFD6 };
        let bytes = raw.to_le_bytes();
        assert_eq!(&bytes[0..4], &[3, 0, 0, 0]);
        assert_eq!(bytes[8], 0xD6);
        assert_eq!(RawValue::from_le_bytes(bytes), raw);
    }

    #[test]
    fn test_int_header() {
        let raw = header(&Value::from(-42));
        assert_eq!(raw.t, ValueType::Int as u32);
        assert_eq!(raw.d as i64, -42);
    }

    #[test]
    fn test_string_body_is_utf16() {
        let bytes = encode(&Value::from("hé"));
        assert_eq!(bytes.len(), RECORD_SIZE + 4);
        assert_eq!(&bytes[RECORD_SIZE..], &[b'h', 0, 0xE9, 0]);
    }

    #[test]
    fn test_surrogate_pairs() {
        let v = Value::from("clef 𝄞 ok");
        let raw = header(&v);
        assert_eq!(raw.d, 10);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_nested_containers() {
        let mut v = Value::map();
        v.set("list", vec![Value::from(1), Value::from("two")].into_iter().collect());
        v.set("bytes", Value::bytes(&[0, 255]));
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_symbol_unit_survives() {
        let v = Value::symbol("ready");
        assert!(roundtrip(&v).is_symbol());
    }

    #[test]
    fn test_functor_travels_as_tag() {
        let f = Value::functor(|_| Value::new());
        let back = roundtrip(&f);
        assert!(back.is_function());
        assert!(!back.is_native_functor());
        assert_eq!(back.unit(), unit::OBJECT_NATIVE);
        assert!(crate::functor::release(header(&back).d as usize));
    }

    #[test]
    fn test_truncated_input() {
        let mut bytes = encode(&Value::from("abc"));
        bytes.pop();
        assert!(decode(&bytes).is_err());
        assert!(decode(&[0u8; 3]).is_err());
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let mut bytes = encode(&Value::from(1));
        bytes.push(0);
        assert!(decode(&bytes).is_err());
    }

    fn record(t: ValueType, d: u64) -> [u8; RECORD_SIZE] {
        RawValue { t: t as u32, u: 0, d }.to_le_bytes()
    }

    #[test]
    fn test_duplicate_map_key_rejected() {
        let mut bytes = record(ValueType::Map, 2).to_vec();
        for i in [1, 2] {
            bytes.extend(encode(&Value::from("k")));
            bytes.extend(encode(&Value::from(i)));
        }
        let err = decode(&bytes).unwrap_err();
        assert!(matches!(err, Error::Value { result: ValueResult::BadParameter, .. }));
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |levels: usize| {
            let mut bytes = Vec::new();
            for _ in 0..levels {
                bytes.extend(record(ValueType::Array, 1));
            }
            bytes.extend(record(ValueType::Int, 0));
            bytes
        };
        assert!(decode(&nested(MAX_DEPTH)).is_ok());
        assert!(decode(&nested(MAX_DEPTH + 1)).is_err());
    }

    #[test]
    fn test_unknown_type_tag() {
        let raw = RawValue { t: 999, u: 0, d: 0 };
        let err = decode(&raw.to_le_bytes()).unwrap_err();
        assert!(matches!(err, Error::Value { result: ValueResult::IncompatibleType, .. }));
    }
}
