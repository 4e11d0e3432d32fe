//! String conversion
//!
//! Rendering values as literals and parsing them back, in the three modes the
//! engine understands. JSON goes through serde so map pairs keep their
//! insertion order on the way out and on the way in.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{self, Serialize, SerializeMap, SerializeSeq, Serializer};

use super::{Data, Value, ValueType};
use crate::error::{Error, Result};

/// `VALUE_STRING_CVT_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ConvertMode {
    /// Terse literal: top-level strings stay unquoted
    #[default]
    Simple = 0,
    JsonLiteral = 1,
    /// JSON object body without the enclosing braces
    JsonMap = 2,
}

impl Value {
    /// Render as a literal in the given mode
    pub fn to_literal(&self, mode: ConvertMode) -> Result<String> {
        match mode {
            ConvertMode::Simple => {
                if let Data::Text(s) = &self.data {
                    return Ok(s.clone());
                }
                if self.is_undefined() {
                    return Ok("undefined".to_string());
                }
                if let Some(opaque) = self.opaque_literal() {
                    return Ok(opaque.to_string());
                }
                Ok(serde_json::to_string(self)?)
            }
            ConvertMode::JsonLiteral => Ok(serde_json::to_string(self)?),
            ConvertMode::JsonMap => {
                let json = serde_json::to_string(self)?;
                if self.is_map() {
                    Ok(json[1..json.len() - 1].to_string())
                } else {
                    Ok(json)
                }
            }
        }
    }

    /// Replace the value with its string rendering
    pub fn convert_to_string(&mut self, mode: ConvertMode) -> Result<()> {
        let text = self.to_literal(mode)?;
        *self = Value::from(text);
        Ok(())
    }

    /// Parse a literal produced in the given mode.
    ///
    /// Simple mode never fails: anything that is not a keyword or a number
    /// comes back as a string.
    pub fn from_string(text: &str, mode: ConvertMode) -> Result<Value> {
        match mode {
            ConvertMode::Simple => Ok(parse_simple(text)),
            ConvertMode::JsonLiteral => {
                serde_json::from_str(text).map_err(|e| parse_error(text, &e, mode, 0))
            }
            ConvertMode::JsonMap => {
                let wrapped = format!("{{{}}}", text);
                serde_json::from_str(&wrapped).map_err(|e| parse_error(&wrapped, &e, mode, 1))
            }
        }
    }

    /// Placeholder text for kinds that have no literal form
    fn opaque_literal(&self) -> Option<&'static str> {
        if self.is_native_functor() {
            return Some("<functor>");
        }
        match self.t {
            ValueType::Function => Some("<function>"),
            ValueType::Object if self.is_function() => Some("<function>"),
            ValueType::Object => Some("<object>"),
            ValueType::DomObject => Some("<element>"),
            ValueType::Resource | ValueType::Asset => Some("<asset>"),
            ValueType::Range => Some("<range>"),
            _ => None,
        }
    }
}

fn parse_simple(text: &str) -> Value {
    let trimmed = text.trim();
    match trimmed {
        "undefined" => return Value::new(),
        "null" => return Value::null(),
        "true" => return Value::from(true),
        "false" => return Value::from(false),
        _ => {}
    }
    let numeric = trimmed
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric {
        if let Ok(i) = trimmed.parse::<i32>() {
            return Value::from(i);
        }
        if let Ok(i) = trimmed.parse::<i64>() {
            return Value::big_int(i);
        }
        // Infinities and NaN stay text
        if let Some(f) = trimmed.parse::<f64>().ok().filter(|f| f.is_finite()) {
            return Value::from(f);
        }
    }
    Value::from(text)
}

/// Character offset of a serde_json error, shifted back by the bytes we
/// prepended before parsing
fn parse_error(text: &str, err: &serde_json::Error, how: ConvertMode, shift: usize) -> Error {
    let before: usize = text
        .split('\n')
        .take(err.line().saturating_sub(1))
        .map(|line| line.chars().count() + 1)
        .sum();
    let position = (before + err.column().saturating_sub(1)).saturating_sub(shift);
    Error::Parse { how, position }
}

// ============================================================================
// serde
// ============================================================================

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        if let Some(opaque) = self.opaque_literal() {
            return serializer.serialize_str(opaque);
        }
        match &self.data {
            Data::Text(s) => serializer.serialize_str(s),
            Data::Bytes(b) => serializer.serialize_bytes(b),
            Data::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Data::Map(pairs) => {
                let mut map = serializer.serialize_map(Some(pairs.len()))?;
                for (k, v) in pairs {
                    map.serialize_entry(&MapKey(k), v)?;
                }
                map.end()
            }
            Data::Functor(_) => serializer.serialize_str("<functor>"),
            Data::Scalar(d) => {
                let d = *d;
                match self.t {
                    ValueType::Undefined | ValueType::Null => serializer.serialize_unit(),
                    ValueType::Bool => serializer.serialize_bool(d != 0),
                    ValueType::Int | ValueType::Enum => serializer.serialize_i32(d as i64 as i32),
                    ValueType::BigInt | ValueType::Date => serializer.serialize_i64(d as i64),
                    ValueType::Currency => serializer.serialize_f64(d as i64 as f64 / 10_000.0),
                    ValueType::Color => serializer.serialize_u32(d as u32),
                    t if t.is_float_kind() => serializer.serialize_f64(f64::from_bits(d)),
                    _ => serializer.serialize_u64(d),
                }
            }
        }
    }
}

/// JSON object keys must be strings
struct MapKey<'a>(&'a Value);

impl Serialize for MapKey<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match &self.0.data {
            Data::Text(s) => serializer.serialize_str(s),
            _ => {
                let text = self.0.to_literal(ConvertMode::Simple).map_err(<S::Error as ser::Error>::custom)?;
                serializer.serialize_str(&text)
            }
        }
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> std::result::Result<Value, E> {
        Ok(match i32::try_from(v) {
            Ok(i) => Value::from(i),
            Err(_) => Value::big_int(v),
        })
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> std::result::Result<Value, E> {
        match i64::try_from(v) {
            Ok(i) => self.visit_i64(i),
            Err(_) => Ok(Value::from(v as f64)),
        }
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_string<E: de::Error>(self, v: String) -> std::result::Result<Value, E> {
        Ok(Value::from(v))
    }

    fn visit_bytes<E: de::Error>(self, v: &[u8]) -> std::result::Result<Value, E> {
        Ok(Value::bytes(v))
    }

    fn visit_unit<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::null())
    }

    fn visit_none<E: de::Error>(self) -> std::result::Result<Value, E> {
        Ok(Value::null())
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> std::result::Result<Value, D::Error> {
        Value::deserialize(d)
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> std::result::Result<Value, A::Error> {
        let mut array = Value::array();
        while let Some(item) = seq.next_element::<Value>()? {
            array.append(item);
        }
        Ok(array)
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> std::result::Result<Value, A::Error> {
        let mut map = Value::map();
        while let Some((k, v)) = access.next_entry::<String, Value>()? {
            map.set(k, v);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_literal_array() {
        let mut v = Value::new();
        v.append(Value::from(10));
        v.append(Value::from(20));
        v.append(Value::from(30));
        assert_eq!(v.to_literal(ConvertMode::JsonLiteral).unwrap(), "[10,20,30]");
    }

    #[test]
    fn test_json_map_keeps_insertion_order() {
        let mut v = Value::map();
        v.set("z", Value::from(1));
        v.set("a", Value::from("two"));
        assert_eq!(v.to_literal(ConvertMode::JsonLiteral).unwrap(), r#"{"z":1,"a":"two"}"#);
        assert_eq!(v.to_literal(ConvertMode::JsonMap).unwrap(), r#""z":1,"a":"two""#);
    }

    #[test]
    fn test_simple_mode_strings_unquoted() {
        assert_eq!(Value::from("hi").to_literal(ConvertMode::Simple).unwrap(), "hi");
        assert_eq!(Value::from("hi").to_literal(ConvertMode::JsonLiteral).unwrap(), "\"hi\"");
        assert_eq!(Value::new().to_literal(ConvertMode::Simple).unwrap(), "undefined");
    }

    #[test]
    fn test_convert_to_string_in_place() {
        let mut v: Value = vec![Value::from(true), Value::null()].into_iter().collect();
        v.convert_to_string(ConvertMode::JsonLiteral).unwrap();
        assert!(v.is_string());
        assert_eq!(v.as_str(), Some("[true,null]"));
    }

    #[test]
    fn test_from_string_json() {
        let v = Value::from_string(r#"{"b":[1,2.5],"a":"x"}"#, ConvertMode::JsonLiteral).unwrap();
        assert!(v.is_map());
        assert_eq!(v.nth_key(0), Some(&Value::from("b")));
        let inner = v.get("b").unwrap();
        assert_eq!(inner.get_item(0), Some(&Value::from(1)));
        assert_eq!(inner.get_item(1), Some(&Value::from(2.5)));
    }

    #[test]
    fn test_from_string_json_map_body() {
        let v = Value::from_string(r#""k": 7"#, ConvertMode::JsonMap).unwrap();
        assert_eq!(v.get("k"), Some(&Value::from(7)));
    }

    #[test]
    fn test_from_string_reports_position() {
        let err = Value::from_string("[1, 2,, 3]", ConvertMode::JsonLiteral).unwrap_err();
        match err {
            Error::Parse { how, position } => {
                assert_eq!(how, ConvertMode::JsonLiteral);
                assert!(position >= 5 && position <= 7, "position {}", position);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_simple_parse_guesses() {
        assert_eq!(Value::from_string("42", ConvertMode::Simple).unwrap(), Value::from(42));
        assert_eq!(Value::from_string("-1.5", ConvertMode::Simple).unwrap(), Value::from(-1.5));
        assert_eq!(Value::from_string("true", ConvertMode::Simple).unwrap(), Value::from(true));
        assert!(Value::from_string("null", ConvertMode::Simple).unwrap().is_null());
        assert!(Value::from_string("9999999999", ConvertMode::Simple).unwrap().is_big_int());
        assert_eq!(
            Value::from_string("hello world", ConvertMode::Simple).unwrap(),
            Value::from("hello world")
        );
    }

    #[test]
    fn test_simple_parse_keeps_non_finite_words() {
        for word in ["inf", "+inf", "-inf", "nan", "-nan", "+infinity", "-NaN"] {
            assert_eq!(Value::from_string(word, ConvertMode::Simple).unwrap(), Value::from(word), "{word}");
        }
        assert_eq!(Value::from_string("1e3", ConvertMode::Simple).unwrap(), Value::from(1000.0));
        assert!(Value::from_string("1e999", ConvertMode::Simple).unwrap().is_string());
    }

    #[test]
    fn test_non_string_map_keys() {
        let mut v = Value::map();
        v.set(1, Value::from("one"));
        assert_eq!(v.to_literal(ConvertMode::JsonLiteral).unwrap(), r#"{"1":"one"}"#);
    }

    #[test]
    fn test_serde_json_value_interop() {
        let json = serde_json::json!({"name": "fos", "list": [1, 2]});
        let v: Value = serde_json::from_value(json).unwrap();
        assert_eq!(v.get("name").and_then(Value::as_str), Some("fos"));
        assert_eq!(v.get("list").map(Value::len), Some(2));
    }
}
