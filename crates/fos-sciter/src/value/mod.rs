//! Tagged values
//!
//! `Value` is the dynamically typed variant exchanged with the engine: a type
//! tag, a unit sub-discriminant and one payload. Owned payloads (text, bytes,
//! arrays, maps, native functor references) are dropped whenever the value
//! switches variant, so a value only ever holds the payload of its current
//! type.
//!
//! Typed accessors come in pairs. `as_*` is strict and returns `None` on a
//! type mismatch. `to_*` is lossy: it returns the zero value of the requested
//! type instead of failing.

mod convert;
pub mod wire;

pub use convert::ConvertMode;

use std::fmt;
use std::rc::Rc;

use crate::api;
use crate::error::{Error, Result, ValueResult};
use crate::functor::{self, FunctorRef};
use crate::types::ElementHandle;

/// `VALUE_TYPE`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ValueType {
    #[default]
    Undefined = 0,
    Null = 1,
    Bool = 2,
    Int = 3,
    Float = 4,
    String = 5,
    /// 100ns ticks since 1601-01-01 (FILETIME)
    Date = 6,
    /// Fixed point, 1/10000 units
    Currency = 7,
    /// Length with a CSS unit in `u`
    Length = 8,
    Array = 9,
    Map = 10,
    Function = 11,
    Bytes = 12,
    Object = 13,
    DomObject = 14,
    Resource = 15,
    Range = 16,
    /// Seconds
    Duration = 17,
    /// Radians
    Angle = 18,
    /// 0xAABBGGRR
    Color = 19,
    Enum = 20,
    Asset = 21,
    BigInt = 22,
}

impl ValueType {
    pub fn from_raw(t: u32) -> Option<Self> {
        Some(match t {
            0 => Self::Undefined,
            1 => Self::Null,
            2 => Self::Bool,
            3 => Self::Int,
            4 => Self::Float,
            5 => Self::String,
            6 => Self::Date,
            7 => Self::Currency,
            8 => Self::Length,
            9 => Self::Array,
            10 => Self::Map,
            11 => Self::Function,
            12 => Self::Bytes,
            13 => Self::Object,
            14 => Self::DomObject,
            15 => Self::Resource,
            16 => Self::Range,
            17 => Self::Duration,
            18 => Self::Angle,
            19 => Self::Color,
            20 => Self::Enum,
            21 => Self::Asset,
            22 => Self::BigInt,
            _ => return None,
        })
    }

    /// Kinds whose scalar payload holds the bits of an `f64`
    fn is_float_kind(self) -> bool {
        matches!(self, Self::Float | Self::Length | Self::Duration | Self::Angle)
    }

    /// Kinds whose scalar payload holds a sign-extended `i32`
    fn is_int_kind(self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Enum)
    }
}

/// Unit sub-discriminants
pub mod unit {
    /// `undefined` meaning "no value at all"
    pub const NOTHING: u32 = 1;

    pub const STRING: u32 = 0;
    /// String carrying an error message
    pub const STRING_ERROR: u32 = 1;
    pub const STRING_SECURE: u32 = 2;
    pub const SYMBOL: u32 = 0xFFFF;

    pub const OBJECT_ARRAY: u32 = 0;
    pub const OBJECT_OBJECT: u32 = 1;
    pub const OBJECT_CLASS: u32 = 2;
    pub const OBJECT_NATIVE: u32 = 3;
    pub const OBJECT_FUNCTION: u32 = 4;
    pub const OBJECT_ERROR: u32 = 5;

    pub const DT_HAS_DATE: u32 = 0x01;
    pub const DT_HAS_TIME: u32 = 0x02;
    pub const DT_HAS_SECONDS: u32 = 0x04;
    pub const DT_UTC: u32 = 0x10;
}

/// Largest array `set_item` will grow to; the engine counts items in a `u32`
pub const MAX_ARRAY_LEN: usize = 1 << 24;

/// Payload of the current variant
#[derive(Debug, Clone)]
enum Data {
    Scalar(u64),
    Text(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Functor(Rc<FunctorRef>),
}

impl Default for Data {
    fn default() -> Self {
        Data::Scalar(0)
    }
}

/// Dynamically typed engine value
#[derive(Debug, Clone, Default)]
pub struct Value {
    t: ValueType,
    u: u32,
    data: Data,
}

impl Value {
    /// `undefined`
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nothing() -> Self {
        Self { u: unit::NOTHING, ..Self::default() }
    }

    pub fn null() -> Self {
        Self::scalar(ValueType::Null, 0, 0)
    }

    fn scalar(t: ValueType, u: u32, d: u64) -> Self {
        Self { t, u, data: Data::Scalar(d) }
    }

    /// Rebuild a value from a bare record. Container kinds come back empty,
    /// every other kind keeps `d` as its scalar payload (for functions and
    /// objects that is the engine-side reference).
    pub fn from_raw_parts(t: ValueType, u: u32, d: u64) -> Self {
        let data = match t {
            ValueType::String => Data::Text(String::new()),
            ValueType::Bytes => Data::Bytes(Vec::new()),
            ValueType::Array => Data::Array(Vec::new()),
            ValueType::Map => Data::Map(Vec::new()),
            _ => Data::Scalar(d),
        };
        Self { t, u, data }
    }

    /// Empty array
    pub fn array() -> Self {
        Self { t: ValueType::Array, u: 0, data: Data::Array(Vec::new()) }
    }

    /// Empty map
    pub fn map() -> Self {
        Self { t: ValueType::Map, u: 0, data: Data::Map(Vec::new()) }
    }

    pub fn symbol(name: &str) -> Self {
        Self { t: ValueType::String, u: unit::SYMBOL, data: Data::Text(name.to_string()) }
    }

    /// String flagged as an error, returned by handlers to signal failure
    pub fn error_string(message: &str) -> Self {
        Self { t: ValueType::String, u: unit::STRING_ERROR, data: Data::Text(message.to_string()) }
    }

    pub fn bytes(bytes: &[u8]) -> Self {
        Self { t: ValueType::Bytes, u: 0, data: Data::Bytes(bytes.to_vec()) }
    }

    /// Currency in 1/10000 units
    pub fn currency(ticks: i64) -> Self {
        Self::scalar(ValueType::Currency, 0, ticks as u64)
    }

    /// Date as FILETIME ticks, `flags` is a combination of the `unit::DT_*` bits
    pub fn date(filetime: i64, flags: u32) -> Self {
        Self::scalar(ValueType::Date, flags, filetime as u64)
    }

    pub fn color(abgr: u32) -> Self {
        Self::scalar(ValueType::Color, 0, abgr as u64)
    }

    pub fn duration(seconds: f64) -> Self {
        Self::scalar(ValueType::Duration, 0, seconds.to_bits())
    }

    pub fn angle(radians: f64) -> Self {
        Self::scalar(ValueType::Angle, 0, radians.to_bits())
    }

    pub fn big_int(v: i64) -> Self {
        Self::scalar(ValueType::BigInt, 0, v as u64)
    }

    /// Reference to a DOM element
    pub fn element(he: ElementHandle) -> Self {
        Self::scalar(ValueType::DomObject, 0, he.0 as u64)
    }

    /// Wrap a host closure as a scriptable function.
    ///
    /// The closure lives in the functor map until the last copy of the value
    /// is dropped, which releases its tag. Once the value has been encoded
    /// for the engine, only the engine's release removes it.
    pub fn functor<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Value + 'static,
    {
        let tag = functor::register(Rc::new(f));
        Self {
            t: ValueType::Function,
            u: unit::OBJECT_NATIVE,
            data: Data::Functor(Rc::new(FunctorRef::new(tag))),
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn value_type(&self) -> ValueType {
        self.t
    }

    pub fn unit(&self) -> u32 {
        self.u
    }

    pub fn is_undefined(&self) -> bool {
        self.t == ValueType::Undefined
    }

    pub fn is_nothing(&self) -> bool {
        self.t == ValueType::Undefined && self.u == unit::NOTHING
    }

    pub fn is_null(&self) -> bool {
        self.t == ValueType::Null
    }

    pub fn is_bool(&self) -> bool {
        self.t == ValueType::Bool
    }

    pub fn is_int(&self) -> bool {
        self.t == ValueType::Int
    }

    pub fn is_big_int(&self) -> bool {
        self.t == ValueType::BigInt
    }

    pub fn is_float(&self) -> bool {
        self.t == ValueType::Float
    }

    pub fn is_string(&self) -> bool {
        self.t == ValueType::String
    }

    pub fn is_symbol(&self) -> bool {
        self.t == ValueType::String && self.u == unit::SYMBOL
    }

    pub fn is_error_string(&self) -> bool {
        self.t == ValueType::String && self.u == unit::STRING_ERROR
    }

    pub fn is_bytes(&self) -> bool {
        self.t == ValueType::Bytes
    }

    pub fn is_array(&self) -> bool {
        self.t == ValueType::Array
    }

    pub fn is_map(&self) -> bool {
        self.t == ValueType::Map
    }

    pub fn is_function(&self) -> bool {
        self.t == ValueType::Function
            || (self.t == ValueType::Object && self.u == unit::OBJECT_FUNCTION)
    }

    pub fn is_native_functor(&self) -> bool {
        matches!(self.data, Data::Functor(_))
    }

    pub fn is_object(&self) -> bool {
        self.t == ValueType::Object
    }

    pub fn is_dom_element(&self) -> bool {
        self.t == ValueType::DomObject
    }

    pub fn is_date(&self) -> bool {
        self.t == ValueType::Date
    }

    pub fn is_currency(&self) -> bool {
        self.t == ValueType::Currency
    }

    pub fn is_color(&self) -> bool {
        self.t == ValueType::Color
    }

    pub fn is_duration(&self) -> bool {
        self.t == ValueType::Duration
    }

    pub fn is_angle(&self) -> bool {
        self.t == ValueType::Angle
    }

    fn scalar_bits(&self) -> Option<u64> {
        match self.data {
            Data::Scalar(d) => Some(d),
            _ => None,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn as_bool(&self) -> Option<bool> {
        if self.t.is_int_kind() {
            self.scalar_bits().map(|d| d != 0)
        } else {
            None
        }
    }

    /// 32-bit integer view; booleans read as 0/1
    pub fn as_int(&self) -> Option<i32> {
        if self.t.is_int_kind() {
            self.scalar_bits().map(|d| d as i64 as i32)
        } else {
            None
        }
    }

    /// 64-bit integer view; also reads 32-bit integers and booleans
    pub fn as_int64(&self) -> Option<i64> {
        match self.t {
            ValueType::BigInt => self.scalar_bits().map(|d| d as i64),
            _ => self.as_int().map(i64::from),
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        if self.t.is_float_kind() {
            self.scalar_bits().map(f64::from_bits)
        } else {
            None
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.data {
            Data::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match &self.data {
            Data::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_currency(&self) -> Option<i64> {
        (self.t == ValueType::Currency).then(|| self.scalar_bits()).flatten().map(|d| d as i64)
    }

    pub fn as_date(&self) -> Option<i64> {
        (self.t == ValueType::Date).then(|| self.scalar_bits()).flatten().map(|d| d as i64)
    }

    pub fn as_color(&self) -> Option<u32> {
        (self.t == ValueType::Color).then(|| self.scalar_bits()).flatten().map(|d| d as u32)
    }

    pub fn as_element(&self) -> Option<ElementHandle> {
        (self.t == ValueType::DomObject)
            .then(|| self.scalar_bits())
            .flatten()
            .map(|d| ElementHandle(d as usize))
    }

    /// Items of an array
    pub fn as_slice(&self) -> Option<&[Value]> {
        match &self.data {
            Data::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Lossy: `false` on mismatch
    pub fn to_bool(&self) -> bool {
        self.as_bool().unwrap_or(false)
    }

    /// Lossy: `0` on mismatch
    pub fn to_int(&self) -> i32 {
        self.as_int().unwrap_or(0)
    }

    /// Lossy: `0` on mismatch
    pub fn to_int64(&self) -> i64 {
        self.as_int64().unwrap_or(0)
    }

    /// Lossy: `0.0` on mismatch
    pub fn to_float(&self) -> f64 {
        self.as_float().unwrap_or(0.0)
    }

    /// Lossy: empty on mismatch
    pub fn to_str(&self) -> &str {
        self.as_str().unwrap_or("")
    }

    /// Lossy: empty on mismatch
    pub fn to_bytes(&self) -> &[u8] {
        self.as_bytes().unwrap_or(&[])
    }

    // ========================================================================
    // Setters
    // ========================================================================

    pub fn set_int(&mut self, v: i32) {
        *self = Value::from(v);
    }

    pub fn set_bool(&mut self, v: bool) {
        *self = Value::from(v);
    }

    pub fn set_float(&mut self, v: f64) {
        *self = Value::from(v);
    }

    pub fn set_string(&mut self, s: &str) {
        *self = Value::from(s);
    }

    pub fn set_bytes(&mut self, bytes: &[u8]) {
        *self = Value::bytes(bytes);
    }

    /// Reset to `undefined`, dropping the payload. Safe to repeat.
    pub fn clear(&mut self) {
        *self = Value::new();
    }

    // ========================================================================
    // Collections
    // ========================================================================

    /// Number of array items or map pairs, 0 for anything else
    pub fn len(&self) -> usize {
        match &self.data {
            Data::Array(items) => items.len(),
            Data::Map(pairs) => pairs.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// N-th array item, or the value of the n-th map pair
    pub fn get_item(&self, index: usize) -> Option<&Value> {
        match &self.data {
            Data::Array(items) => items.get(index),
            Data::Map(pairs) => pairs.get(index).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Key of the n-th map pair
    pub fn nth_key(&self, index: usize) -> Option<&Value> {
        match &self.data {
            Data::Map(pairs) => pairs.get(index).map(|(k, _)| k),
            _ => None,
        }
    }

    /// Store `item` at `index`.
    ///
    /// Arrays grow, padding with `undefined`, up to [`MAX_ARRAY_LEN`] items.
    /// Maps replace the value of the n-th pair and reject an index past the
    /// end. Any other value becomes an array first, dropping its old payload.
    pub fn set_item(&mut self, index: usize, item: Value) -> Result<()> {
        if let Data::Map(pairs) = &mut self.data {
            return match pairs.get_mut(index) {
                Some(pair) => {
                    pair.1 = item;
                    Ok(())
                }
                None => Err(Error::Value {
                    result: ValueResult::BadParameter,
                    op: "ValueNthElementValueSet",
                }),
            };
        }
        let len = index.checked_add(1).filter(|&len| len <= MAX_ARRAY_LEN).ok_or(Error::Value {
            result: ValueResult::BadParameter,
            op: "ValueNthElementValueSet",
        })?;
        if !self.is_array() {
            *self = Value::array();
        }
        if let Data::Array(items) = &mut self.data {
            if len > items.len() {
                items.resize(len, Value::new());
            }
            items[index] = item;
        }
        Ok(())
    }

    /// Push to the end of an array; non-arrays become an empty array first
    pub fn append(&mut self, item: Value) {
        if !self.is_array() {
            *self = Value::array();
        }
        if let Data::Array(items) = &mut self.data {
            items.push(item);
        }
    }

    /// Set `key` to `item`, keeping the position of an existing key.
    /// Non-maps become an empty map first, dropping their old payload.
    pub fn set(&mut self, key: impl Into<Value>, item: Value) {
        let key = key.into();
        if !self.is_map() {
            *self = Value::map();
        }
        if let Data::Map(pairs) = &mut self.data {
            match pairs.iter_mut().find(|(k, _)| *k == key) {
                Some(pair) => pair.1 = item,
                None => pairs.push((key, item)),
            }
        }
    }

    pub fn get(&self, key: impl Into<Value>) -> Option<&Value> {
        let key = key.into();
        match &self.data {
            Data::Map(pairs) => pairs.iter().find(|(k, _)| *k == key).map(|(_, v)| v),
            _ => None,
        }
    }

    /// Visit key/value pairs in order until `f` returns `false`.
    ///
    /// Array keys are the item indices.
    pub fn enumerate<F>(&self, mut f: F) -> Result<()>
    where
        F: FnMut(&Value, &Value) -> bool,
    {
        match &self.data {
            Data::Array(items) => {
                for (i, item) in items.iter().enumerate() {
                    if !f(&Value::from(i as i32), item) {
                        break;
                    }
                }
            }
            Data::Map(pairs) => {
                for (k, v) in pairs {
                    if !f(k, v) {
                        break;
                    }
                }
            }
            _ => {
                return Err(Error::Value {
                    result: ValueResult::IncompatibleType,
                    op: "ValueEnumElements",
                });
            }
        }
        Ok(())
    }

    /// `HV_OK_TRUE` when equal, `HV_OK` otherwise
    pub fn compare(&self, other: &Value) -> ValueResult {
        if self == other {
            ValueResult::OkTrue
        } else {
            ValueResult::Ok
        }
    }

    // ========================================================================
    // Invocation
    // ========================================================================

    /// Call a function value with `this` bound to `this`.
    ///
    /// Arguments are copied into a fresh vector that is dropped after the
    /// call. Native functors run in-process; script functions go through the
    /// installed engine.
    pub fn invoke(&self, this: &Value, name_or_url: &str, args: &[Value]) -> Result<Value> {
        let argv = args.to_vec();
        let mut retval = Value::new();
        match &self.data {
            Data::Functor(f) => {
                if !functor::invoke(f.tag(), &argv, &mut retval) {
                    return Err(Error::Value {
                        result: ValueResult::BadParameter,
                        op: "ValueInvoke",
                    });
                }
            }
            Data::Scalar(_) if self.is_function() => {
                api::api()?
                    .value_invoke(self, this, &argv, &mut retval, name_or_url)
                    .check("ValueInvoke")?;
            }
            _ => {
                return Err(Error::Value {
                    result: ValueResult::IncompatibleType,
                    op: "ValueInvoke",
                });
            }
        }
        Ok(retval)
    }

    fn functor_tag(&self) -> Option<usize> {
        match &self.data {
            Data::Functor(f) => Some(f.tag()),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        if self.t != other.t || self.u != other.u {
            return false;
        }
        match (&self.data, &other.data) {
            (Data::Scalar(a), Data::Scalar(b)) if self.t.is_float_kind() => {
                f64::from_bits(*a) == f64::from_bits(*b)
            }
            (Data::Scalar(a), Data::Scalar(b)) => a == b,
            (Data::Text(a), Data::Text(b)) => a == b,
            (Data::Bytes(a), Data::Bytes(b)) => a == b,
            (Data::Array(a), Data::Array(b)) => a == b,
            // Pair order does not take part in map equality
            (Data::Map(a), Data::Map(b)) => {
                a.len() == b.len()
                    && a.iter().all(|(k, v)| b.iter().any(|(k2, v2)| k == k2 && v == v2))
            }
            (Data::Functor(_), Data::Functor(_)) => self.functor_tag() == other.functor_tag(),
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = self.to_literal(ConvertMode::Simple).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::scalar(ValueType::Bool, 0, v as u64)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::scalar(ValueType::Int, 0, v as i64 as u64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::big_int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::scalar(ValueType::Float, 0, v.to_bits())
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::from(f64::from(v))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self { t: ValueType::String, u: unit::STRING, data: Data::Text(s.to_string()) }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self { t: ValueType::String, u: unit::STRING, data: Data::Text(s) }
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::bytes(b)
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self { t: ValueType::Bytes, u: 0, data: Data::Bytes(b) }
    }
}

impl From<ElementHandle> for Value {
    fn from(he: ElementHandle) -> Self {
        Self::element(he)
    }
}

impl FromIterator<Value> for Value {
    fn from_iter<I: IntoIterator<Item = Value>>(iter: I) -> Self {
        Self { t: ValueType::Array, u: 0, data: Data::Array(iter.into_iter().collect()) }
    }
}

impl FromIterator<(Value, Value)> for Value {
    fn from_iter<I: IntoIterator<Item = (Value, Value)>>(iter: I) -> Self {
        let mut map = Value::map();
        for (k, v) in iter {
            map.set(k, v);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_undefined() {
        let v = Value::new();
        assert!(v.is_undefined());
        assert!(!v.is_nothing());
        assert!(Value::nothing().is_nothing());
        assert_eq!(v.value_type() as u32, 0);
    }

    #[test]
    fn test_bool_shares_int_payload() {
        let t = Value::from(true);
        assert!(t.is_bool());
        assert!(!t.is_int());
        assert_eq!(t.as_int(), Some(1));
        assert_eq!(Value::from(0).as_bool(), Some(false));
        assert_ne!(Value::from(true), Value::from(1));
    }

    #[test]
    fn test_strict_and_lossy_accessors() {
        let s = Value::from("hello");
        assert_eq!(s.as_int(), None);
        assert_eq!(s.to_int(), 0);
        assert_eq!(s.to_float(), 0.0);
        assert_eq!(s.as_str(), Some("hello"));

        let i = Value::from(-7);
        assert_eq!(i.to_str(), "");
        assert!(i.to_bytes().is_empty());
        assert_eq!(i.as_int64(), Some(-7));
    }

    #[test]
    fn test_wide_integers() {
        let big = Value::from(1i64 << 40);
        assert!(big.is_big_int());
        assert_eq!(big.as_int64(), Some(1 << 40));
        assert_eq!(big.as_int(), None);
    }

    #[test]
    fn test_string_units() {
        assert!(Value::symbol("done").is_symbol());
        assert!(Value::error_string("boom").is_error_string());
        assert!(!Value::from("plain").is_symbol());
        assert_ne!(Value::symbol("x"), Value::from("x"));
    }

    #[test]
    fn test_scalar_kinds() {
        assert_eq!(Value::color(0xFF00_00FF).as_color(), Some(0xFF00_00FF));
        assert_eq!(Value::currency(12_500).as_currency(), Some(12_500));
        assert_eq!(Value::duration(1.5).as_float(), Some(1.5));
        assert!(Value::angle(1.25).is_angle());

        let d = Value::date(132_000_000_000_000_000, unit::DT_HAS_DATE | unit::DT_UTC);
        assert_eq!(d.as_date(), Some(132_000_000_000_000_000));
        assert_eq!(d.unit() & unit::DT_UTC, unit::DT_UTC);

        let e = Value::element(ElementHandle(0x42));
        assert_eq!(e.as_element(), Some(ElementHandle(0x42)));
    }

    #[test]
    fn test_set_item_coerces_to_array() {
        let mut v = Value::from("was a string");
        v.set_item(2, Value::from(5)).unwrap();
        assert!(v.is_array());
        assert_eq!(v.len(), 3);
        assert!(v.get_item(0).unwrap().is_undefined());
        assert_eq!(v.get_item(2), Some(&Value::from(5)));
        assert_eq!(v.as_str(), None);
    }

    #[test]
    fn test_set_item_index_out_of_range() {
        let mut v = Value::array();
        for index in [usize::MAX, MAX_ARRAY_LEN] {
            let err = v.set_item(index, Value::from(1)).unwrap_err();
            assert!(matches!(err, Error::Value { result: ValueResult::BadParameter, .. }));
        }
        assert!(v.is_empty());

        // A rejected index leaves a scalar untouched
        let mut s = Value::from("kept");
        assert!(s.set_item(usize::MAX, Value::new()).is_err());
        assert_eq!(s.as_str(), Some("kept"));
    }

    #[test]
    fn test_set_item_on_map_replaces_nth_value() {
        let mut m = Value::map();
        m.set("a", Value::from(1));
        m.set_item(0, Value::from(9)).unwrap();
        assert_eq!(m.get("a"), Some(&Value::from(9)));

        let err = m.set_item(5, Value::from(0)).unwrap_err();
        assert!(matches!(err, Error::Value { result: ValueResult::BadParameter, .. }));
    }

    #[test]
    fn test_set_coerces_to_map_and_keeps_position() {
        let mut v = Value::from(3);
        v.set("b", Value::from(1));
        v.set("a", Value::from(2));
        v.set("b", Value::from(3));
        assert!(v.is_map());
        assert_eq!(v.len(), 2);
        assert_eq!(v.nth_key(0), Some(&Value::from("b")));
        assert_eq!(v.get("b"), Some(&Value::from(3)));
        assert_eq!(v.get("missing"), None);
    }

    #[test]
    fn test_enumerate_array_keys_are_indices() {
        let v: Value = vec![Value::from("x"), Value::from("y")].into_iter().collect();
        let mut keys = Vec::new();
        v.enumerate(|k, _| {
            keys.push(k.to_int());
            true
        })
        .unwrap();
        assert_eq!(keys, vec![0, 1]);
    }

    #[test]
    fn test_enumerate_scalar_fails() {
        let err = Value::from(1).enumerate(|_, _| true).unwrap_err();
        assert!(matches!(err, Error::Value { result: ValueResult::IncompatibleType, .. }));
    }

    #[test]
    fn test_map_equality_ignores_order() {
        let mut a = Value::map();
        a.set("x", Value::from(1));
        a.set("y", Value::from(2));
        let mut b = Value::map();
        b.set("y", Value::from(2));
        b.set("x", Value::from(1));
        assert_eq!(a, b);
        assert_eq!(a.compare(&b), ValueResult::OkTrue);

        b.set("x", Value::from(5));
        assert_eq!(a.compare(&b), ValueResult::Ok);
    }

    #[test]
    fn test_clear_twice() {
        let mut v = Value::from("text");
        v.clear();
        v.clear();
        assert!(v.is_undefined());
    }

    #[test]
    fn test_functor_value_invoke() {
        let f = Value::functor(|args| Value::from(args.iter().map(Value::to_int).sum::<i32>()));
        assert!(f.is_function());
        assert!(f.is_native_functor());

        let r = f.invoke(&Value::new(), "sum", &[Value::from(2), Value::from(3)]).unwrap();
        assert_eq!(r, Value::from(5));
    }

    #[test]
    fn test_functor_released_with_last_copy() {
        let f = Value::functor(|_| Value::null());
        let tag = f.functor_tag().unwrap();
        let copy = f.clone();
        drop(f);
        assert!(functor::contains(tag));
        drop(copy);
        assert!(!functor::contains(tag));
    }

    #[test]
    fn test_overwriting_functor_releases_it() {
        let mut v = Value::functor(|_| Value::new());
        let tag = v.functor_tag().unwrap();
        v.set_int(1);
        assert!(!functor::contains(tag));
    }

    #[test]
    fn test_invoke_non_function() {
        let err = Value::from(1).invoke(&Value::new(), "", &[]).unwrap_err();
        assert!(matches!(err, Error::Value { result: ValueResult::IncompatibleType, .. }));
    }

    #[test]
    fn test_display_simple() {
        assert_eq!(Value::from("plain").to_string(), "plain");
        assert_eq!(Value::from(42).to_string(), "42");
        assert_eq!(Value::functor(|_| Value::new()).to_string(), "<functor>");
    }
}
