//! Bindable values and the ordered parameter list.

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};
use std::fmt;

const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A scalar that can be bound to a `?` placeholder or read back from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    DateTime(NaiveDateTime),
    /// A JSON document; bound as its string form.
    Json(serde_json::Value),
}

/// Wire type tag of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    /// `s`: strings, NULL, dates, JSON
    String,
    /// `i`: integers and booleans
    Integer,
    /// `b`: binary blobs
    Blob,
    /// `d`: floating point
    Double,
}

impl ParamType {
    pub fn as_char(self) -> char {
        match self {
            ParamType::String => 's',
            ParamType::Integer => 'i',
            ParamType::Blob => 'b',
            ParamType::Double => 'd',
        }
    }
}

impl Value {
    /// The type tag this value is bound with.
    pub fn param_type(&self) -> ParamType {
        match self {
            Value::Null | Value::Text(_) | Value::DateTime(_) | Value::Json(_) => ParamType::String,
            Value::Bool(_) | Value::Int(_) | Value::UInt(_) => ParamType::Integer,
            Value::Float(_) => ParamType::Double,
            Value::Bytes(_) => ParamType::Blob,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::UInt(v) => i64::try_from(*v).ok(),
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::UInt(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            Value::Bool(v) => Some(u64::from(*v)),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            Value::Int(v) => Some(*v as f64),
            Value::UInt(v) => Some(*v as f64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Textual form used for map keys and for the interpolated last query.
/// `NULL` renders as an empty string.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{}", u8::from(*v)),
            Value::Int(v) => write!(f, "{v}"),
            Value::UInt(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => f.write_str(&String::from_utf8_lossy(b)),
            Value::DateTime(dt) => write!(f, "{}", dt.format(DATETIME_FORMAT)),
            Value::Json(j) => write!(f, "{j}"),
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Int(v) => serializer.serialize_i64(*v),
            Value::UInt(v) => serializer.serialize_u64(*v),
            Value::Float(v) => serializer.serialize_f64(*v),
            Value::Text(s) => serializer.serialize_str(s),
            Value::Bytes(b) => serializer.serialize_str(&String::from_utf8_lossy(b)),
            Value::DateTime(dt) => serializer.collect_str(&dt.format(DATETIME_FORMAT)),
            Value::Json(j) => j.serialize(serializer),
        }
    }
}

macro_rules! impl_from_int {
    ($($t:ty),* $(,)?) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt(v)
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::UInt(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<&[u8]> for Value {
    fn from(v: &[u8]) -> Self {
        Value::Bytes(v.to_vec())
    }
}

impl From<NaiveDateTime> for Value {
    fn from(v: NaiveDateTime) -> Self {
        Value::DateTime(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Implements `From<scalar>` for a type that wraps a [`Value`].
macro_rules! forward_value_from {
    ($target:ty, $variant:path) => {
        $crate::value::forward_value_from!(@impl $target, $variant;
            i8, i16, i32, i64, u8, u16, u32, u64, usize, f32, f64, bool,
            String, &str, &String, Vec<u8>, &[u8],
            chrono::NaiveDateTime, serde_json::Value, $crate::Value);
        impl<T: Into<$crate::Value>> From<Option<T>> for $target {
            fn from(v: Option<T>) -> Self {
                $variant($crate::Value::from(v))
            }
        }
    };
    (@impl $target:ty, $variant:path; $($t:ty),*) => {
        $(impl From<$t> for $target {
            fn from(v: $t) -> Self {
                $variant($crate::Value::from(v))
            }
        })*
    };
}

pub(crate) use forward_value_from;

/// Ordered parameters bound to the `?` placeholders of one statement.
///
/// The type signature (one char per parameter, see [`ParamType`]) is kept in
/// lockstep with the values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Params {
    types: String,
    values: Vec<Value>,
}

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one more value.
    pub fn push(&mut self, value: impl Into<Value>) -> &mut Self {
        let value = value.into();
        self.types.push(value.param_type().as_char());
        self.values.push(value);
        self
    }

    /// Append all parameters of `other`, preserving order.
    pub fn extend(&mut self, other: &Params) -> &mut Self {
        self.types.push_str(&other.types);
        self.values.extend(other.values.iter().cloned());
        self
    }

    /// Type signature, e.g. `"sid"`.
    pub fn types(&self) -> &str {
        &self.types
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Value> {
        self.values.iter()
    }
}

impl<T: Into<Value>> FromIterator<T> for Params {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut params = Params::new();
        for v in iter {
            params.push(v);
        }
        params
    }
}

impl<T: Into<Value>> From<Vec<T>> for Params {
    fn from(values: Vec<T>) -> Self {
        values.into_iter().collect()
    }
}

impl<T: Into<Value>, const N: usize> From<[T; N]> for Params {
    fn from(values: [T; N]) -> Self {
        values.into_iter().collect()
    }
}

impl From<()> for Params {
    fn from(_: ()) -> Self {
        Params::new()
    }
}

impl<'a> IntoIterator for &'a Params {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_tags_follow_value_kind() {
        let params: Params = vec![
            Value::from("a"),
            Value::from(1_i32),
            Value::from(true),
            Value::from(1.5_f64),
            Value::from(vec![0_u8, 1]),
            Value::Null,
        ]
        .into();
        assert_eq!(params.types(), "siidbs");
        assert_eq!(params.len(), 6);
    }

    #[test]
    fn option_maps_to_null() {
        assert_eq!(Value::from(None::<i32>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn extend_keeps_types_in_lockstep() {
        let mut a: Params = [1_i64].into();
        let b: Params = ["x", "y"].into();
        a.extend(&b);
        assert_eq!(a.types(), "iss");
        assert_eq!(a.values()[2], Value::from("y"));
    }

    #[test]
    fn display_is_plain_text() {
        assert_eq!(Value::Null.to_string(), "");
        assert_eq!(Value::Bool(true).to_string(), "1");
        assert_eq!(Value::from("abc").to_string(), "abc");
    }

    #[test]
    fn serializes_to_json_scalars() {
        let json = serde_json::to_value(vec![Value::Null, Value::Int(3), Value::from("s")]).unwrap();
        assert_eq!(json, serde_json::json!([null, 3, "s"]));
    }
}
