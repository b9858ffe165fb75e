//! Typed field values as delivered by the remote protocol
//!
//! Serialized in camelCase so the JSON form reads `{"integerValue":3}`.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::version::Timestamp;

/// A single field value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    NullValue,
    BooleanValue(bool),
    IntegerValue(i64),
    DoubleValue(f64),
    TimestampValue(Timestamp),
    StringValue(String),
    BytesValue(Vec<u8>),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ArrayValue {
    pub values: Vec<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MapValue {
    pub fields: BTreeMap<String, Value>,
}

impl Value {
    /// Convert plain JSON; integral numbers become `integerValue`
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::NullValue,
            serde_json::Value::Bool(b) => Value::BooleanValue(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::IntegerValue(i),
                None => Value::DoubleValue(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::StringValue(s),
            serde_json::Value::Array(items) => Value::ArrayValue(ArrayValue {
                values: items.into_iter().map(Value::from_json).collect(),
            }),
            serde_json::Value::Object(map) => Value::MapValue(MapValue {
                fields: map
                    .into_iter()
                    .map(|(k, v)| (k, Value::from_json(v)))
                    .collect(),
            }),
        }
    }

    /// Convert to plain JSON (lossy for bytes, timestamps and geo points)
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::NullValue => serde_json::Value::Null,
            Value::BooleanValue(b) => serde_json::Value::Bool(*b),
            Value::IntegerValue(i) => serde_json::Value::from(*i),
            Value::DoubleValue(d) => serde_json::Number::from_f64(*d)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::TimestampValue(ts) => serde_json::Value::String(ts.to_string()),
            Value::StringValue(s) | Value::ReferenceValue(s) => {
                serde_json::Value::String(s.clone())
            }
            Value::BytesValue(bytes) => serde_json::Value::Array(
                bytes.iter().map(|b| serde_json::Value::from(*b)).collect(),
            ),
            Value::GeoPointValue(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Value::ArrayValue(array) => {
                serde_json::Value::Array(array.values.iter().map(Value::to_json).collect())
            }
            Value::MapValue(map) => serde_json::Value::Object(
                map.fields
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Equality with integer/double cross-comparison
    pub fn equals(&self, other: &Value) -> bool {
        match (self.as_number(), other.as_number()) {
            (Some(a), Some(b)) => a == b,
            _ => self == other,
        }
    }

    /// Ordering between values of the same kind; `None` across kinds
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        if let (Some(a), Some(b)) = (self.as_number(), other.as_number()) {
            return a.partial_cmp(&b);
        }
        match (self, other) {
            (Value::NullValue, Value::NullValue) => Some(Ordering::Equal),
            (Value::BooleanValue(a), Value::BooleanValue(b)) => Some(a.cmp(b)),
            (Value::TimestampValue(a), Value::TimestampValue(b)) => Some(a.cmp(b)),
            (Value::StringValue(a), Value::StringValue(b)) => Some(a.cmp(b)),
            (Value::BytesValue(a), Value::BytesValue(b)) => Some(a.cmp(b)),
            (Value::ReferenceValue(a), Value::ReferenceValue(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_number(&self) -> Option<f64> {
        match self {
            Value::IntegerValue(i) => Some(*i as f64),
            Value::DoubleValue(d) => Some(*d),
            _ => None,
        }
    }
}
