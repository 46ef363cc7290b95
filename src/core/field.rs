//! Field value types shared by filters, rows and rendered attributes

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use uuid::Uuid;

/// Declared column type of an entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Uuid,
    DateTime,
}

impl FieldType {
    pub fn name(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Integer => "integer",
            FieldType::Float => "float",
            FieldType::Boolean => "boolean",
            FieldType::Uuid => "uuid",
            FieldType::DateTime => "datetime",
        }
    }
}

/// A polymorphic field value that can hold different types
///
/// Used both as filter operands (parsed from the caller's query) and as
/// column values of rows returned by a store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum FieldValue {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Uuid(Uuid),
    DateTime(DateTime<Utc>),
    Null,
}

impl FieldValue {
    /// Get the value as a string if possible
    pub fn as_string(&self) -> Option<&str> {
        match self {
            FieldValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the value as an integer if possible
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            FieldValue::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get the value as a UUID if possible
    pub fn as_uuid(&self) -> Option<Uuid> {
        match self {
            FieldValue::Uuid(u) => Some(*u),
            FieldValue::String(s) => Uuid::parse_str(s).ok(),
            _ => None,
        }
    }

    /// Check if the value is null
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// Convert a scalar JSON value. Arrays and objects are not field values.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(FieldValue::Null),
            Value::Bool(b) => Some(FieldValue::Boolean(*b)),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Some(FieldValue::Integer(i)),
                None => n.as_f64().map(FieldValue::Float),
            },
            Value::String(s) => Some(FieldValue::String(s.clone())),
            Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Convert back into a JSON value
    pub fn to_json(&self) -> Value {
        match self {
            FieldValue::String(s) => Value::String(s.clone()),
            FieldValue::Integer(i) => Value::from(*i),
            FieldValue::Float(f) => Value::from(*f),
            FieldValue::Boolean(b) => Value::Bool(*b),
            FieldValue::Uuid(u) => Value::String(u.to_string()),
            FieldValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
            FieldValue::Null => Value::Null,
        }
    }

    /// Canonical string form, used for resource identifiers and dedup keys
    pub fn as_key(&self) -> String {
        match self {
            FieldValue::String(s) => s.clone(),
            FieldValue::Integer(i) => i.to_string(),
            FieldValue::Float(f) => f.to_string(),
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Uuid(u) => u.to_string(),
            FieldValue::DateTime(dt) => dt.to_rfc3339(),
            FieldValue::Null => String::new(),
        }
    }

    /// Compare two values, coercing across compatible representations.
    ///
    /// Numbers compare numerically (numeric strings included, since
    /// identifiers often arrive as text). UUIDs and datetimes compare against
    /// their string forms. `None` means the values are not comparable.
    pub fn compare(&self, other: &FieldValue) -> Option<Ordering> {
        use FieldValue::*;
        match (self, other) {
            (Null, Null) => Some(Ordering::Equal),
            (Null, _) | (_, Null) => None,
            (String(a), String(b)) => Some(a.cmp(b)),
            (Integer(a), Integer(b)) => Some(a.cmp(b)),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Float(a), Float(b)) => a.partial_cmp(b),
            (String(a), Integer(b)) => a.trim().parse::<i64>().ok().map(|a| a.cmp(b)),
            (Integer(a), String(b)) => b.trim().parse::<i64>().ok().map(|b| a.cmp(&b)),
            (Boolean(a), Boolean(b)) => Some(a.cmp(b)),
            (Uuid(a), Uuid(b)) => Some(a.cmp(b)),
            (Uuid(a), String(b)) => Some(a.to_string().cmp(&b.to_lowercase())),
            (String(a), Uuid(b)) => Some(a.to_lowercase().cmp(&b.to_string())),
            (DateTime(a), DateTime(b)) => Some(a.cmp(b)),
            (DateTime(a), String(b)) => parse_datetime(b).map(|b| a.cmp(&b)),
            (String(a), DateTime(b)) => parse_datetime(a).map(|a| a.cmp(b)),
            _ => None,
        }
    }

    /// Convert to the representation of a declared column type
    ///
    /// NULL converts to every type. `None` when the value cannot stand for
    /// the type, e.g. `"abc"` as an integer.
    pub fn coerce_to(&self, ty: FieldType) -> Option<FieldValue> {
        if self.is_null() {
            return Some(FieldValue::Null);
        }
        match ty {
            FieldType::String => Some(FieldValue::String(self.as_key())),
            FieldType::Integer => match self {
                FieldValue::Integer(i) => Some(FieldValue::Integer(*i)),
                FieldValue::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => {
                    Some(FieldValue::Integer(*f as i64))
                }
                FieldValue::String(s) => s.trim().parse().ok().map(FieldValue::Integer),
                _ => None,
            },
            FieldType::Float => match self {
                FieldValue::Float(f) => Some(FieldValue::Float(*f)),
                FieldValue::Integer(i) => Some(FieldValue::Float(*i as f64)),
                FieldValue::String(s) => s.trim().parse().ok().map(FieldValue::Float),
                _ => None,
            },
            FieldType::Boolean => match self {
                FieldValue::Boolean(b) => Some(FieldValue::Boolean(*b)),
                FieldValue::String(s) => s.trim().parse().ok().map(FieldValue::Boolean),
                _ => None,
            },
            FieldType::Uuid => self.as_uuid().map(FieldValue::Uuid),
            FieldType::DateTime => match self {
                FieldValue::DateTime(dt) => Some(FieldValue::DateTime(*dt)),
                FieldValue::String(s) => parse_datetime(s).map(FieldValue::DateTime),
                _ => None,
            },
        }
    }

    /// Equality under the same coercion rules as [`FieldValue::compare`]
    pub fn loosely_equals(&self, other: &FieldValue) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    /// Case-insensitive substring match for string values
    pub fn contains_text(&self, needle: &str) -> bool {
        match self {
            FieldValue::String(s) => s.to_lowercase().contains(&needle.to_lowercase()),
            _ => false,
        }
    }
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::String(s.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(s: String) -> Self {
        FieldValue::String(s)
    }
}

impl From<i64> for FieldValue {
    fn from(i: i64) -> Self {
        FieldValue::Integer(i)
    }
}

impl From<i32> for FieldValue {
    fn from(i: i32) -> Self {
        FieldValue::Integer(i64::from(i))
    }
}

impl From<bool> for FieldValue {
    fn from(b: bool) -> Self {
        FieldValue::Boolean(b)
    }
}

impl From<Uuid> for FieldValue {
    fn from(u: Uuid) -> Self {
        FieldValue::Uuid(u)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(dt: DateTime<Utc>) -> Self {
        FieldValue::DateTime(dt)
    }
}
