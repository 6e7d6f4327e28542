//! Rows and values produced by destination cursors
//!
//! A [`Row`] is an ordered mapping from column name to [`Value`]. Order is
//! the order the destination produced the columns in, and every export
//! format preserves it.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Number};

use crate::error::EncodeError;

/// A destination-native value
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Timestamp(DateTime<Utc>),
}

/// Descriptor of one result column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Column {
    pub name: String,
}

/// One result row: column names mapped to values, in column order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row {
    fields: Vec<(String, Value)>,
}

impl Value {
    /// Canonical text form used by CSV output
    ///
    /// Nulls render as the literal `null`, bytes as standard base64 and
    /// timestamps as RFC 3339 in UTC.
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::String(s) => s.clone(),
            Value::Bytes(b) => STANDARD.encode(b),
            Value::Timestamp(ts) => ts.to_rfc3339_opts(SecondsFormat::AutoSi, true),
        }
    }

    /// Generic JSON representation
    ///
    /// # Returns
    /// * `Err(reason)` - For floats that JSON cannot carry (NaN, infinities)
    pub fn to_json(&self) -> std::result::Result<serde_json::Value, String> {
        Ok(match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => match Number::from_f64(*f) {
                Some(n) => serde_json::Value::Number(n),
                None => return Err(format!("float {f} has no JSON representation")),
            },
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Bytes(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
        })
    }

    /// Convert a decoded JSON value into a destination value.
    ///
    /// Integers that fit in `i64` stay integers; arrays and objects are kept
    /// as their compact JSON text.
    ///
    /// # Returns
    /// * `Err(reason)` - For integers outside the `i64` range
    pub fn from_json(value: serde_json::Value) -> std::result::Result<Self, String> {
        Ok(match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else if n.is_f64() {
                    match n.as_f64() {
                        Some(f) => Value::Float(f),
                        None => return Err(format!("number {n} is not representable")),
                    }
                } else {
                    return Err(format!("integer {n} does not fit in 64-bit signed range"));
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            nested @ (serde_json::Value::Array(_) | serde_json::Value::Object(_)) => {
                Value::String(nested.to_string())
            }
        })
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, value);
        self
    }

    /// Set a column's value, keeping its original position if it exists
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        let name = name.into();
        let value = value.into();
        match self.fields.iter_mut().find(|(existing, _)| *existing == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value)
    }

    /// Column names in row order
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Encode the row as a JSON object keyed by column name, in row order
    ///
    /// # Returns
    /// * `Err(EncodeError::NotRepresentable)` - Naming the first column whose
    ///   value JSON cannot carry
    pub fn to_json_object(&self) -> std::result::Result<Map<String, serde_json::Value>, EncodeError> {
        let mut object = Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            let json = value
                .to_json()
                .map_err(|reason| EncodeError::NotRepresentable {
                    column: name.clone(),
                    reason,
                })?;
            object.insert(name.clone(), json);
        }
        Ok(object)
    }

    /// Build a row from a decoded JSON object, keeping key order
    ///
    /// # Returns
    /// * `Err(reason)` - Naming the first column that has no destination value
    pub fn from_json_object(
        object: Map<String, serde_json::Value>,
    ) -> std::result::Result<Self, String> {
        let mut row = Row::new();
        for (name, value) in object {
            let value =
                Value::from_json(value).map_err(|reason| format!("column '{name}': {reason}"))?;
            row.insert(name, value);
        }
        Ok(row)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (name, value) in iter {
            row.insert(name, value);
        }
        row
    }
}
