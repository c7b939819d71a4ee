//! Typed attribute values

use flatmap::FlatMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A value tree matching some [`FieldType`](crate::FieldType)
///
/// Sets hold their elements in a `Vec` but compare as sets: two sets are
/// equal when they contain the same elements in any order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// No value; also what reads of undeclared paths return
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    /// A map, or the value of an object block
    Map(BTreeMap<String, Value>),
    Set(Vec<Value>),
}

impl Value {
    /// Build a map value from key/value pairs
    pub fn map<K, V, I>(entries: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn list<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        Self::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats, or ints widened to floats
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Elements of a list or set
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) | Self::Set(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Map(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
            Self::Set(_) => "set",
        }
    }

    /// Whether this is the zero value of its own kind
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::String(s) => s.is_empty(),
            Self::List(items) | Self::Set(items) => items.is_empty(),
            Self::Map(entries) => entries.is_empty(),
        }
    }

    /// String form of a scalar as stored in flattened state
    pub(crate) fn scalar_string(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(f.to_string()),
            Self::String(s) => Some(s.clone()),
            _ => None,
        }
    }

    /// Canonical text used to derive set element keys.
    ///
    /// Scalars use their stored string form. Composites are flattened
    /// without a schema and rendered as sorted `key=value` lines.
    pub fn canonical(&self) -> String {
        if let Some(s) = self.scalar_string() {
            return s;
        }
        let mut flat = FlatMap::new();
        self.flatten_untyped("", &mut flat);
        flat.iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Storage key of this value as a set element
    pub fn set_key(&self) -> String {
        flatmap::set_key(&self.canonical())
    }

    fn flatten_untyped(&self, prefix: &str, out: &mut FlatMap) {
        match self {
            Self::Null => {}
            Self::List(items) => {
                out.insert(flatmap::count_path(prefix), items.len().to_string());
                for (i, item) in items.iter().enumerate() {
                    item.flatten_untyped(&flatmap::join(prefix, &i.to_string()), out);
                }
            }
            Self::Set(items) => {
                out.insert(flatmap::count_path(prefix), items.len().to_string());
                for item in items {
                    item.flatten_untyped(&flatmap::join(prefix, &item.set_key()), out);
                }
            }
            Self::Map(entries) => {
                out.insert(flatmap::count_path(prefix), entries.len().to_string());
                for (k, v) in entries {
                    v.flatten_untyped(&flatmap::join(prefix, k), out);
                }
            }
            scalar => {
                if let Some(s) = scalar.scalar_string() {
                    out.insert(prefix, s);
                }
            }
        }
    }

    fn sorted_set_keys(items: &[Value]) -> Vec<String> {
        let mut keys: Vec<String> = items.iter().map(Value::set_key).collect();
        keys.sort();
        keys.dedup();
        keys
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::List(a), Self::List(b)) => a == b,
            (Self::Map(a), Self::Map(b)) => a == b,
            (Self::Set(a), Self::Set(b)) => Self::sorted_set_keys(a) == Self::sorted_set_keys(b),
            _ => false,
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Int(i64::from(i))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(entries: BTreeMap<String, Value>) -> Self {
        Self::Map(entries)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}
