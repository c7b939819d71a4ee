use crate::codec;
use crate::error::Result;
use crate::value::Value;
use flatmap::COUNT_KEY;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// Field Types
// ============================================================================

/// The shape of a field's value
///
/// In TOML, scalar types are plain strings and composites are one-key tables:
///
/// ```toml
/// [name]
/// type = "string"
/// required = true
///
/// [ports]
/// type = { list = "int" }
/// optional = true
///
/// [rule]
/// type = { set = { object = { port = { type = "int", required = true } } } }
/// optional = true
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    /// Ordered elements, keyed by index
    List(Box<FieldType>),
    /// Unordered unique elements, keyed by content hash
    Set(Box<FieldType>),
    /// String-keyed elements
    Map(Box<FieldType>),
    /// A nested block of named fields
    Object(SchemaMap),
}

/// Type of a `<collection>.#` address
static COUNT_TYPE: FieldType = FieldType::Int;

impl FieldType {
    pub fn list(elem: FieldType) -> Self {
        Self::List(Box::new(elem))
    }

    pub fn set(elem: FieldType) -> Self {
        Self::Set(Box::new(elem))
    }

    pub fn map(elem: FieldType) -> Self {
        Self::Map(Box::new(elem))
    }

    pub fn is_primitive(&self) -> bool {
        matches!(self, Self::Bool | Self::Int | Self::Float | Self::String)
    }

    /// Whether elements are stored under a `#` count marker
    pub fn is_collection(&self) -> bool {
        self.element().is_some()
    }

    /// Element type of a list, set or map
    pub fn element(&self) -> Option<&FieldType> {
        match self {
            Self::List(elem) | Self::Set(elem) | Self::Map(elem) => Some(elem),
            _ => None,
        }
    }

    /// Short type name used in error messages
    pub fn name(&self) -> String {
        match self {
            Self::Bool => "bool".to_string(),
            Self::Int => "int".to_string(),
            Self::Float => "float".to_string(),
            Self::String => "string".to_string(),
            Self::List(elem) => format!("list of {}", elem.name()),
            Self::Set(elem) => format!("set of {}", elem.name()),
            Self::Map(elem) => format!("map of {}", elem.name()),
            Self::Object(_) => "object".to_string(),
        }
    }

    /// The value reads fall back to when nothing is stored
    pub fn zero(&self) -> Value {
        match self {
            Self::Bool => Value::Bool(false),
            Self::Int => Value::Int(0),
            Self::Float => Value::Float(0.0),
            Self::String => Value::String(String::new()),
            Self::List(_) => Value::List(Vec::new()),
            Self::Set(_) => Value::Set(Vec::new()),
            Self::Map(_) | Self::Object(_) => Value::Map(BTreeMap::new()),
        }
    }
}

// ============================================================================
// Field Schema
// ============================================================================

/// Descriptor of a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(rename = "type")]
    pub kind: FieldType,

    #[serde(default)]
    pub optional: bool,

    #[serde(default)]
    pub required: bool,

    /// The provider may fill this in; its value can be unknown at plan time
    #[serde(default)]
    pub computed: bool,

    /// Changing this field means destroying and recreating the instance
    #[serde(default)]
    pub force_new: bool,

    /// Value reads fall back to before the type's zero value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl Schema {
    fn with_flags(kind: FieldType, optional: bool, required: bool, computed: bool) -> Self {
        Self {
            kind,
            optional,
            required,
            computed,
            force_new: false,
            default: None,
        }
    }

    pub fn optional(kind: FieldType) -> Self {
        Self::with_flags(kind, true, false, false)
    }

    pub fn required(kind: FieldType) -> Self {
        Self::with_flags(kind, false, true, false)
    }

    /// A field only the provider sets
    pub fn computed(kind: FieldType) -> Self {
        Self::with_flags(kind, false, false, true)
    }

    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    pub fn with_computed(mut self) -> Self {
        self.computed = true;
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn is_computed_only(&self) -> bool {
        self.computed && !self.optional && !self.required
    }

    /// Whether a change to this field can be applied without recreation
    pub fn is_updatable(&self) -> bool {
        !self.force_new && !self.is_computed_only()
    }

    fn problems(&self, path: &str, out: &mut Vec<String>) {
        if self.optional && self.required {
            out.push(format!("{path}: optional and required are mutually exclusive"));
        }
        if !self.optional && !self.required && !self.computed {
            out.push(format!("{path}: one of optional, required or computed must be set"));
        }
        if self.computed && self.required {
            out.push(format!("{path}: computed and required are mutually exclusive"));
        }
        if let Some(default) = &self.default {
            if self.required {
                out.push(format!("{path}: default cannot be set with required"));
            }
            if let Err(e) = codec::coerce(&self.kind, default, path) {
                out.push(format!("{path}: invalid default: {e}"));
            }
        }

        let mut kind = &self.kind;
        while let Some(elem) = kind.element() {
            kind = elem;
        }
        if let FieldType::Object(fields) = kind {
            fields.collect_problems(path, out);
        }
    }
}

// ============================================================================
// Schema Map
// ============================================================================

/// Field name to field schema, sorted by name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchemaMap(BTreeMap<String, Schema>);

impl SchemaMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, schema: Schema) -> Self {
        self.0.insert(name.into(), schema);
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, schema: Schema) -> Option<Schema> {
        self.0.insert(name.into(), schema)
    }

    pub fn get(&self, name: &str) -> Option<&Schema> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Schema)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Parse a schema from TOML text, one table per field
    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load a schema from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let schema = Self::from_toml_str(&content)?;
        log::debug!("Loaded {} field(s) from {}", schema.len(), path.display());
        Ok(schema)
    }

    /// Resolve a dotted address to the type stored there.
    ///
    /// `ports.0` resolves to the list element type, `rule.<key>.port` walks
    /// through a set of objects, and `ports.#` resolves to the count.
    pub fn field_type(&self, address: &str) -> Option<&FieldType> {
        let mut parts = address.split(flatmap::SEPARATOR);
        let mut kind = &self.get(parts.next()?)?.kind;
        for part in parts {
            kind = match kind {
                FieldType::Object(fields) => &fields.get(part)?.kind,
                _ if part == COUNT_KEY && kind.is_collection() => &COUNT_TYPE,
                _ => kind.element()?,
            };
        }
        Some(kind)
    }

    /// Static problems with field definitions, including nested blocks
    pub fn problems(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.collect_problems("", &mut out);
        out
    }

    fn collect_problems(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, schema) in &self.0 {
            schema.problems(&flatmap::join(prefix, name), out);
        }
    }
}

impl FromIterator<(String, Schema)> for SchemaMap {
    fn from_iter<I: IntoIterator<Item = (String, Schema)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a SchemaMap {
    type Item = (&'a String, &'a Schema);
    type IntoIter = std::collections::btree_map::Iter<'a, String, Schema>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
