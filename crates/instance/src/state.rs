//! Persisted state of a single resource instance

use crate::error::{Error, Result};
use flatmap::FlatMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metadata key holding the schema version the attributes were written with
pub const SCHEMA_VERSION_KEY: &str = "schema_version";

/// Attribute holding the instance identifier in flattened state
pub const ID_ATTRIBUTE: &str = "id";

/// The authoritative snapshot of one real-world resource instance
///
/// An empty `id` means the instance does not exist.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceState {
    #[serde(default)]
    pub id: String,

    /// Flattened attribute values
    #[serde(default)]
    pub attributes: FlatMap,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl InstanceState {
    /// Create a state for an instance with the given id and no attributes
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key, value);
        self
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Whether this state describes an existing instance
    pub fn exists(&self) -> bool {
        !self.id.is_empty()
    }

    /// Schema version the attributes were encoded against (absent means 0)
    pub fn schema_version(&self) -> Result<u64> {
        match self.meta.get(SCHEMA_VERSION_KEY) {
            None => Ok(0),
            Some(raw) => raw
                .parse()
                .map_err(|_| Error::InvalidSchemaVersion(raw.clone())),
        }
    }

    /// Stamp the schema version into metadata.
    ///
    /// Version 0 is the unversioned convention and leaves metadata as is.
    pub fn record_schema_version(&mut self, version: u64) {
        if version > 0 {
            self.meta
                .insert(SCHEMA_VERSION_KEY.to_string(), version.to_string());
        }
    }

    /// Encode as `{"id": .., "attributes": {..}, "meta": {..}}`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}
