//! Read/write view handed to lifecycle callbacks

use crate::codec;
use crate::error::{Error, Result};
use crate::schema::{FieldType, SchemaMap};
use crate::value::Value;
use flatmap::{FlatMap, SEPARATOR, is_under};
use instance::{ID_ATTRIBUTE, InstanceDiff, InstanceState};
use std::collections::BTreeSet;

/// Which layers a read looks through
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Level {
    /// Base state only
    State,
    /// Base state with the diff laid over it
    Diff,
    /// Everything, including values written during this invocation
    Set,
}

/// Attributes of one top-level field at some level
struct FieldView {
    attributes: FlatMap,
    /// Paths whose value is unknown until apply
    computed: BTreeSet<String>,
}

impl FieldView {
    fn is_unknown(&self, path: &str) -> bool {
        self.computed.iter().any(|c| is_under(path, c))
    }
}

/// Layered view over base state, a pending diff, and local writes.
///
/// Reads look at writes first, then the diff, then the base state, then
/// the field default, then the zero value of the field type. Writes are
/// buffered and survive a failing callback, so partial progress can be
/// persisted.
#[derive(Debug)]
pub struct ResourceData<'a> {
    schema: &'a SchemaMap,
    state: Option<&'a InstanceState>,
    diff: Option<&'a InstanceDiff>,
    writes: FlatMap,
    /// Top-level fields whose whole value now lives in `writes`
    written: BTreeSet<String>,
    new_id: Option<String>,
}

impl<'a> ResourceData<'a> {
    pub fn new(
        schema: &'a SchemaMap,
        state: Option<&'a InstanceState>,
        diff: Option<&'a InstanceDiff>,
    ) -> Self {
        Self {
            schema,
            state,
            diff,
            writes: FlatMap::new(),
            written: BTreeSet::new(),
            new_id: None,
        }
    }

    /// Current value at `path`. Undeclared paths read as `Value::Null`.
    pub fn get(&self, path: &str) -> Value {
        self.value_at(path, Level::Set)
    }

    /// Current value at `path` when it is set to something other than the
    /// zero value of its type
    pub fn get_ok(&self, path: &str) -> Option<Value> {
        let value = self.get(path);
        (!value.is_zero()).then_some(value)
    }

    /// The value before and after the pending diff
    pub fn get_change(&self, path: &str) -> (Value, Value) {
        (
            self.value_at(path, Level::State),
            self.value_at(path, Level::Diff),
        )
    }

    /// Whether the pending diff changes `path`.
    ///
    /// Without a base state everything the diff mentions counts as changed.
    pub fn has_change(&self, path: &str) -> bool {
        if self.state.is_none() {
            return self.diff.is_some_and(|diff| diff.touches(path));
        }
        let (old, new) = self.get_change(path);
        old != new
    }

    /// Write `value` at `path`. `Value::Null` clears it.
    pub fn set(&mut self, path: &str, value: impl Into<Value>) -> Result<()> {
        let kind = self
            .schema
            .field_type(path)
            .ok_or_else(|| Error::UnknownField(path.to_string()))?;
        let value = value.into();

        let mut staged = FlatMap::new();
        codec::encode(kind, &value, path, &mut staged)?;

        let field = flatmap::root(path);
        if !self.written.contains(field) {
            if path != field {
                let current = self.view(field, Level::Diff).attributes;
                self.writes.extend(current);
            }
            self.written.insert(field.to_string());
        }

        let growth = if value.is_null() {
            Vec::new()
        } else {
            self.list_growth(path)?
        };

        self.writes.remove_subtree(path);
        self.writes.extend(staged);
        for (marker, len) in growth {
            self.writes.insert(marker, len.to_string());
        }
        log::trace!("Set {path} = {value:?}");
        Ok(())
    }

    /// Count markers to raise so lists cover an element written by index.
    ///
    /// An index may overwrite an element or append one, never leave a gap.
    fn list_growth(&self, path: &str) -> Result<Vec<(String, usize)>> {
        let mut growth = Vec::new();
        let mut current = path;
        while let Some((parent, last)) = current.rsplit_once(SEPARATOR) {
            if let Some(FieldType::List(_)) = self.schema.field_type(parent)
                && let Ok(index) = last.parse::<usize>()
            {
                let len = self.writes.count(parent).ok().flatten().unwrap_or(0);
                let out_of_range = || Error::TypeMismatch {
                    path: current.to_string(),
                    expected: format!("list index at most {len}"),
                    actual: "index past the end",
                };
                if index > len {
                    return Err(out_of_range());
                }
                if index == len {
                    let grown = len.checked_add(1).ok_or_else(out_of_range)?;
                    growth.push((flatmap::count_path(parent), grown));
                }
            }
            current = parent;
        }
        Ok(growth)
    }

    /// Set the instance id. An empty id marks the instance as gone.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.new_id = Some(id.into());
    }

    pub fn id(&self) -> &str {
        match &self.new_id {
            Some(id) => id,
            None => self.state.map_or("", |s| s.id.as_str()),
        }
    }

    /// Flatten the final view into a new state.
    ///
    /// Returns `None` when the id is empty. Fields that are absent, or
    /// still unknown and never written, are left out.
    pub fn state(&self) -> Option<InstanceState> {
        let id = self.id();
        if id.is_empty() {
            return None;
        }

        let mut result = InstanceState::new(id);
        for (name, schema) in self.schema {
            let view = self.view(name, Level::Set);
            if view.computed.contains(name) {
                continue;
            }
            match codec::decode(&schema.kind, &view.attributes, name) {
                Ok(Some(value)) => {
                    if let Err(e) =
                        codec::encode(&schema.kind, &value, name, &mut result.attributes)
                    {
                        log::warn!("Keeping raw attributes for {name}: {e}");
                        result.attributes.extend(view.attributes);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    log::warn!("Keeping raw attributes for {name}: {e}");
                    result.attributes.extend(view.attributes);
                }
            }
        }
        result.attributes.insert(ID_ATTRIBUTE, id);

        if let Some(base) = self.state {
            result.meta = base.meta.clone();
        }
        Some(result)
    }

    fn view(&self, field: &str, level: Level) -> FieldView {
        if level == Level::Set && self.written.contains(field) {
            return FieldView {
                attributes: self.writes.subtree(field),
                computed: BTreeSet::new(),
            };
        }

        let empty = FlatMap::new();
        let base = self.state.map_or(&empty, |s| &s.attributes);
        match self.diff {
            Some(diff) if level != Level::State => {
                let overlay = diff.overlay(base, field);
                FieldView {
                    attributes: overlay.attributes,
                    computed: overlay.computed,
                }
            }
            _ => FieldView {
                attributes: base.subtree(field),
                computed: BTreeSet::new(),
            },
        }
    }

    fn value_at(&self, path: &str, level: Level) -> Value {
        let Some(kind) = self.schema.field_type(path) else {
            log::warn!("Read of undeclared attribute {path}");
            return Value::Null;
        };

        let field = flatmap::root(path);
        let view = self.view(field, level);
        if view.is_unknown(path) {
            return kind.zero();
        }

        match codec::decode(kind, &view.attributes, path) {
            Ok(Some(value)) => return value,
            Ok(None) => {}
            Err(e) => log::warn!("Ignoring unreadable value at {path}: {e}"),
        }

        if path == field
            && let Some(default) = self.schema.get(field).and_then(|s| s.default.as_ref())
            && let Ok(value) = codec::coerce(kind, default, path)
        {
            return value;
        }
        kind.zero()
    }
}
