//! Conversion between typed values and flattened attributes
//!
//! A value at `path` is stored as one string per scalar leaf. Lists, sets
//! and maps store their element count under `path.#` and each element under
//! `path.<index>`, `path.<set key>` or `path.<map key>`. Object blocks store
//! each present field under `path.<field>` with no count marker.

use crate::error::{Error, Result};
use crate::schema::FieldType;
use crate::value::Value;
use flatmap::{FlatMap, join};
use std::collections::BTreeMap;

fn mismatch(kind: &FieldType, value: &Value, path: &str) -> Error {
    Error::TypeMismatch {
        path: path.to_string(),
        expected: kind.name(),
        actual: value.kind_name(),
    }
}

fn decode_error(path: &str, message: impl Into<String>) -> Error {
    Error::Decode {
        path: path.to_string(),
        message: message.into(),
    }
}

/// Normalize `value` to the shape of `kind`, with weak typing.
///
/// Numeric strings become numbers, `"true"`/`"false"` become booleans,
/// scalars become strings, ints become floats and lists become sets.
/// Null passes through as the "clear" value. Sets come back deduplicated
/// and ordered by element key.
pub fn coerce(kind: &FieldType, value: &Value, path: &str) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }

    let coerced = match (kind, value) {
        (FieldType::Bool, Value::Bool(b)) => Value::Bool(*b),
        (FieldType::Bool, Value::String(s)) => match s.as_str() {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            _ => return Err(mismatch(kind, value, path)),
        },

        (FieldType::Int, Value::Int(i)) => Value::Int(*i),
        (FieldType::Int, Value::String(s)) => {
            Value::Int(s.parse().map_err(|_| mismatch(kind, value, path))?)
        }

        (FieldType::Float, Value::Float(f)) => Value::Float(*f),
        (FieldType::Float, Value::Int(i)) => Value::Float(*i as f64),
        (FieldType::Float, Value::String(s)) => {
            Value::Float(s.parse().map_err(|_| mismatch(kind, value, path))?)
        }

        (
            FieldType::String,
            Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_),
        ) => Value::String(value.scalar_string().unwrap_or_default()),

        (FieldType::List(elem), Value::List(items) | Value::Set(items)) => {
            let items = coerce_elements(elem, items, path)?;
            if let Some(i) = items.iter().position(|item| is_blank(elem, item)) {
                return Err(Error::TypeMismatch {
                    path: join(path, &i.to_string()),
                    expected: format!("non-empty {}", elem.name()),
                    actual: "empty block",
                });
            }
            Value::List(items)
        }

        (FieldType::Set(elem), Value::List(items) | Value::Set(items)) => {
            let mut by_key = BTreeMap::new();
            for item in coerce_elements(elem, items, path)? {
                if !is_blank(elem, &item) {
                    by_key.entry(item.set_key()).or_insert(item);
                }
            }
            Value::Set(by_key.into_values().collect())
        }

        (FieldType::Map(elem), Value::Map(entries)) => {
            let mut out = BTreeMap::new();
            for (key, item) in entries {
                let item = coerce(elem, item, &join(path, key))?;
                if !is_blank(elem, &item) {
                    out.insert(key.clone(), item);
                }
            }
            Value::Map(out)
        }

        (FieldType::Object(fields), Value::Map(entries)) => {
            let mut out = BTreeMap::new();
            for (name, item) in entries {
                let field_path = join(path, name);
                let schema = fields
                    .get(name)
                    .ok_or_else(|| Error::UnknownField(field_path.clone()))?;
                let item = coerce(&schema.kind, item, &field_path)?;
                if !item.is_null() {
                    out.insert(name.clone(), item);
                }
            }
            Value::Map(out)
        }

        _ => return Err(mismatch(kind, value, path)),
    };

    Ok(coerced)
}

/// Whether a coerced value flattens to no entries at all
fn is_blank(kind: &FieldType, value: &Value) -> bool {
    match (kind, value) {
        (_, Value::Null) => true,
        (FieldType::Object(fields), Value::Map(entries)) => entries.iter().all(|(name, item)| {
            fields
                .get(name)
                .is_none_or(|schema| is_blank(&schema.kind, item))
        }),
        _ => false,
    }
}

fn coerce_elements(elem: &FieldType, items: &[Value], path: &str) -> Result<Vec<Value>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let item_path = join(path, &i.to_string());
            if item.is_null() {
                return Err(mismatch(elem, item, &item_path));
            }
            coerce(elem, item, &item_path)
        })
        .collect()
}

/// Coerce `value` and write its flattened form at `path`.
///
/// Nothing is written for `Value::Null`. Existing entries at `path` are
/// left alone; callers clear the subtree first when replacing.
pub fn encode(kind: &FieldType, value: &Value, path: &str, out: &mut FlatMap) -> Result<()> {
    let value = coerce(kind, value, path)?;
    write(kind, &value, path, out);
    Ok(())
}

fn write(kind: &FieldType, value: &Value, path: &str, out: &mut FlatMap) {
    match (kind, value) {
        (_, Value::Null) => {}
        (FieldType::List(elem), Value::List(items)) => {
            out.insert(flatmap::count_path(path), items.len().to_string());
            for (i, item) in items.iter().enumerate() {
                write(elem, item, &join(path, &i.to_string()), out);
            }
        }
        (FieldType::Set(elem), Value::Set(items)) => {
            out.insert(flatmap::count_path(path), items.len().to_string());
            for item in items {
                write(elem, item, &join(path, &item.set_key()), out);
            }
        }
        (FieldType::Map(elem), Value::Map(entries)) => {
            out.insert(flatmap::count_path(path), entries.len().to_string());
            for (key, item) in entries {
                write(elem, item, &join(path, key), out);
            }
        }
        (FieldType::Object(fields), Value::Map(entries)) => {
            for (name, item) in entries {
                if let Some(schema) = fields.get(name) {
                    write(&schema.kind, item, &join(path, name), out);
                }
            }
        }
        (_, scalar) => {
            if let Some(s) = scalar.scalar_string() {
                out.insert(path, s);
            }
        }
    }
}

/// Read the value of type `kind` stored at `path`.
///
/// Returns `Ok(None)` when nothing is stored there.
pub fn decode(kind: &FieldType, flat: &FlatMap, path: &str) -> Result<Option<Value>> {
    match kind {
        FieldType::Bool => flat
            .get(path)
            .map(|raw| match raw {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" | "" => Ok(Value::Bool(false)),
                other => Err(decode_error(path, format!("invalid bool {other:?}"))),
            })
            .transpose(),
        FieldType::Int => flat
            .get(path)
            .map(|raw| {
                raw.parse()
                    .map(Value::Int)
                    .map_err(|e| decode_error(path, format!("invalid int {raw:?}: {e}")))
            })
            .transpose(),
        FieldType::Float => flat
            .get(path)
            .map(|raw| {
                raw.parse()
                    .map(Value::Float)
                    .map_err(|e| decode_error(path, format!("invalid float {raw:?}: {e}")))
            })
            .transpose(),
        FieldType::String => Ok(flat.get(path).map(Value::from)),
        FieldType::List(elem) => decode_list(elem, flat, path),
        FieldType::Set(elem) => {
            let Some(keys) = collection_keys(flat, path)? else {
                return Ok(None);
            };
            let mut items = Vec::with_capacity(keys.len());
            for key in keys {
                if let Some(item) = decode(elem, flat, &join(path, &key))? {
                    items.push(item);
                }
            }
            Ok(Some(Value::Set(items)))
        }
        FieldType::Map(elem) => decode_map(elem, flat, path),
        FieldType::Object(fields) => {
            let mut out = BTreeMap::new();
            for (name, schema) in fields {
                if let Some(item) = decode(&schema.kind, flat, &join(path, name))? {
                    out.insert(name.clone(), item);
                }
            }
            Ok((!out.is_empty()).then_some(Value::Map(out)))
        }
    }
}

/// Child keys of a set or map, or `None` when neither a count marker nor
/// any child is stored
fn collection_keys(flat: &FlatMap, path: &str) -> Result<Option<Vec<String>>> {
    let count = flat.count(path)?;
    let keys = flat.child_keys(path);
    if count.is_none() && keys.is_empty() {
        return Ok(None);
    }
    Ok(Some(keys.into_iter().collect()))
}

fn decode_list(elem: &FieldType, flat: &FlatMap, path: &str) -> Result<Option<Value>> {
    let stored = flat.child_keys(path);
    let len = match flat.count(path)? {
        Some(len) if len > stored.len() => {
            return Err(decode_error(
                path,
                format!("count {len} exceeds {} stored elements", stored.len()),
            ));
        }
        Some(len) => len,
        None => {
            let mut highest = None;
            for key in &stored {
                let index: usize = key
                    .parse()
                    .map_err(|_| decode_error(path, format!("invalid list index {key:?}")))?;
                if index > stored.len() {
                    return Err(decode_error(
                        path,
                        format!("index {index} exceeds {} stored elements", stored.len()),
                    ));
                }
                highest = highest.max(Some(index));
            }
            match highest {
                Some(index) => index
                    .checked_add(1)
                    .ok_or_else(|| decode_error(path, format!("list index {index} overflows")))?,
                None => return Ok(None),
            }
        }
    };

    let mut items = Vec::with_capacity(stored.len());
    for i in 0..len {
        let item = decode(elem, flat, &join(path, &i.to_string()))?;
        items.push(item.unwrap_or_else(|| elem.zero()));
    }
    Ok(Some(Value::List(items)))
}

fn decode_map(elem: &FieldType, flat: &FlatMap, path: &str) -> Result<Option<Value>> {
    if !elem.is_primitive() {
        let Some(keys) = collection_keys(flat, path)? else {
            return Ok(None);
        };
        let mut out = BTreeMap::new();
        for key in keys {
            if let Some(item) = decode(elem, flat, &join(path, &key))? {
                out.insert(key, item);
            }
        }
        return Ok(Some(Value::Map(out)));
    }

    // Scalar map keys may themselves contain the separator
    let count = flat.count(path)?;
    let marker = flatmap::count_path(path);
    let mut out = BTreeMap::new();
    for (key, _) in flat.entries_under(path) {
        if *key == marker {
            continue;
        }
        if let Some(rest) = flatmap::strip(key, path) {
            if let Some(item) = decode(elem, flat, key)? {
                out.insert(rest.to_string(), item);
            }
        }
    }
    if count.is_none() && out.is_empty() {
        return Ok(None);
    }
    Ok(Some(Value::Map(out)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{Schema, SchemaMap};

    fn rule_type() -> FieldType {
        FieldType::Object(
            SchemaMap::new()
                .with("port", Schema::required(FieldType::Int))
                .with("proto", Schema::optional(FieldType::String)),
        )
    }

    fn flat(pairs: &[(&str, &str)]) -> FlatMap {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_weak_coercion() {
        assert_eq!(
            coerce(&FieldType::Int, &Value::from("42"), "foo").unwrap(),
            Value::Int(42)
        );
        assert_eq!(
            coerce(&FieldType::Bool, &Value::from("true"), "foo").unwrap(),
            Value::Bool(true)
        );
        assert_eq!(
            coerce(&FieldType::String, &Value::from(7), "foo").unwrap(),
            Value::from("7")
        );
        assert_eq!(
            coerce(&FieldType::Float, &Value::from(2), "foo").unwrap(),
            Value::Float(2.0)
        );
        assert_eq!(
            coerce(&FieldType::set(FieldType::Int), &Value::list([2, 1, 2]), "s").unwrap(),
            Value::set([1, 2])
        );
    }

    #[test]
    fn test_coerce_mismatch_names_path() {
        let err = coerce(&FieldType::Int, &Value::from("abc"), "foo").unwrap_err();
        assert_eq!(err.to_string(), "foo: expected int, got string");

        let err = coerce(
            &FieldType::list(FieldType::Int),
            &Value::list([Value::from(1), Value::from(true)]),
            "ports",
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "ports.1: expected int, got bool");

        let err = coerce(&rule_type(), &Value::map([("nope", 1)]), "rule.0").unwrap_err();
        assert!(matches!(err, Error::UnknownField(ref p) if p == "rule.0.nope"));
    }

    #[test]
    fn test_encode_scalars() {
        let mut out = FlatMap::new();
        encode(&FieldType::Int, &Value::from(42), "a", &mut out).unwrap();
        encode(&FieldType::Bool, &Value::from(true), "b", &mut out).unwrap();
        encode(&FieldType::Float, &Value::from(1.5), "c", &mut out).unwrap();
        encode(&FieldType::String, &Value::Null, "d", &mut out).unwrap();
        assert_eq!(out, flat(&[("a", "42"), ("b", "true"), ("c", "1.5")]));
    }

    #[test]
    fn test_encode_collections() {
        let mut out = FlatMap::new();
        encode(
            &FieldType::list(FieldType::Int),
            &Value::list([80, 443]),
            "ports",
            &mut out,
        )
        .unwrap();
        encode(
            &FieldType::map(FieldType::String),
            &Value::map([("Name", "web")]),
            "tags",
            &mut out,
        )
        .unwrap();
        assert_eq!(
            out,
            flat(&[
                ("ports.#", "2"),
                ("ports.0", "80"),
                ("ports.1", "443"),
                ("tags.#", "1"),
                ("tags.Name", "web"),
            ])
        );
    }

    #[test]
    fn test_encode_set_of_objects() {
        let rule = Value::map([("port", Value::from(443)), ("proto", Value::from("tcp"))]);
        let key = rule.set_key();

        let mut out = FlatMap::new();
        encode(
            &FieldType::set(rule_type()),
            &Value::set([rule.clone(), rule]),
            "rule",
            &mut out,
        )
        .unwrap();

        assert_eq!(out.get("rule.#"), Some("1"));
        assert_eq!(out.get(&format!("rule.{key}.port")), Some("443"));
        assert_eq!(out.get(&format!("rule.{key}.proto")), Some("tcp"));
        assert!(!out.contains_key(&format!("rule.{key}.#")));
    }

    #[test]
    fn test_set_key_independent_of_input_spelling() {
        let typed = Value::map([("port", 443)]);
        let loose = Value::map([("port", "443")]);

        let mut a = FlatMap::new();
        let mut b = FlatMap::new();
        encode(&FieldType::set(rule_type()), &Value::set([typed]), "r", &mut a).unwrap();
        encode(&FieldType::set(rule_type()), &Value::set([loose]), "r", &mut b).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_absent() {
        let empty = FlatMap::new();
        for kind in [
            FieldType::Int,
            FieldType::list(FieldType::Int),
            FieldType::set(FieldType::String),
            FieldType::map(FieldType::String),
            rule_type(),
        ] {
            assert_eq!(decode(&kind, &empty, "x").unwrap(), None);
        }
    }

    #[test]
    fn test_decode_list_without_count() {
        let stored = flat(&[("ports.0", "80"), ("ports.2", "443")]);
        let value = decode(&FieldType::list(FieldType::Int), &stored, "ports").unwrap();
        assert_eq!(value, Some(Value::list([80, 0, 443])));
    }

    #[test]
    fn test_decode_empty_collections_with_count() {
        let stored = flat(&[("tags.#", "0"), ("ports.#", "0")]);
        assert_eq!(
            decode(&FieldType::map(FieldType::String), &stored, "tags").unwrap(),
            Some(Value::Map(BTreeMap::new()))
        );
        assert_eq!(
            decode(&FieldType::list(FieldType::Int), &stored, "ports").unwrap(),
            Some(Value::List(Vec::new()))
        );
    }

    #[test]
    fn test_decode_map_without_count() {
        let stored = flat(&[("tags.Name", "web")]);
        let value = decode(&FieldType::map(FieldType::String), &stored, "tags").unwrap();
        assert_eq!(value, Some(Value::map([("Name", "web")])));
    }

    #[test]
    fn test_decode_map_key_with_separator() {
        let stored = flat(&[("labels.#", "1"), ("labels.app.kubernetes.io/name", "web")]);
        let value = decode(&FieldType::map(FieldType::String), &stored, "labels").unwrap();
        assert_eq!(value, Some(Value::map([("app.kubernetes.io/name", "web")])));
    }

    #[test]
    fn test_decode_errors() {
        let stored = flat(&[("n", "twelve"), ("ports.#", "many")]);
        let err = decode(&FieldType::Int, &stored, "n").unwrap_err();
        assert!(matches!(err, Error::Decode { ref path, .. } if path == "n"));

        let err = decode(&FieldType::list(FieldType::Int), &stored, "ports").unwrap_err();
        assert!(matches!(err, Error::Flatmap(_)));
    }

    #[test]
    fn test_encode_then_decode() {
        let cases = [
            (FieldType::Float, Value::from(0.1)),
            (
                FieldType::list(FieldType::list(FieldType::String)),
                Value::list([Value::list(["a", "b"]), Value::list(["c"])]),
            ),
            (
                FieldType::set(rule_type()),
                Value::set([
                    Value::map([("port", Value::from(80))]),
                    Value::map([("port", Value::from(443)), ("proto", Value::from("tcp"))]),
                ]),
            ),
            (
                FieldType::map(FieldType::list(FieldType::Int)),
                Value::map([("a", Value::list([1, 2]))]),
            ),
        ];

        for (kind, value) in cases {
            let mut out = FlatMap::new();
            encode(&kind, &value, "f", &mut out).unwrap();
            assert_eq!(decode(&kind, &out, "f").unwrap(), Some(value));
        }

        // Blocks with no fields leave nothing to read back
        let kind = FieldType::set(rule_type());
        let value = Value::set([
            Value::map([("proto", Value::Null)]),
            Value::map([("port", 80)]),
        ]);
        let mut out = FlatMap::new();
        encode(&kind, &value, "f", &mut out).unwrap();
        assert_eq!(out.get("f.#"), Some("1"));
        assert_eq!(
            decode(&kind, &out, "f").unwrap(),
            Some(Value::set([Value::map([("port", 80)])]))
        );
        assert_eq!(
            decode(&kind, &out, "f").unwrap(),
            Some(coerce(&kind, &value, "f").unwrap())
        );
    }

    #[test]
    fn test_empty_blocks_in_collections() {
        let kind = FieldType::map(rule_type());
        let value = Value::map([
            ("a", Value::Map(BTreeMap::new())),
            ("b", Value::map([("port", 22)])),
        ]);
        assert_eq!(
            coerce(&kind, &value, "rules").unwrap(),
            Value::map([("b", Value::map([("port", 22)]))])
        );

        let kind = FieldType::list(rule_type());
        let value = Value::list([Value::map([("port", 22)]), Value::Map(BTreeMap::new())]);
        let err = coerce(&kind, &value, "rules").unwrap_err();
        assert!(matches!(err, Error::TypeMismatch { ref path, .. } if path == "rules.1"));
    }

    #[test]
    fn test_decode_rejects_lists_longer_than_stored() {
        let kind = FieldType::list(FieldType::Int);

        let stored = flat(&[("ports.#", "1000000000000000000"), ("ports.0", "80")]);
        let err = decode(&kind, &stored, "ports").unwrap_err();
        assert!(matches!(err, Error::Decode { ref path, .. } if path == "ports"));

        let stored = flat(&[("ports.18446744073709551615", "1")]);
        let err = decode(&kind, &stored, "ports").unwrap_err();
        assert!(matches!(err, Error::Decode { ref path, .. } if path == "ports"));

        let stored = flat(&[("ports.#", "3"), ("ports.0", "80")]);
        assert!(decode(&kind, &stored, "ports").is_err());
    }
}
