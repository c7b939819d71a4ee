//! Configuration validation
//!
//! Validation runs before any value is final, so some values may still be
//! unknown (pending interpolation). Unknown values are never type checked
//! or handed to field validators.

use crate::codec;
use crate::error::{Error, Result};
use crate::schema::SchemaMap;
use crate::value::Value;
use anyhow::anyhow;
use flatmap::{COUNT_KEY, SEPARATOR, is_under};
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Placeholder the config layer substitutes for values not yet known
pub const UNKNOWN_VALUE: &str = "74D93920-ED26-11E3-AC10-0800200C9A66";

/// Read-only access to a resource's raw configuration
pub trait ConfigGetter {
    /// The value at `path` and whether it is known yet
    fn get(&self, path: &str) -> (Option<Value>, bool);

    /// Top-level keys set in the configuration
    fn keys(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Cross-field validation over a whole configuration. Returns warnings and errors.
pub type ResourceValidateFn =
    Box<dyn Fn(&dyn ConfigGetter) -> (Vec<String>, Vec<anyhow::Error>) + Send + Sync>;

/// Validation of a single known value. Receives the value and its key.
pub type FieldValidateFn =
    Box<dyn Fn(&Value, &str) -> (Vec<String>, Vec<anyhow::Error>) + Send + Sync>;

// ============================================================================
// In-memory config
// ============================================================================

/// A configuration held in memory
///
/// ```toml
/// name = "web"
/// size = 2
/// tags = { Name = "web" }
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceConfig {
    values: BTreeMap<String, Value>,
    unknown: BTreeSet<String>,
}

impl ResourceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Mark a path as not known yet
    pub fn with_unknown(mut self, path: impl Into<String>) -> Self {
        self.unknown.insert(path.into());
        self
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(Self {
            values: toml::from_str(content)?,
            unknown: BTreeSet::new(),
        })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    fn lookup(&self, path: &str) -> Option<Value> {
        let mut parts = path.split(SEPARATOR);
        let mut current = self.values.get(parts.next()?)?;
        for part in parts {
            current = match current {
                Value::Map(entries) => entries.get(part)?,
                Value::List(items) | Value::Set(items) if part == COUNT_KEY => {
                    return Some(Value::Int(items.len() as i64));
                }
                Value::List(items) | Value::Set(items) => items.get(part.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current.clone())
    }
}

fn contains_unknown(value: &Value) -> bool {
    match value {
        Value::String(s) => s.contains(UNKNOWN_VALUE),
        Value::List(items) | Value::Set(items) => items.iter().any(contains_unknown),
        Value::Map(entries) => entries.values().any(contains_unknown),
        _ => false,
    }
}

impl ConfigGetter for ResourceConfig {
    fn get(&self, path: &str) -> (Option<Value>, bool) {
        let value = self.lookup(path);
        let pending = self
            .unknown
            .iter()
            .any(|u| is_under(path, u) || is_under(u, path));
        let known = !pending && !value.as_ref().is_some_and(contains_unknown);
        (value, known)
    }

    fn keys(&self) -> Vec<String> {
        let mut keys: BTreeSet<String> = self.values.keys().cloned().collect();
        keys.extend(self.unknown.iter().map(|u| flatmap::root(u).to_string()));
        keys.into_iter().collect()
    }
}

// ============================================================================
// Schema-driven validation
// ============================================================================

/// Check every top-level field of `config` against `schema`.
///
/// Reports keys the schema does not declare, required fields that are not
/// set, computed-only fields that are set, and known values that do not fit
/// their field type.
pub fn validate_config(
    schema: &SchemaMap,
    config: &dyn ConfigGetter,
) -> (Vec<String>, Vec<anyhow::Error>) {
    let warnings = Vec::new();
    let mut errors: Vec<anyhow::Error> = Vec::new();

    for key in config.keys() {
        if schema.get(&key).is_none() {
            errors.push(Error::UnknownField(key).into());
        }
    }

    for (name, field) in schema {
        let (value, known) = config.get(name);
        if !known {
            log::trace!("Skipping validation of unknown value {name}");
            continue;
        }
        match value {
            None | Some(Value::Null) => {
                if field.required {
                    errors.push(anyhow!("{name}: required field is not set"));
                }
            }
            Some(_) if field.is_computed_only() => {
                errors.push(anyhow!("{name}: computed field cannot be set"));
            }
            Some(value) => {
                if let Err(e) = codec::coerce(&field.kind, &value, name) {
                    errors.push(e.into());
                }
            }
        }
    }

    (warnings, errors)
}

/// Run several resource validators in order and concatenate their results
pub fn compose_resource_validate_fn(
    fns: impl IntoIterator<Item = ResourceValidateFn>,
) -> ResourceValidateFn {
    let fns: Vec<ResourceValidateFn> = fns.into_iter().collect();
    Box::new(move |config: &dyn ConfigGetter| {
        let mut warnings = Vec::new();
        let mut errors = Vec::new();
        for f in &fns {
            let (w, e) = f(config);
            warnings.extend(w);
            errors.extend(e);
        }
        (warnings, errors)
    })
}

// ============================================================================
// Field validators
// ============================================================================

/// Apply a field validator to the value at `key` when it is set and known
pub fn validate_field(key: impl Into<String>, f: FieldValidateFn) -> ResourceValidateFn {
    let key = key.into();
    Box::new(move |config: &dyn ConfigGetter| match config.get(&key) {
        (Some(value), true) if !value.is_null() => f(&value, &key),
        _ => (Vec::new(), Vec::new()),
    })
}

/// Accept ints in `min..=max`
pub fn int_between(min: i64, max: i64) -> FieldValidateFn {
    Box::new(move |value: &Value, key: &str| {
        let Some(v) = value.as_int() else {
            return (Vec::new(), vec![anyhow!("expected type of {key} to be int")]);
        };
        if v < min || v > max {
            return (
                Vec::new(),
                vec![anyhow!("expected {key} to be in the range ({min} - {max}), got {v}")],
            );
        }
        (Vec::new(), Vec::new())
    })
}

/// Accept one of a fixed set of strings
pub fn string_in_slice(valid: &[&str], ignore_case: bool) -> FieldValidateFn {
    let valid: Vec<String> = valid.iter().map(ToString::to_string).collect();
    Box::new(move |value: &Value, key: &str| {
        let Some(v) = value.as_str() else {
            return (Vec::new(), vec![anyhow!("expected type of {key} to be string")]);
        };
        let found = valid
            .iter()
            .any(|candidate| candidate == v || (ignore_case && candidate.eq_ignore_ascii_case(v)));
        if found {
            (Vec::new(), Vec::new())
        } else {
            (
                Vec::new(),
                vec![anyhow!("expected {key} to be one of {valid:?}, got {v}")],
            )
        }
    })
}

/// Accept strings matching `pattern`. `message` describes the expected form.
pub fn string_matches(pattern: Regex, message: impl Into<String>) -> FieldValidateFn {
    let message = message.into();
    Box::new(move |value: &Value, key: &str| {
        let Some(v) = value.as_str() else {
            return (Vec::new(), vec![anyhow!("expected type of {key} to be string")]);
        };
        if pattern.is_match(v) {
            return (Vec::new(), Vec::new());
        }
        let error = if message.is_empty() {
            anyhow!("invalid value for {key} (should match {pattern:?}), got {v}")
        } else {
            anyhow!("invalid value for {key} ({message})")
        };
        (Vec::new(), vec![error])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, Schema};
    use std::io::Write;

    fn messages(errors: &[anyhow::Error]) -> Vec<String> {
        errors.iter().map(ToString::to_string).collect()
    }

    fn schema() -> SchemaMap {
        SchemaMap::new()
            .with("name", Schema::required(FieldType::String))
            .with("size", Schema::optional(FieldType::Int))
            .with("tags", Schema::optional(FieldType::map(FieldType::String)))
            .with("address", Schema::computed(FieldType::String))
    }

    #[test]
    fn test_config_get_nested() {
        let config = ResourceConfig::new()
            .with("tags", Value::map([("Name", "web")]))
            .with("ports", Value::list([80, 443]));

        assert_eq!(config.get("tags.Name"), (Some(Value::from("web")), true));
        assert_eq!(config.get("ports.1"), (Some(Value::from(443)), true));
        assert_eq!(config.get("ports.#"), (Some(Value::from(2)), true));
        assert_eq!(config.get("ports.9"), (None, true));
        assert_eq!(config.get("missing"), (None, true));
    }

    #[test]
    fn test_config_unknown_values() {
        let config = ResourceConfig::new()
            .with("name", UNKNOWN_VALUE)
            .with("tags", Value::map([("Name", format!("web-{UNKNOWN_VALUE}"))]))
            .with("size", 2)
            .with_unknown("ports.0");

        assert!(!config.get("name").1);
        assert!(!config.get("tags").1);
        assert!(!config.get("tags.Name").1);
        assert!(!config.get("ports").1);
        assert!(!config.get("ports.0").1);
        assert!(config.get("size").1);
        assert_eq!(config.keys(), vec!["name", "ports", "size", "tags"]);
    }

    #[test]
    fn test_config_from_toml() {
        let config = ResourceConfig::from_toml_str(
            r#"
            name = "web"
            size = 2
            tags = { Name = "web" }
            "#,
        )
        .unwrap();

        assert_eq!(config.get("name").0, Some(Value::from("web")));
        assert_eq!(config.get("size").0, Some(Value::from(2)));
        assert_eq!(config.get("tags.Name").0, Some(Value::from("web")));
    }

    #[test]
    fn test_config_load() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "size = 3").unwrap();

        let config = ResourceConfig::load(file.path()).unwrap();
        assert_eq!(config.get("size").0, Some(Value::from(3)));
    }

    #[test]
    fn test_validate_config_passes() {
        let config = ResourceConfig::new()
            .with("name", "web")
            .with("size", "2")
            .with("tags", Value::map([("Name", "web")]));

        let (warnings, errors) = validate_config(&schema(), &config);
        assert!(warnings.is_empty());
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_validate_config_problems() {
        let config = ResourceConfig::new()
            .with("size", "big")
            .with("address", "10.0.0.1")
            .with("color", "red");

        let (_, errors) = validate_config(&schema(), &config);
        assert_eq!(
            messages(&errors),
            vec![
                "color: no such field in schema",
                "address: computed field cannot be set",
                "name: required field is not set",
                "size: expected int, got string",
            ]
        );
    }

    #[test]
    fn test_validate_config_skips_unknown() {
        let config = ResourceConfig::new()
            .with("size", UNKNOWN_VALUE)
            .with_unknown("name");

        let (_, errors) = validate_config(&schema(), &config);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_compose_runs_all_in_order() {
        let first: ResourceValidateFn =
            Box::new(|_: &dyn ConfigGetter| (vec!["first".to_string()], vec![anyhow!("one")]));
        let second: ResourceValidateFn =
            Box::new(|_: &dyn ConfigGetter| (vec!["second".to_string()], vec![anyhow!("two")]));

        let composed = compose_resource_validate_fn([first, second]);
        let (warnings, errors) = composed(&ResourceConfig::new());
        assert_eq!(warnings, vec!["first", "second"]);
        assert_eq!(messages(&errors), vec!["one", "two"]);
    }

    #[test]
    fn test_int_between() {
        let check = validate_field("size", int_between(1, 10));

        let (_, errors) = check(&ResourceConfig::new().with("size", 5));
        assert!(errors.is_empty());

        let (_, errors) = check(&ResourceConfig::new().with("size", 11));
        assert_eq!(
            messages(&errors),
            vec!["expected size to be in the range (1 - 10), got 11"]
        );

        let (_, errors) = check(&ResourceConfig::new());
        assert!(errors.is_empty());

        let (_, errors) = check(&ResourceConfig::new().with("size", UNKNOWN_VALUE));
        assert!(errors.is_empty());
    }

    #[test]
    fn test_string_in_slice() {
        let strict = validate_field("proto", string_in_slice(&["tcp", "udp"], false));
        let loose = validate_field("proto", string_in_slice(&["tcp", "udp"], true));
        let config = ResourceConfig::new().with("proto", "TCP");

        assert_eq!(
            messages(&strict(&config).1),
            vec![r#"expected proto to be one of ["tcp", "udp"], got TCP"#]
        );
        assert!(loose(&config).1.is_empty());
    }

    #[test]
    fn test_string_matches() {
        let pattern = Regex::new(r"^[a-z][a-z0-9-]*$").unwrap();
        let check = validate_field(
            "name",
            string_matches(pattern, "lowercase letters, digits and dashes"),
        );

        assert!(check(&ResourceConfig::new().with("name", "web-1")).1.is_empty());
        assert_eq!(
            messages(&check(&ResourceConfig::new().with("name", "Web")).1),
            vec!["invalid value for name (lowercase letters, digits and dashes)"]
        );
    }
}
