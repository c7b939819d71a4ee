//! Planned changes to a single resource instance

use crate::error::Result;
use flatmap::{COUNT_KEY, FlatMap, SEPARATOR, is_under};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::Bound;

fn is_false(b: &bool) -> bool {
    !b
}

/// The planned change to one flattened attribute
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrDiff {
    #[serde(default)]
    pub old: String,
    #[serde(default)]
    pub new: String,
    /// Changing this attribute requires destroying and recreating the instance
    #[serde(default)]
    pub requires_new: bool,
    /// The new value is not known until the provider computes it
    #[serde(default)]
    pub new_computed: bool,
    /// The attribute is to be removed
    #[serde(default, skip_serializing_if = "is_false")]
    pub new_removed: bool,
}

impl AttrDiff {
    /// An attribute gaining a value
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            new: value.into(),
            ..Default::default()
        }
    }

    /// An attribute moving from `old` to `new`
    pub fn change(old: impl Into<String>, new: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new: new.into(),
            ..Default::default()
        }
    }

    /// An attribute whose new value will be computed by the provider
    pub fn computed() -> Self {
        Self {
            new_computed: true,
            ..Default::default()
        }
    }

    /// An attribute being removed
    pub fn removed(old: impl Into<String>) -> Self {
        Self {
            old: old.into(),
            new_removed: true,
            ..Default::default()
        }
    }

    /// Mark the change as forcing recreation
    pub fn forcing_new(mut self) -> Self {
        self.requires_new = true;
        self
    }
}

/// The delta to apply to one resource instance
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceDiff {
    #[serde(default)]
    pub destroy: bool,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttrDiff>,
}

/// Attributes visible after laying a diff over base attributes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    pub attributes: FlatMap,
    /// Paths whose value is unknown until apply. A collection whose count
    /// is unknown is recorded by its own path, not its `#` marker.
    pub computed: BTreeSet<String>,
}

impl InstanceDiff {
    pub fn new() -> Self {
        Self::default()
    }

    /// A diff that destroys the instance
    pub fn destroy() -> Self {
        Self {
            destroy: true,
            ..Default::default()
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, attr: AttrDiff) -> Self {
        self.attributes.insert(key.into(), attr);
        self
    }

    /// Whether any attribute change forces recreation
    pub fn requires_new(&self) -> bool {
        self.attributes.values().any(|a| a.requires_new)
    }

    /// Whether applying this diff would do nothing
    pub fn is_empty(&self) -> bool {
        !self.destroy && self.attributes.is_empty()
    }

    /// Attribute changes at `prefix` or below it
    pub fn attributes_under<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a AttrDiff)> + 'a {
        self.attributes
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .filter(move |(k, _)| is_under(k, prefix))
    }

    /// Whether the diff touches `prefix` or anything below it
    pub fn touches(&self, prefix: &str) -> bool {
        self.attributes_under(prefix).next().is_some()
    }

    /// Lay the pending values at or below `prefix` over `base`.
    ///
    /// Removed attributes are dropped, computed attributes are dropped and
    /// recorded as unknown, everything else takes its new value.
    pub fn overlay(&self, base: &FlatMap, prefix: &str) -> Overlay {
        let mut overlay = Overlay {
            attributes: base.subtree(prefix),
            computed: BTreeSet::new(),
        };

        for (key, attr) in self.attributes_under(prefix) {
            if attr.new_removed {
                overlay.attributes.remove_subtree(key);
            } else if attr.new_computed {
                let unknown = unknown_path(key);
                overlay.attributes.remove_subtree(unknown);
                overlay.computed.insert(unknown.to_string());
            } else if !overlay.computed.iter().any(|c| is_under(key, c)) {
                overlay.attributes.insert(key.clone(), attr.new.clone());
            }
        }

        overlay
    }

    /// Encode as `{"destroy": .., "attributes": {path: {..}}}`
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

/// A computed count marker makes the whole collection unknown
fn unknown_path(key: &str) -> &str {
    match key.rsplit_once(SEPARATOR) {
        Some((parent, COUNT_KEY)) => parent,
        _ => key,
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Attributes gaining a value
    pub additions: usize,
    /// Attributes being removed
    pub removals: usize,
    /// Attributes changing value
    pub modifications: usize,
    /// Attributes computed during apply
    pub computed: usize,
    /// Attributes forcing recreation
    pub requires_new: usize,
    pub destroy: bool,
}

impl DiffSummary {
    /// Create a summary from a diff
    pub fn from_diff(diff: &InstanceDiff) -> Self {
        let mut summary = Self {
            destroy: diff.destroy,
            ..Default::default()
        };
        for attr in diff.attributes.values() {
            if attr.new_removed {
                summary.removals += 1;
            } else if attr.new_computed {
                summary.computed += 1;
            } else if attr.old.is_empty() {
                summary.additions += 1;
            } else {
                summary.modifications += 1;
            }
            if attr.requires_new {
                summary.requires_new += 1;
            }
        }
        summary
    }

    /// Total number of attribute changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications + self.computed
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.destroy || self.total() > 0
    }
}

impl fmt::Display for DiffSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.destroy && self.total() == 0 {
            return write!(f, "destroy");
        }
        write!(
            f,
            "+{} ~{} -{} ?{}",
            self.additions, self.modifications, self.removals, self.computed
        )?;
        if self.requires_new > 0 {
            write!(f, " (forces replacement)")?;
        }
        Ok(())
    }
}
