//! # Flatmap
//!
//! Flat, string-keyed attribute maps for nested values.
//!
//! Lists, sets and maps are stored as dotted paths, with the number of
//! elements kept under a `#` count marker:
//!
//! ```text
//! tags.#     = 2
//! tags.Name  = web
//! tags.Owner = ops
//! ports.#    = 1
//! ports.0    = 443
//! ```
//!
//! Set elements have no position, so they are stored under a key derived
//! from their content (see [`set_key`]). The same element always lands
//! under the same path regardless of where it sat in the caller's
//! collection.
//!
//! ## Example
//!
//! ```
//! use flatmap::FlatMap;
//!
//! let mut attrs = FlatMap::new();
//! attrs.insert("tags.#", "1");
//! attrs.insert("tags.Name", "web");
//! attrs.insert("tagsx", "unrelated");
//!
//! assert_eq!(attrs.subtree("tags").len(), 2);
//! assert_eq!(attrs.count("tags")?, Some(1));
//! # Ok::<(), flatmap::Error>(())
//! ```

mod error;
pub mod path;

pub use error::{Error, Result};
pub use path::{COUNT_KEY, SEPARATOR, count_path, is_under, join, root, split_first, strip};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;

/// Number of hex digits kept from the BLAKE3 digest for a set key
pub const SET_KEY_LEN: usize = 16;

/// Derive the storage key of a set element from its canonical form.
///
/// The key is the first [`SET_KEY_LEN`] hex digits of the BLAKE3 hash of
/// `canonical`. It is persisted, so it must never change for a given
/// input.
pub fn set_key(canonical: &str) -> String {
    let hash = blake3::hash(canonical.as_bytes());
    hash.to_hex()[..SET_KEY_LEN].to_string()
}

/// A flat attribute map, sorted by path
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FlatMap(BTreeMap<String, String>);

impl FlatMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Iterate over entries at `prefix` or below it
    pub fn entries_under<'a>(
        &'a self,
        prefix: &'a str,
    ) -> impl Iterator<Item = (&'a String, &'a String)> + 'a {
        self.0
            .range::<str, _>((Bound::Included(prefix), Bound::Unbounded))
            .take_while(move |(k, _)| k.starts_with(prefix))
            .filter(move |(k, _)| path::is_under(k, prefix))
    }

    /// Copy of the entries at `prefix` or below it
    pub fn subtree(&self, prefix: &str) -> FlatMap {
        self.entries_under(prefix)
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Whether anything is stored at `prefix` or below it
    pub fn has_subtree(&self, prefix: &str) -> bool {
        self.entries_under(prefix).next().is_some()
    }

    /// Remove every entry at `prefix` or below it, returning how many were removed
    pub fn remove_subtree(&mut self, prefix: &str) -> usize {
        let doomed: Vec<String> = self.entries_under(prefix).map(|(k, _)| k.clone()).collect();
        for key in &doomed {
            self.0.remove(key);
        }
        doomed.len()
    }

    /// Distinct first segments directly below `prefix`, count marker excluded
    pub fn child_keys(&self, prefix: &str) -> BTreeSet<String> {
        self.entries_under(prefix)
            .filter_map(|(k, _)| path::strip(k, prefix))
            .map(path::root)
            .filter(|first| *first != COUNT_KEY)
            .map(str::to_string)
            .collect()
    }

    /// Read the count marker of the collection at `prefix`
    pub fn count(&self, prefix: &str) -> Result<Option<usize>> {
        let marker = count_path(prefix);
        match self.0.get(&marker) {
            None => Ok(None),
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| Error::InvalidCount {
                    path: marker,
                    value: raw.clone(),
                }),
        }
    }

    pub fn into_inner(self) -> BTreeMap<String, String> {
        self.0
    }
}

impl Extend<(String, String)> for FlatMap {
    fn extend<I: IntoIterator<Item = (String, String)>>(&mut self, iter: I) {
        self.0.extend(iter);
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FlatMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl IntoIterator for FlatMap {
    type Item = (String, String);
    type IntoIter = std::collections::btree_map::IntoIter<String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a> IntoIterator for &'a FlatMap {
    type Item = (&'a String, &'a String);
    type IntoIter = std::collections::btree_map::Iter<'a, String, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl From<BTreeMap<String, String>> for FlatMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
