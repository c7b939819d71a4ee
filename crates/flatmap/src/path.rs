//! Dotted attribute paths

/// Segment holding the element count of a list, set or map
pub const COUNT_KEY: &str = "#";

/// Separator between path segments
pub const SEPARATOR: char = '.';

/// Join a child key onto a prefix (`tags` + `Name` -> `tags.Name`)
pub fn join(prefix: &str, key: &str) -> String {
    if prefix.is_empty() {
        key.to_string()
    } else {
        format!("{prefix}{SEPARATOR}{key}")
    }
}

/// Path of the count marker for a collection at `prefix`
pub fn count_path(prefix: &str) -> String {
    join(prefix, COUNT_KEY)
}

/// Whether `key` is `prefix` itself or lies below it.
///
/// `tags.Name` is under `tags`, `tagsx` is not. Every key is under the
/// empty prefix.
pub fn is_under(key: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match key.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with(SEPARATOR),
        None => false,
    }
}

/// The remainder of `key` below `prefix`, without the leading separator.
///
/// Returns `None` when `key` is not strictly below `prefix`.
pub fn strip<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    if prefix.is_empty() {
        return (!key.is_empty()).then_some(key);
    }
    key.strip_prefix(prefix)?.strip_prefix(SEPARATOR)
}

/// Split off the first segment of a path
pub fn split_first(path: &str) -> (&str, Option<&str>) {
    match path.split_once(SEPARATOR) {
        Some((head, rest)) => (head, Some(rest)),
        None => (path, None),
    }
}

/// The top-level field a path belongs to
pub fn root(path: &str) -> &str {
    split_first(path).0
}
