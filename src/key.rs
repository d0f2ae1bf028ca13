//! Cache key construction
//!
//! Derives a stable string identity for a parameterized resource read.
//! Two reads of the same resource with the same parameters must map to the
//! same key regardless of the order the parameters were supplied in, which
//! is what makes deduplication and exact-key invalidation work.

use std::collections::BTreeMap;
use std::fmt;

/// An ordered parameter mapping for one resource read
///
/// Parameters are kept in a `BTreeMap` so iteration order (and therefore
/// the derived cache key) never depends on insertion order. Values are
/// stored as strings; callers pass anything that implements `ToString`
/// (ids, page numbers, dates).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(BTreeMap<String, String>);

impl Params {
    /// Creates an empty parameter mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a parameter, builder-style
    ///
    /// # Arguments
    /// * `name` - Parameter name (e.g. "page")
    /// * `value` - Parameter value; converted with `ToString`
    pub fn with(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(name.into(), value.to_string());
        self
    }

    /// Adds a parameter in place
    pub fn insert(&mut self, name: impl Into<String>, value: impl ToString) {
        self.0.insert(name.into(), value.to_string());
    }

    /// Returns true if no parameters are set
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Returns the number of parameters
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Iterates parameters in canonical (name-sorted) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, "&")?;
            }
            write!(f, "{}={}", Escaped(name), Escaped(value))?;
        }
        Ok(())
    }
}

/// Percent-escapes the key separator characters in a name or value
///
/// Without this, a value containing `&` or `=` would produce the same key
/// as a differently-shaped parameter mapping.
struct Escaped<'a>(&'a str);

impl fmt::Display for Escaped<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ch in self.0.chars() {
            match ch {
                '%' => write!(f, "%25")?,
                '&' => write!(f, "%26")?,
                '=' => write!(f, "%3D")?,
                _ => write!(f, "{}", ch)?,
            }
        }
        Ok(())
    }
}

/// Builds the cache key for a resource read
///
/// An empty parameter set yields the bare resource name; otherwise the key
/// is `resource?a=1&b=2` with parameters sorted by name.
///
/// Resource names are also the unit of pattern invalidation
/// (`DataCache::invalidate_pattern`), so they must be chosen so that no
/// resource name is a substring of an unrelated one.
pub fn cache_key(resource: &str, params: &Params) -> String {
    if params.is_empty() {
        resource.to_string()
    } else {
        format!("{}?{}", resource, params)
    }
}
