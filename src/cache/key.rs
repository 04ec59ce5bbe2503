//! Cache keys and key matchers.
//!
//! A [`CacheKey`] identifies one cached read: a resource name plus its
//! parameters. Parameters live in a `BTreeMap`, so two keys built with the
//! same parameters in a different order are equal and hash identically.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A single parameter value of a [`CacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Bool(bool),
    List(Vec<String>),
}

impl ParamValue {
    /// Render as query pairs under `name`. Lists repeat the name once per
    /// item, matching how the API expects multi-valued filters.
    fn push_pairs(&self, name: &str, out: &mut Vec<(String, String)>) {
        match self {
            ParamValue::Str(s) => out.push((name.to_string(), s.clone())),
            ParamValue::Int(i) => out.push((name.to_string(), i.to_string())),
            ParamValue::Bool(b) => out.push((name.to_string(), b.to_string())),
            ParamValue::List(items) => {
                out.extend(items.iter().map(|i| (name.to_string(), i.clone())));
            }
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Str(s) => write!(f, "{s}"),
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Bool(b) => write!(f, "{b}"),
            ParamValue::List(items) => write!(f, "[{}]", items.join(",")),
        }
    }
}

impl From<&str> for ParamValue {
    fn from(s: &str) -> Self {
        ParamValue::Str(s.to_string())
    }
}

impl From<String> for ParamValue {
    fn from(s: String) -> Self {
        ParamValue::Str(s)
    }
}

impl From<i64> for ParamValue {
    fn from(i: i64) -> Self {
        ParamValue::Int(i)
    }
}

impl From<u32> for ParamValue {
    fn from(i: u32) -> Self {
        ParamValue::Int(i64::from(i))
    }
}

impl From<bool> for ParamValue {
    fn from(b: bool) -> Self {
        ParamValue::Bool(b)
    }
}

impl From<Vec<String>> for ParamValue {
    fn from(items: Vec<String>) -> Self {
        ParamValue::List(items)
    }
}

/// Identity of a cached read: resource name + parameters.
///
/// ```rust
/// # use threatsync::CacheKey;
/// let a = CacheKey::new("incidents").param("page", 1u32).param("per_page", 10u32);
/// let b = CacheKey::new("incidents").param("per_page", 10u32).param("page", 1u32);
/// assert_eq!(a, b);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey {
    resource: String,
    params: BTreeMap<String, ParamValue>,
}

impl CacheKey {
    /// Key for a resource with no parameters.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            params: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Add a parameter only when `value` is `Some`.
    ///
    /// Absent parameters are omitted entirely, so a key built with
    /// `opt_param("search", None::<&str>)` equals one that never mentions
    /// `search`.
    pub fn opt_param<V: Into<ParamValue>>(self, name: impl Into<String>, value: Option<V>) -> Self {
        match value {
            Some(v) => self.param(name, v),
            None => self,
        }
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// First path segment of the resource: `incidents/<id>/status` belongs
    /// to `incidents`.
    pub fn family(&self) -> &str {
        self.resource
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.params.get(name)
    }

    pub fn params(&self) -> impl Iterator<Item = (&str, &ParamValue)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Parameters rendered as URL query pairs, in key order.
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.params.len());
        for (name, value) in &self.params {
            value.push_pairs(name, &mut pairs);
        }
        pairs
    }

    /// Whether this key's resource equals `prefix` or is nested below it
    /// (`sources` covers `sources` and `sources/{id}`, but not `sourcesX`).
    pub fn has_prefix(&self, prefix: &str) -> bool {
        let prefix = prefix.trim_end_matches('/');
        match self.resource.strip_prefix(prefix) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.resource)?;
        let mut sep = '?';
        for (name, value) in &self.params {
            write!(f, "{sep}{name}={value}")?;
            sep = '&';
        }
        Ok(())
    }
}

impl From<&str> for CacheKey {
    fn from(resource: &str) -> Self {
        CacheKey::new(resource)
    }
}

/// Selects the cache keys an invalidation applies to.
#[derive(Clone)]
pub enum KeyMatcher {
    /// Exactly this key.
    Exact(CacheKey),
    /// Every key whose resource equals the given name, any parameters.
    Resource(String),
    /// Every key at or below the given resource path.
    Prefix(String),
    /// Every key in the cache.
    All,
    /// Arbitrary predicate over keys.
    Predicate(Arc<dyn Fn(&CacheKey) -> bool + Send + Sync>),
}

impl KeyMatcher {
    pub fn exact(key: CacheKey) -> Self {
        KeyMatcher::Exact(key)
    }

    pub fn resource(name: impl Into<String>) -> Self {
        KeyMatcher::Resource(name.into())
    }

    pub fn prefix(prefix: impl Into<String>) -> Self {
        KeyMatcher::Prefix(prefix.into())
    }

    pub fn predicate(f: impl Fn(&CacheKey) -> bool + Send + Sync + 'static) -> Self {
        KeyMatcher::Predicate(Arc::new(f))
    }

    pub fn matches(&self, key: &CacheKey) -> bool {
        match self {
            KeyMatcher::Exact(k) => k == key,
            KeyMatcher::Resource(r) => key.resource() == r,
            KeyMatcher::Prefix(p) => key.has_prefix(p),
            KeyMatcher::All => true,
            KeyMatcher::Predicate(f) => f(key),
        }
    }
}

impl fmt::Debug for KeyMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMatcher::Exact(k) => f.debug_tuple("Exact").field(k).finish(),
            KeyMatcher::Resource(r) => f.debug_tuple("Resource").field(r).finish(),
            KeyMatcher::Prefix(p) => f.debug_tuple("Prefix").field(p).finish(),
            KeyMatcher::All => f.write_str("All"),
            KeyMatcher::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

/// A bare string matches by prefix, the common case for invalidation.
impl From<&str> for KeyMatcher {
    fn from(prefix: &str) -> Self {
        KeyMatcher::Prefix(prefix.to_string())
    }
}

impl From<CacheKey> for KeyMatcher {
    fn from(key: CacheKey) -> Self {
        KeyMatcher::Exact(key)
    }
}
