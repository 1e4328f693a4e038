//! Cache key generation for entity list queries

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Page size used when a screen does not ask for one
pub const DEFAULT_PAGE_SIZE: u32 = 20;

/// Key suffix shared by the simplified "all records" projection
const SIMPLE_LIST_KEY: &str = "all_simple";

/// A primitive filter value
///
/// Serialized canonically in keys: numbers as numbers, booleans as booleans
/// and text as a quoted JSON string, so `1`, `"1"` and `true` never collide.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    /// Canonical form used inside cache keys
    pub fn canonical(&self) -> String {
        match self {
            Self::Bool(b) => b.to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) => serde_json::Value::from(*f).to_string(),
            Self::Text(s) => serde_json::Value::String(s.clone()).to_string(),
        }
    }

    /// Raw form sent as a query parameter
    pub fn as_param(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            other => other.canonical(),
        }
    }

    /// Blank text is treated as "no filter"
    fn is_unset(&self) -> bool {
        matches!(self, Self::Text(s) if s.trim().is_empty())
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_param())
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<u32> for FilterValue {
    fn from(value: u32) -> Self {
        Self::Integer(value.into())
    }
}

impl From<f64> for FilterValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// Pagination and filters of a list request
///
/// Built once per request and not mutated afterwards; filters are kept in a
/// sorted map so insertion order never leaks into keys or parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    page: u32,
    page_size: u32,
    filters: BTreeMap<String, FilterValue>,
}

impl Default for QueryDescriptor {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: DEFAULT_PAGE_SIZE,
            filters: BTreeMap::new(),
        }
    }
}

impl QueryDescriptor {
    /// First page, default page size, no filters
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the 1-based page number (0 is treated as 1)
    pub fn with_page(mut self, page: u32) -> Self {
        self.page = page.max(1);
        self
    }

    /// Sets the page size (0 is treated as 1)
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Adds a filter; blank text values are dropped
    pub fn with_filter(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        let field = field.into();
        let value = value.into();

        if value.is_unset() {
            self.filters.remove(&field);
        } else {
            self.filters.insert(field, value);
        }

        self
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn filters(&self) -> &BTreeMap<String, FilterValue> {
        &self.filters
    }

    /// Only the unfiltered first page is ever cached
    pub fn is_cache_eligible(&self) -> bool {
        self.page == 1 && self.filters.is_empty()
    }

    /// Query parameters in the backend's naming
    pub fn to_params(&self) -> Vec<(String, String)> {
        let mut params = vec![
            ("page".to_string(), self.page.to_string()),
            ("page_size".to_string(), self.page_size.to_string()),
        ];

        for (field, value) in &self.filters {
            params.push((field.clone(), value.as_param()));
        }

        params
    }
}

/// Parameters for cache key generation
#[derive(Debug, Clone, Default)]
pub struct CacheKeyParams {
    /// Primary identifier (e.g. "list")
    pub primary: String,
    /// Secondary components (sorted for consistency)
    pub components: BTreeMap<String, String>,
}

impl CacheKeyParams {
    /// Creates new cache key parameters with a primary identifier
    pub fn new(primary: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            components: BTreeMap::new(),
        }
    }

    /// Adds a component to the key parameters
    pub fn with_component(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.components.insert(key.into(), value.into());
        self
    }
}

/// Derives deterministic keys of the form `namespace:primary:k=v:...`
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    pub fn new() -> Self {
        Self
    }

    /// Generates a key from parameters, without namespace
    pub fn generate(&self, params: &CacheKeyParams) -> String {
        let mut parts = vec![params.primary.clone()];

        for (k, v) in &params.components {
            parts.push(format!("{}={}", k, v));
        }

        parts.join(":")
    }

    /// Generates a key with a namespace prefix
    pub fn generate_with_namespace(&self, namespace: &str, params: &CacheKeyParams) -> String {
        format!("{}:{}", namespace, self.generate(params))
    }

    /// Key of a list query
    ///
    /// Filter names are quoted so a field called `page` can never shadow the
    /// pagination components.
    pub fn build_key(&self, namespace: &str, query: &QueryDescriptor) -> String {
        let mut params = CacheKeyParams::new("list")
            .with_component("page", query.page().to_string())
            .with_component("page_size", query.page_size().to_string());

        for (field, value) in query.filters() {
            params = params.with_component(
                serde_json::Value::String(field.clone()).to_string(),
                value.canonical(),
            );
        }

        self.generate_with_namespace(namespace, &params)
    }

    /// Key of the simplified projection used by selectors
    pub fn simple_key(&self, namespace: &str) -> String {
        self.generate_with_namespace(namespace, &CacheKeyParams::new(SIMPLE_LIST_KEY))
    }
}

/// Namespace part of a key (everything before the first `:`)
pub fn namespace_of(key: &str) -> &str {
    key.split_once(':').map_or(key, |(namespace, _)| namespace)
}
