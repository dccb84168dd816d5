//! Filter registry: name → pure transform usable inside template evaluation
//!
//! Always-on built-ins (`prune`, `base64`, `from_entries`, ...) plus opt-in bundles
//! enabled per config (`json`, `toml`, `yaml`, `zip`). Bundles are built once per
//! process; registering them again into another registry is a no-op per name.

mod archive;
mod formats;
pub mod prune;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{FilterError, UrlformsError};

pub use formats::uri_escape;
pub use prune::prune;

/// A pure filter: input value plus call arguments → output value, or a reason.
pub type FilterFn = fn(&Value, &FilterArgs) -> Result<Value, String>;

/// Positional and keyword arguments of one filter call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
    pub positional: Vec<Value>,
    pub kwargs: Map<String, Value>,
}

impl FilterArgs {
    pub fn with_arg(mut self, value: Value) -> Self {
        self.positional.push(value);
        self
    }

    pub fn with_kwarg(mut self, name: impl Into<String>, value: Value) -> Self {
        self.kwargs.insert(name.into(), value);
        self
    }

    /// Keyword argument `name`, else the positional argument at `index`.
    pub fn get(&self, index: usize, name: &str) -> Option<&Value> {
        self.kwargs.get(name).or_else(|| self.positional.get(index))
    }
}

/// Opt-in filter bundles, named in the config's `filters` list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterBundle {
    Json,
    Toml,
    Yaml,
    Zip,
}

impl FilterBundle {
    pub const ALL: [FilterBundle; 4] = [
        FilterBundle::Json,
        FilterBundle::Toml,
        FilterBundle::Yaml,
        FilterBundle::Zip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FilterBundle::Json => "json",
            FilterBundle::Toml => "toml",
            FilterBundle::Yaml => "yaml",
            FilterBundle::Zip => "zip",
        }
    }

    /// The bundle's filters, built once per process on first use.
    pub fn filters(&self) -> &'static [(&'static str, FilterFn)] {
        match self {
            FilterBundle::Json => &JSON_BUNDLE,
            FilterBundle::Toml => &TOML_BUNDLE,
            FilterBundle::Yaml => &YAML_BUNDLE,
            FilterBundle::Zip => &ZIP_BUNDLE,
        }
    }
}

impl fmt::Display for FilterBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FilterBundle {
    type Err = UrlformsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        FilterBundle::ALL
            .into_iter()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| UrlformsError::UnknownFilterBundle { name: s.to_string() })
    }
}

static BUILTINS: Lazy<Vec<(&'static str, FilterFn)>> = Lazy::new(builtin_filters);
static JSON_BUNDLE: Lazy<Vec<(&'static str, FilterFn)>> = Lazy::new(formats::json_filters);
static TOML_BUNDLE: Lazy<Vec<(&'static str, FilterFn)>> = Lazy::new(formats::toml_filters);
static YAML_BUNDLE: Lazy<Vec<(&'static str, FilterFn)>> = Lazy::new(formats::yaml_filters);
static ZIP_BUNDLE: Lazy<Vec<(&'static str, FilterFn)>> = Lazy::new(archive::zip_filters);

/// Filters available to one template environment
#[derive(Clone, Default)]
pub struct FilterRegistry {
    filters: HashMap<String, FilterFn>,
}

impl fmt::Debug for FilterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("FilterRegistry").field("filters", &names).finish()
    }
}

impl FilterRegistry {
    /// An empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Built-ins plus the given bundles
    pub fn with_bundles(bundles: &[FilterBundle]) -> Self {
        let mut registry = Self::new();
        registry.register_all(&BUILTINS);
        for bundle in bundles {
            registry.register_bundle(*bundle);
        }
        registry
    }

    /// Add a filter. Returns `false` (and keeps the existing one) if the name is taken.
    pub fn register(&mut self, name: impl Into<String>, filter: FilterFn) -> bool {
        let name = name.into();
        if self.filters.contains_key(&name) {
            debug!(filter = %name, "filter already registered");
            return false;
        }
        self.filters.insert(name, filter);
        true
    }

    pub fn register_bundle(&mut self, bundle: FilterBundle) {
        self.register_all(bundle.filters());
    }

    fn register_all(&mut self, filters: &[(&'static str, FilterFn)]) {
        for (name, filter) in filters {
            self.register(*name, *filter);
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.filters.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }

    /// Run filter `name`. Unknown names and filter failures are both [`FilterError`]s.
    pub fn apply(&self, name: &str, value: &Value, args: &FilterArgs) -> Result<Value, FilterError> {
        let filter = self
            .filters
            .get(name)
            .ok_or_else(|| FilterError::new(name, "unknown filter (is its bundle enabled?)"))?;
        filter(value, args).map_err(|details| FilterError::new(name, details))
    }
}

// ═══════════════════════════════════════════════════════════════
// Built-ins
// ═══════════════════════════════════════════════════════════════

fn builtin_filters() -> Vec<(&'static str, FilterFn)> {
    vec![
        ("prune", prune_filter as FilterFn),
        ("base64", base64_filter),
        ("from_entries", from_entries),
        ("items", items),
        ("urlencode", urlencode),
        ("default", default),
        ("length", length),
        ("join", join),
        ("lower", lower),
        ("upper", upper),
        ("trim", trim),
    ]
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Text form of a value as it appears in rendered output
pub fn to_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn prune_filter(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    Ok(prune(value))
}

fn base64_filter(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    Ok(Value::String(STANDARD.encode(to_text(value))))
}

fn from_entries(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    let entries = value
        .as_array()
        .ok_or_else(|| format!("expected an array of [key, value] pairs, got {}", type_name(value)))?;
    let mut out = Map::new();
    for entry in entries {
        match entry.as_array().map(Vec::as_slice) {
            Some([Value::String(key), value]) => {
                out.insert(key.clone(), value.clone());
            }
            _ => return Err(format!("invalid entry {entry}")),
        }
    }
    Ok(Value::Object(out))
}

fn items(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    match value {
        Value::Null => Ok(Value::Array(vec![])),
        Value::Object(map) => Ok(Value::Array(
            map.iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        )),
        other => Err(format!("expected an object, got {}", type_name(other))),
    }
}

fn urlencode(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    let encoded = match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| format!("{}={}", uri_escape(k), uri_escape(&to_text(v))))
            .collect::<Vec<_>>()
            .join("&"),
        other => uri_escape(&to_text(other)),
    };
    Ok(Value::String(encoded))
}

pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn default(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    let fallback = args.get(0, "default_value").cloned().unwrap_or(Value::String(String::new()));
    let boolean = args.get(1, "boolean").is_some_and(is_truthy);
    let missing = value.is_null() || (boolean && !is_truthy(value));
    Ok(if missing { fallback } else { value.clone() })
}

fn length(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    let len = match value {
        Value::Null => 0,
        Value::String(s) => s.chars().count(),
        Value::Array(a) => a.len(),
        Value::Object(o) => o.len(),
        other => return Err(format!("{} has no length", type_name(other))),
    };
    Ok(Value::from(len))
}

fn join(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    let sep = args.get(0, "d").map(to_text).unwrap_or_default();
    let items = value
        .as_array()
        .ok_or_else(|| format!("expected an array, got {}", type_name(value)))?;
    Ok(Value::String(items.iter().map(to_text).collect::<Vec<_>>().join(&sep)))
}

fn map_str(value: &Value, f: impl Fn(&str) -> String) -> Result<Value, String> {
    match value {
        Value::Null => Ok(Value::String(String::new())),
        Value::String(s) => Ok(Value::String(f(s))),
        other => Ok(Value::String(f(&to_text(other)))),
    }
}

fn lower(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    map_str(value, str::to_lowercase)
}

fn upper(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    map_str(value, str::to_uppercase)
}

fn trim(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    map_str(value, |s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn shout(_: &Value, _: &FilterArgs) -> Result<Value, String> {
        Ok(json!("!"))
    }

    #[test]
    fn reregistration_is_a_noop() {
        let mut registry = FilterRegistry::with_bundles(&[]);
        assert!(!registry.register("prune", shout));
        let out = registry.apply("prune", &json!({}), &FilterArgs::default()).unwrap();
        assert_eq!(out, Value::Null);

        assert!(registry.register("shout", shout));
        assert!(!registry.register("shout", prune_filter));
        assert_eq!(registry.apply("shout", &json!(1), &FilterArgs::default()).unwrap(), json!("!"));
    }

    #[test]
    fn bundles_register_idempotently() {
        let mut registry = FilterRegistry::with_bundles(&[FilterBundle::Json]);
        let before = registry.names().len();
        registry.register_bundle(FilterBundle::Json);
        assert_eq!(registry.names().len(), before);
        assert!(registry.contains("to_json"));
        assert!(!registry.contains("to_yaml"));
    }

    #[test]
    fn bundle_cache_is_shared() {
        let a = FilterBundle::Yaml.filters();
        let b = FilterBundle::Yaml.filters();
        assert!(std::ptr::eq(a, b));
    }

    #[test]
    fn unknown_filter_is_an_error() {
        let registry = FilterRegistry::with_bundles(&[]);
        let err = registry.apply("to_toml", &json!({}), &FilterArgs::default()).unwrap_err();
        assert_eq!(err.filter, "to_toml");
    }

    #[test]
    fn bundle_names_parse() {
        assert_eq!("yaml".parse::<FilterBundle>().unwrap(), FilterBundle::Yaml);
        assert!(matches!(
            "xml".parse::<FilterBundle>(),
            Err(UrlformsError::UnknownFilterBundle { .. })
        ));
    }

    #[test]
    fn base64_encodes_text() {
        assert_eq!(base64_filter(&json!("hi"), &FilterArgs::default()).unwrap(), json!("aGk="));
    }

    #[test]
    fn from_entries_builds_objects() {
        let out = from_entries(&json!([["a", 1], ["b", [2]]]), &FilterArgs::default()).unwrap();
        assert_eq!(out, json!({"a": 1, "b": [2]}));
        assert!(from_entries(&json!([["a"]]), &FilterArgs::default()).is_err());
    }

    #[test]
    fn urlencode_objects_as_query() {
        let out = urlencode(&json!({"q": "a b", "n": 1}), &FilterArgs::default()).unwrap();
        assert_eq!(out, json!("q=a%20b&n=1"));
    }

    #[test]
    fn default_replaces_null() {
        let args = FilterArgs::default().with_arg(json!("x"));
        assert_eq!(default(&Value::Null, &args).unwrap(), json!("x"));
        assert_eq!(default(&json!(""), &args).unwrap(), json!(""));
        let boolean = args.with_arg(json!(true));
        assert_eq!(default(&json!(""), &boolean).unwrap(), json!("x"));
    }

    #[test]
    fn join_and_length() {
        let args = FilterArgs::default().with_arg(json!(", "));
        assert_eq!(join(&json!(["a", 1]), &args).unwrap(), json!("a, 1"));
        assert_eq!(length(&json!({"a": 1}), &FilterArgs::default()).unwrap(), json!(1));
    }
}
