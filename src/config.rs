//! Config document: forms, templates, checks, filter bundles and presentation
//!
//! Loaded from JSON, TOML or YAML (chosen by file extension) and validated once.
//! A loaded [`Config`] is immutable for the lifetime of the page instance.

use std::fmt;
use std::path::Path;

use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, UrlformsError};
use crate::filters::FilterBundle;
use crate::template::{parse_template, CHECKS_PREFIX};

/// Template names with a fixed meaning for the orchestrator
pub const URL_TEMPLATE: &str = "url";
pub const SUBMIT_BUTTON_TEMPLATE: &str = "submit_button";
pub const DOWNLOAD_FILENAME_TEMPLATE: &str = "download_filename";
pub const SUBMIT_TARGET_TEMPLATE: &str = "submit_target";
pub const RESERVED_TEMPLATES: [&str; 4] = [
    URL_TEMPLATE,
    SUBMIT_BUTTON_TEMPLATE,
    DOWNLOAD_FILENAME_TEMPLATE,
    SUBMIT_TARGET_TEMPLATE,
];
pub const ABOVE_PREFIX: &str = "above_";
pub const BELOW_PREFIX: &str = "below_";

pub const DEFAULT_THEME: &str = "bootstrap";
pub const DEFAULT_IFRAME_STYLE: &str = "width: 100%; height: 80vh;";

static FORM_KEY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_-]*$").expect("valid form key regex"));

/// Serialization format of a config or data document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentFormat {
    Json,
    Toml,
    Yaml,
}

impl DocumentFormat {
    /// Pick the format from a path's extension
    pub fn from_path(path: &str) -> Option<Self> {
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(DocumentFormat::Json),
            "toml" => Some(DocumentFormat::Toml),
            "yaml" | "yml" => Some(DocumentFormat::Yaml),
            _ => None,
        }
    }

    /// Parse `text` into any deserializable type
    pub fn parse<T: serde::de::DeserializeOwned>(&self, text: &str) -> std::result::Result<T, String> {
        match self {
            DocumentFormat::Json => serde_json::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Toml => toml::from_str(text).map_err(|e| e.to_string()),
            DocumentFormat::Yaml => serde_yaml::from_str(text).map_err(|e| e.to_string()),
        }
    }
}

impl fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocumentFormat::Json => "JSON",
            DocumentFormat::Toml => "TOML",
            DocumentFormat::Yaml => "YAML",
        })
    }
}

/// A template declared as one string or a non-empty list of lines
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TemplateText {
    Single(String),
    Lines(Vec<String>),
}

impl TemplateText {
    /// Source text: lists are joined with one newline
    pub fn source(&self) -> String {
        match self {
            TemplateText::Single(text) => text.clone(),
            TemplateText::Lines(lines) => lines.join("\n"),
        }
    }
}

impl From<&str> for TemplateText {
    fn from(text: &str) -> Self {
        TemplateText::Single(text.to_string())
    }
}

/// An inline document, or a location (path or URL) to load it from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Source {
    Location(String),
    Inline(Value),
}

/// One declared form
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FormSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_schema: Option<Source>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub form_data: Option<Source>,
    /// Render-prop overrides, layered over the static defaults
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub props: Option<Map<String, Value>>,
    /// Explicit rank, ahead of the key tie-break
    #[serde(default, alias = "rank")]
    pub order: i64,
}

/// The full page-instance config
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub forms: IndexMap<String, FormSpec>,
    #[serde(default)]
    pub templates: IndexMap<String, TemplateText>,
    #[serde(default)]
    pub checks: IndexMap<String, TemplateText>,
    /// Enabled filter bundles (`json`, `toml`, `yaml`, `zip`)
    #[serde(default)]
    pub filters: Vec<String>,
    /// CSS rules scoped to the instance root: selector → property → value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<IndexMap<String, IndexMap<String, Value>>>,
    #[serde(default)]
    pub iframe: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iframe_style: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_prefix: Option<String>,
}

impl Config {
    /// Parse and validate a config document
    pub fn parse(text: &str, format: DocumentFormat) -> Result<Self> {
        let config: Config = format
            .parse(text)
            .map_err(|details| UrlformsError::ConfigParse {
                format: format.to_string(),
                details,
            })?;
        config.validate()?;
        debug!(forms = config.forms.len(), checks = config.checks.len(), "config loaded");
        Ok(config)
    }

    /// Read, parse and validate a config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let display = path.display().to_string();
        let format = DocumentFormat::from_path(&display).ok_or_else(|| UrlformsError::ConfigInvalid {
            reason: format!("cannot tell the format of '{display}' (use .json, .toml, .yaml or .yml)"),
        })?;
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text, format)
    }

    /// Load-time checks; anything failing here aborts instance construction
    pub fn validate(&self) -> Result<()> {
        for key in self.forms.keys() {
            if !FORM_KEY_RE.is_match(key) {
                return Err(UrlformsError::ConfigInvalid {
                    reason: format!("form key '{key}' must match [A-Za-z_][A-Za-z0-9_-]*"),
                });
            }
        }

        for (name, text) in &self.templates {
            if name.starts_with(CHECKS_PREFIX) {
                return Err(UrlformsError::ConfigInvalid {
                    reason: format!("template name '{name}' uses the reserved '{CHECKS_PREFIX}' prefix"),
                });
            }
            check_template_text(name, text)?;
        }

        for (label, text) in &self.checks {
            check_label(label)?;
            check_template_text(label, text)?;
        }

        self.filter_bundles()?;
        Ok(())
    }

    /// The enabled filter bundles, in declared order
    pub fn filter_bundles(&self) -> Result<Vec<FilterBundle>> {
        self.filters.iter().map(|name| name.parse()).collect()
    }

    /// Parse every declared template, reporting the first syntax error
    pub fn check_templates(&self) -> Result<()> {
        for (name, text) in &self.templates {
            parse_template(name, &text.source())?;
        }
        for (label, text) in &self.checks {
            parse_template(&format!("{CHECKS_PREFIX}{label}"), &text.source())?;
        }
        Ok(())
    }

    pub fn theme(&self) -> &str {
        self.theme.as_deref().unwrap_or(DEFAULT_THEME)
    }

    /// Forms render in an isolated frame when asked to, or when given a frame style
    pub fn is_isolated(&self) -> bool {
        self.iframe || self.iframe_style.is_some()
    }

    /// Config as it appears under `config` in every template context
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn check_template_text(name: &str, text: &TemplateText) -> Result<()> {
    if matches!(text, TemplateText::Lines(lines) if lines.is_empty()) {
        return Err(UrlformsError::ConfigInvalid {
            reason: format!("template '{name}' is an empty list"),
        });
    }
    Ok(())
}

/// Check labels share the template namespace (under a prefix), so they may not
/// shadow a name the orchestrator gives meaning to.
fn check_label(label: &str) -> Result<()> {
    if label.trim().is_empty() || label.contains('/') {
        return Err(UrlformsError::ConfigInvalid {
            reason: format!("check label '{label}' must be non-empty and must not contain '/'"),
        });
    }
    if let Some(reserved) = RESERVED_TEMPLATES.iter().find(|r| **r == label) {
        return Err(UrlformsError::ReservedName {
            label: label.to_string(),
            reserved: reserved.to_string(),
        });
    }
    for prefix in [ABOVE_PREFIX, BELOW_PREFIX] {
        if label.starts_with(prefix) {
            return Err(UrlformsError::ReservedName {
                label: label.to_string(),
                reserved: format!("{prefix}*"),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const YAML: &str = r#"
forms:
  main:
    schema:
      type: object
      required: [name]
      properties:
        name: {type: string}
    order: 1
  extra:
    schema: ./extra.schema.json
templates:
  url: "https://example.com/{{ data.main.name }}"
  submit_button:
    - "Create"
    - "**{{ data.main.name }}**"
checks:
  has name: "{% if not data.main.name %}missing name{% endif %}"
filters: [json, yaml]
"#;

    #[test]
    fn parses_yaml_config() {
        let config = Config::parse(YAML, DocumentFormat::Yaml).unwrap();
        assert_eq!(config.forms.len(), 2);
        assert_eq!(config.forms["main"].order, 1);
        assert_eq!(
            config.forms["extra"].schema,
            Some(Source::Location("./extra.schema.json".into()))
        );
        assert!(matches!(config.forms["main"].schema, Some(Source::Inline(_))));
        assert_eq!(
            config.templates["submit_button"].source(),
            "Create\n**{{ data.main.name }}**"
        );
        assert_eq!(
            config.filter_bundles().unwrap(),
            vec![FilterBundle::Json, FilterBundle::Yaml]
        );
        assert_eq!(config.theme(), "bootstrap");
        assert!(!config.is_isolated());
    }

    #[test]
    fn parses_toml_and_json_configs() {
        let toml = r#"
[forms.a]
rank = 2
[templates]
url = "https://x"
"#;
        let config = Config::parse(toml, DocumentFormat::Toml).unwrap();
        assert_eq!(config.forms["a"].order, 2);

        let json = r#"{"forms": {"a": {}}, "iframe_style": "height: 1em"}"#;
        let config = Config::parse(json, DocumentFormat::Json).unwrap();
        assert!(config.is_isolated());
    }

    #[test]
    fn rejects_reserved_check_labels() {
        let json = r#"{"forms": {}, "checks": {"url": "x"}}"#;
        let err = Config::parse(json, DocumentFormat::Json).unwrap_err();
        assert!(matches!(err, UrlformsError::ReservedName { ref reserved, .. } if reserved == "url"));

        let json = r#"{"forms": {}, "checks": {"above_main": "x"}}"#;
        assert!(matches!(
            Config::parse(json, DocumentFormat::Json),
            Err(UrlformsError::ReservedName { .. })
        ));
    }

    #[test]
    fn rejects_checks_prefix_in_templates() {
        let json = r#"{"forms": {}, "templates": {"checks/x": "y"}}"#;
        assert!(matches!(
            Config::parse(json, DocumentFormat::Json),
            Err(UrlformsError::ConfigInvalid { .. })
        ));
    }

    #[test]
    fn rejects_empty_template_lists_and_bad_keys() {
        let json = r#"{"forms": {}, "templates": {"url": []}}"#;
        assert!(Config::parse(json, DocumentFormat::Json).is_err());

        let json = r#"{"forms": {"has space": {}}}"#;
        assert!(Config::parse(json, DocumentFormat::Json).is_err());
    }

    #[test]
    fn rejects_unknown_filter_bundles() {
        let json = r#"{"forms": {}, "filters": ["xml"]}"#;
        assert!(matches!(
            Config::parse(json, DocumentFormat::Json),
            Err(UrlformsError::UnknownFilterBundle { .. })
        ));
    }

    #[test]
    fn malformed_config_is_a_parse_error() {
        let err = Config::parse("forms: [", DocumentFormat::Yaml).unwrap_err();
        assert!(matches!(err, UrlformsError::ConfigParse { .. }));
    }

    #[test]
    fn check_templates_reports_syntax_errors() {
        let json = r#"{"forms": {}, "checks": {"bad": "{% if %}"}}"#;
        let config = Config::parse(json, DocumentFormat::Json).unwrap();
        let err = config.check_templates().unwrap_err();
        assert!(err.to_string().contains("checks/bad"));
    }

    #[test]
    fn format_from_extension() {
        assert_eq!(DocumentFormat::from_path("a/b.YML"), Some(DocumentFormat::Yaml));
        assert_eq!(DocumentFormat::from_path("a.toml"), Some(DocumentFormat::Toml));
        assert_eq!(DocumentFormat::from_path("a.txt"), None);
    }
}
