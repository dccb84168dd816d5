//! Error types with fix suggestions
//!
//! Error code ranges:
//! - URLF-000-009: Config errors (fatal, abort instance construction)
//! - URLF-010-019: Document loading errors
//! - URLF-020-029: Instance errors
//! - URLF-030-039: Output errors
//! - URLF-040-049: Template errors (recovered by the caller's fallback)
//! - URLF-050-059: Filter errors

use thiserror::Error;

pub type Result<T, E = UrlformsError> = std::result::Result<T, E>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

#[derive(Error, Debug)]
pub enum UrlformsError {
    // ─────────────────────────────────────────────────────────────
    // Config errors (URLF-000 to URLF-009)
    // ─────────────────────────────────────────────────────────────
    #[error("URLF-001: Cannot parse {format} config: {details}")]
    ConfigParse { format: String, details: String },

    #[error("URLF-002: Invalid config: {reason}")]
    ConfigInvalid { reason: String },

    #[error("URLF-003: Check label '{label}' collides with reserved template name '{reserved}'")]
    ReservedName { label: String, reserved: String },

    #[error("URLF-004: Unknown filter bundle '{name}'")]
    UnknownFilterBundle { name: String },

    #[error("URLF-005: IO error: {0}")]
    Io(#[from] std::io::Error),

    // ─────────────────────────────────────────────────────────────
    // Document loading errors (URLF-010 to URLF-019)
    // ─────────────────────────────────────────────────────────────
    #[error("URLF-010: Cannot fetch '{location}': {details}")]
    Fetch { location: String, details: String },

    #[error("URLF-011: Cannot parse document '{location}': {details}")]
    DocumentParse { location: String, details: String },

    #[error("URLF-012: Schema for form '{key}' does not compile: {details}")]
    SchemaCompile { key: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Instance errors (URLF-020 to URLF-029)
    // ─────────────────────────────────────────────────────────────
    #[error("URLF-020: Form '{key}' is not declared in this instance")]
    UnknownForm { key: String },

    // ─────────────────────────────────────────────────────────────
    // Output errors (URLF-030 to URLF-039)
    // ─────────────────────────────────────────────────────────────
    #[error("URLF-030: Cannot write output as {format}: {details}")]
    Output { format: String, details: String },

    // ─────────────────────────────────────────────────────────────
    // Template errors (URLF-040 to URLF-049)
    // ─────────────────────────────────────────────────────────────
    #[error(transparent)]
    Template(#[from] TemplateError),
}

impl FixSuggestion for UrlformsError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            UrlformsError::ConfigParse { .. } => {
                Some("Check the config syntax; the format is chosen from the file extension")
            }
            UrlformsError::ConfigInvalid { .. } => {
                Some("Check form keys ([A-Za-z_][A-Za-z0-9_-]*), template names and document locations")
            }
            UrlformsError::ReservedName { .. } => {
                Some("Rename the check: url, submit_button, download_filename, submit_target, above_* and below_* are reserved")
            }
            UrlformsError::UnknownFilterBundle { .. } => Some("Known filter bundles: json, toml, yaml, zip"),
            UrlformsError::Io(_) => Some("Check file path and permissions"),
            UrlformsError::Fetch { .. } => Some("Check the location is reachable (path relative to the config, or http(s) URL)"),
            UrlformsError::DocumentParse { .. } => {
                Some("Documents are parsed by extension: .json, .toml, .yaml or .yml")
            }
            UrlformsError::SchemaCompile { .. } => Some("Fix the form schema so it is a valid JSON Schema"),
            UrlformsError::UnknownForm { .. } => Some("Use one of the keys declared under 'forms'"),
            UrlformsError::Output { .. } => Some("Try another output format (--format json or --format yaml)"),
            UrlformsError::Template(e) => e.fix_suggestion(),
        }
    }
}

/// A failed template resolution or evaluation, carrying the template name.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("URLF-04{}: Template '{name}': {kind}", .kind.code())]
pub struct TemplateError {
    pub name: String,
    pub kind: TemplateErrorKind,
}

impl TemplateError {
    pub fn new(name: impl Into<String>, kind: TemplateErrorKind) -> Self {
        Self {
            name: name.into(),
            kind,
        }
    }

    pub fn not_found(name: impl Into<String>) -> Self {
        Self::new(name, TemplateErrorKind::NotFound)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind, TemplateErrorKind::NotFound)
    }
}

impl FixSuggestion for TemplateError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self.kind {
            TemplateErrorKind::NotFound => Some("Declare the template under 'templates' (or the check under 'checks')"),
            TemplateErrorKind::Syntax { .. } => Some("Check delimiters: {{ expr }}, {% tag %}, {# comment #}"),
            TemplateErrorKind::Eval { .. } => Some("Check the expression against the context shape {config, data}"),
            TemplateErrorKind::Filter(_) => Some("Enable the filter bundle under 'filters' and check its input"),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateErrorKind {
    #[error("not found")]
    NotFound,

    #[error("syntax error at position {position}: {details}")]
    Syntax { position: usize, details: String },

    #[error("evaluation failed: {details}")]
    Eval { details: String },

    #[error(transparent)]
    Filter(#[from] FilterError),
}

impl TemplateErrorKind {
    fn code(&self) -> u8 {
        match self {
            TemplateErrorKind::NotFound => 0,
            TemplateErrorKind::Syntax { .. } => 1,
            TemplateErrorKind::Eval { .. } => 2,
            TemplateErrorKind::Filter(_) => 3,
        }
    }

    pub fn syntax(position: usize, details: impl Into<String>) -> Self {
        TemplateErrorKind::Syntax {
            position,
            details: details.into(),
        }
    }

    pub fn eval(details: impl Into<String>) -> Self {
        TemplateErrorKind::Eval {
            details: details.into(),
        }
    }
}

/// A filter rejected its input. Surfaces as [`TemplateErrorKind::Filter`].
#[derive(Error, Debug, Clone, PartialEq)]
#[error("URLF-050: filter '{filter}' failed: {details}")]
pub struct FilterError {
    pub filter: String,
    pub details: String,
}

impl FilterError {
    pub fn new(filter: impl Into<String>, details: impl ToString) -> Self {
        Self {
            filter: filter.into(),
            details: details.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_error_display_carries_name_and_code() {
        let err = TemplateError::not_found("url");
        assert_eq!(err.to_string(), "URLF-040: Template 'url': not found");
        assert!(err.is_not_found());
    }

    #[test]
    fn filter_error_surfaces_as_template_error() {
        let err = TemplateError::new(
            "checks/valid",
            FilterError::new("from_json", "expected value").into(),
        );
        assert!(err.to_string().starts_with("URLF-043"));
        assert!(err.to_string().contains("from_json"));
    }

    #[test]
    fn output_error_is_not_an_io_error() {
        let err = UrlformsError::Output {
            format: "yaml".into(),
            details: "unsupported value".into(),
        };
        assert_eq!(err.to_string(), "URLF-030: Cannot write output as yaml: unsupported value");
        assert!(!err.fix_suggestion().unwrap().contains("permissions"));
    }

    #[test]
    fn every_variant_has_a_fix() {
        let errs = vec![
            UrlformsError::ConfigInvalid { reason: "x".into() },
            UrlformsError::UnknownForm { key: "x".into() },
            UrlformsError::Output {
                format: "yaml".into(),
                details: "x".into(),
            },
            UrlformsError::Template(TemplateError::not_found("url")),
        ];
        for e in errs {
            assert!(e.fix_suggestion().is_some(), "{e}");
        }
    }
}
