//! Template environment
//!
//! A closed Jinja-style language over JSON values:
//! - `{{ expr }}` output, `{% if %}`/`{% for %}`/`{% set %}` blocks, `{# #}` comments
//! - `-` inside a delimiter trims the neighbouring whitespace
//! - filters come from a [`FilterRegistry`]; no autoescape
//!
//! Parsed templates are cached per name and shared via `Arc`.

mod eval;
mod lexer;
mod parser;
mod source;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;
use tracing::debug;

use crate::error::TemplateError;
use crate::filters::FilterRegistry;

pub use source::{TemplateSource, VirtualSource};

/// Namespace prefix under which check templates resolve
pub const CHECKS_PREFIX: &str = "checks/";

/// A parsed template
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    nodes: Vec<parser::Node>,
}

impl Template {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Render against a context (usually `{config, data}`)
    pub fn render(&self, filters: &FilterRegistry, ctx: &Value) -> Result<String, TemplateError> {
        eval::Renderer::new(filters, ctx)
            .render(&self.nodes)
            .map_err(|kind| TemplateError::new(&self.name, kind))
    }
}

/// Parse `source` as template `name`
pub fn parse_template(name: &str, source: &str) -> Result<Template, TemplateError> {
    let nodes = parser::parse(source).map_err(|kind| TemplateError::new(name, kind))?;
    Ok(Template {
        name: name.to_string(),
        nodes,
    })
}

/// Named templates plus the filters they may use
pub struct Environment {
    source: Box<dyn TemplateSource>,
    filters: FilterRegistry,
    cache: DashMap<String, Arc<Template>>,
}

impl std::fmt::Debug for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Environment")
            .field("filters", &self.filters)
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl Environment {
    pub fn new(source: impl TemplateSource + 'static, filters: FilterRegistry) -> Self {
        Self {
            source: Box::new(source),
            filters,
            cache: DashMap::new(),
        }
    }

    pub fn filters(&self) -> &FilterRegistry {
        &self.filters
    }

    pub fn contains(&self, name: &str) -> bool {
        self.cache.contains_key(name) || self.source.resolve(name).is_some()
    }

    /// Resolve and parse a template (with caching)
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>, TemplateError> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Arc::clone(&cached));
        }

        let text = self
            .source
            .resolve(name)
            .ok_or_else(|| TemplateError::not_found(name))?;
        let template = Arc::new(parse_template(name, &text)?);
        self.cache.insert(name.to_string(), Arc::clone(&template));
        Ok(template)
    }

    /// Render a named template and trim surrounding whitespace
    pub fn evaluate(&self, name: &str, ctx: &Value) -> Result<String, TemplateError> {
        let template = self.get_template(name)?;
        Ok(template.render(&self.filters, ctx)?.trim().to_string())
    }

    /// Like [`evaluate`](Self::evaluate), recovering any failure with `fallback`
    pub fn evaluate_or(&self, name: &str, ctx: &Value, fallback: &str) -> String {
        match self.evaluate(name, ctx) {
            Ok(text) => text,
            Err(e) => {
                if !e.is_not_found() {
                    debug!(template = name, error = %e, "template failed, using fallback");
                }
                fallback.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateErrorKind;
    use crate::filters::FilterBundle;
    use serde_json::json;
    use std::collections::HashMap;

    fn env(templates: &[(&str, &str)]) -> Environment {
        let source: HashMap<String, String> = templates
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::new(source, FilterRegistry::with_bundles(&[FilterBundle::Json]))
    }

    #[test]
    fn evaluate_trims_output() {
        let env = env(&[("t", "\n  hello {{ data.name }}  \n")]);
        assert_eq!(env.evaluate("t", &json!({"data": {"name": "x"}})).unwrap(), "hello x");
    }

    #[test]
    fn missing_template_is_not_found() {
        let env = env(&[]);
        let err = env.evaluate("nope", &json!({})).unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(env.evaluate_or("nope", &json!({}), "#"), "#");
        assert!(!env.contains("nope"));
    }

    #[test]
    fn errors_carry_template_name() {
        let env = env(&[("broken", "{{ 1 / 0 }}"), ("syntax", "{% if %}")]);
        let err = env.evaluate("broken", &json!({})).unwrap_err();
        assert_eq!(err.name, "broken");
        assert!(matches!(err.kind, TemplateErrorKind::Eval { .. }));
        assert!(err.to_string().starts_with("URLF-042"));

        let err = env.evaluate("syntax", &json!({})).unwrap_err();
        assert!(matches!(err.kind, TemplateErrorKind::Syntax { .. }));
        assert_eq!(env.evaluate_or("syntax", &json!({}), "fallback"), "fallback");
    }

    #[test]
    fn parsed_templates_are_shared() {
        let env = env(&[("t", "x")]);
        let first = env.get_template("t").unwrap();
        let second = env.get_template("t").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }
}
