//! Template sources: where a name resolves to template text

use std::collections::HashMap;

use super::CHECKS_PREFIX;
use crate::config::Config;

/// Resolves a template name to its source text
pub trait TemplateSource: Send + Sync {
    fn resolve(&self, name: &str) -> Option<String>;
}

/// In-memory source built from a config: named templates, plus checks under `checks/<label>`
#[derive(Debug, Clone, Default)]
pub struct VirtualSource {
    templates: HashMap<String, String>,
    checks: HashMap<String, String>,
}

impl VirtualSource {
    pub fn from_config(config: &Config) -> Self {
        Self {
            templates: config
                .templates
                .iter()
                .map(|(name, text)| (name.clone(), text.source()))
                .collect(),
            checks: config
                .checks
                .iter()
                .map(|(label, text)| (label.clone(), text.source()))
                .collect(),
        }
    }
}

impl TemplateSource for VirtualSource {
    fn resolve(&self, name: &str) -> Option<String> {
        match name.strip_prefix(CHECKS_PREFIX) {
            Some(label) => self.checks.get(label).cloned(),
            None => self.templates.get(name).cloned(),
        }
    }
}

impl TemplateSource for HashMap<String, String> {
    fn resolve(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}
