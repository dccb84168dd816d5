//! Derived artifacts: one lazily recomputed cell per named template
//!
//! Every cell reads the same context and caches on the store revision, so a
//! batch of form changes re-renders each artifact at most once, and only if
//! someone asks for it.

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;

use crate::config::{
    Config, ABOVE_PREFIX, BELOW_PREFIX, DOWNLOAD_FILENAME_TEMPLATE, SUBMIT_BUTTON_TEMPLATE, SUBMIT_TARGET_TEMPLATE,
    URL_TEMPLATE,
};
use crate::reactive::{Derived, Revision};
use crate::template::{Environment, CHECKS_PREFIX};

/// Link target used when the url template is missing or fails
pub const URL_FALLBACK: &str = "#";

/// Outcome of one check template
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub label: String,
    /// Rendered reason (markdown); empty when passing
    pub text: String,
}

impl CheckResult {
    pub fn passing(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// URLs may be written over several lines; each line is trimmed and they are joined
pub fn collapse_url(rendered: &str) -> String {
    rendered.lines().map(str::trim).collect()
}

pub struct Artifacts {
    env: Environment,
    url: Derived<String>,
    submit_button: Derived<String>,
    download_filename: Derived<String>,
    submit_target: Derived<String>,
    above: IndexMap<String, Derived<String>>,
    below: IndexMap<String, Derived<String>>,
    checks: IndexMap<String, Derived<CheckResult>>,
}

impl Artifacts {
    pub fn new(config: &Config, env: Environment) -> Self {
        let decorations = |prefix: &str| -> IndexMap<String, Derived<String>> {
            config
                .forms
                .keys()
                .filter(|key| config.templates.contains_key(&format!("{prefix}{key}")))
                .map(|key| (key.clone(), Derived::new()))
                .collect()
        };

        Self {
            env,
            url: Derived::new(),
            submit_button: Derived::new(),
            download_filename: Derived::new(),
            submit_target: Derived::new(),
            above: decorations(ABOVE_PREFIX),
            below: decorations(BELOW_PREFIX),
            checks: config.checks.keys().map(|label| (label.clone(), Derived::new())).collect(),
        }
    }

    pub fn env(&self) -> &Environment {
        &self.env
    }

    pub fn url(&self, revision: Revision, ctx: &Value) -> String {
        self.url.get_or_compute(revision, || {
            let url = collapse_url(&self.env.evaluate_or(URL_TEMPLATE, ctx, URL_FALLBACK));
            if url.is_empty() {
                URL_FALLBACK.to_string()
            } else {
                url
            }
        })
    }

    /// Rendered submit label; empty when the template is missing or renders nothing
    pub fn submit_button(&self, revision: Revision, ctx: &Value) -> String {
        self.submit_button
            .get_or_compute(revision, || self.env.evaluate_or(SUBMIT_BUTTON_TEMPLATE, ctx, ""))
    }

    pub fn download_filename(&self, revision: Revision, ctx: &Value) -> String {
        self.download_filename
            .get_or_compute(revision, || self.env.evaluate_or(DOWNLOAD_FILENAME_TEMPLATE, ctx, ""))
    }

    pub fn submit_target(&self, revision: Revision, ctx: &Value) -> String {
        self.submit_target
            .get_or_compute(revision, || self.env.evaluate_or(SUBMIT_TARGET_TEMPLATE, ctx, ""))
    }

    /// Markdown shown above a form, if an `above_<key>` template exists
    pub fn above(&self, key: &str, revision: Revision, ctx: &Value) -> Option<String> {
        self.decoration(&self.above, ABOVE_PREFIX, key, revision, ctx)
    }

    /// Markdown shown below a form, if a `below_<key>` template exists
    pub fn below(&self, key: &str, revision: Revision, ctx: &Value) -> Option<String> {
        self.decoration(&self.below, BELOW_PREFIX, key, revision, ctx)
    }

    fn decoration(
        &self,
        cells: &IndexMap<String, Derived<String>>,
        prefix: &str,
        key: &str,
        revision: Revision,
        ctx: &Value,
    ) -> Option<String> {
        let cell = cells.get(key)?;
        let text = cell.get_or_compute(revision, || self.env.evaluate_or(&format!("{prefix}{key}"), ctx, ""));
        (!text.is_empty()).then_some(text)
    }

    /// Every check in declared order
    pub fn checks(&self, revision: Revision, ctx: &Value) -> Vec<CheckResult> {
        self.checks
            .iter()
            .map(|(label, cell)| {
                cell.get_or_compute(revision, || CheckResult {
                    label: label.clone(),
                    text: self.env.evaluate_or(&format!("{CHECKS_PREFIX}{label}"), ctx, ""),
                })
            })
            .collect()
    }

    /// Recompute counts per artifact name, for diagnostics and tests
    pub fn compute_counts(&self) -> IndexMap<String, usize> {
        let mut counts = IndexMap::new();
        counts.insert(URL_TEMPLATE.to_string(), self.url.compute_count());
        counts.insert(SUBMIT_BUTTON_TEMPLATE.to_string(), self.submit_button.compute_count());
        counts.insert(DOWNLOAD_FILENAME_TEMPLATE.to_string(), self.download_filename.compute_count());
        counts.insert(SUBMIT_TARGET_TEMPLATE.to_string(), self.submit_target.compute_count());
        for (key, cell) in &self.above {
            counts.insert(format!("{ABOVE_PREFIX}{key}"), cell.compute_count());
        }
        for (key, cell) in &self.below {
            counts.insert(format!("{BELOW_PREFIX}{key}"), cell.compute_count());
        }
        for (label, cell) in &self.checks {
            counts.insert(format!("{CHECKS_PREFIX}{label}"), cell.compute_count());
        }
        counts
    }
}
