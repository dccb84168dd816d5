//! Render model: everything a host needs to draw one page instance

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::aggregate::{ErrorEntry, ErrorSummary};
use crate::artifacts::CheckResult;
use crate::config::Config;
use crate::filters::to_text;
use crate::store::ValidationError;

/// Submit label when the `submit_button` template renders nothing
pub const DEFAULT_SUBMIT_LABEL: &str = "Submit";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderModel {
    pub id_prefix: String,
    pub theme: String,
    /// CSS scoped to `#<id_prefix>`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub style: Option<String>,
    /// Frame style when the instance renders isolated
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iframe_style: Option<String>,
    pub forms: Vec<FormItem>,
    pub checks: Vec<CheckItem>,
    pub action: TerminalAction,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormItem {
    pub key: String,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub above: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub below: Option<String>,
    pub props: Map<String, Value>,
    pub badge: Badge,
}

/// Per-form pass/fail summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Badge {
    pub passing: bool,
    pub messages: Vec<String>,
}

impl Badge {
    pub fn from_errors(errors: &[ValidationError]) -> Self {
        Self {
            passing: errors.is_empty(),
            messages: errors.iter().map(|e| e.message.clone()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckItem {
    pub label: String,
    pub passing: bool,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub text: String,
}

impl From<CheckResult> for CheckItem {
    fn from(check: CheckResult) -> Self {
        Self {
            passing: check.passing(),
            label: check.label,
            text: check.text,
        }
    }
}

/// Where the error affordance should scroll to
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorFocus {
    /// Root element id to search for the first error marker
    pub root: String,
    /// The root lives inside an isolated frame
    pub isolated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first: Option<ErrorEntry>,
}

/// Exactly one of these ends the page
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TerminalAction {
    Errors {
        count: usize,
        text: String,
        focus: ErrorFocus,
    },
    Submit {
        href: String,
        label: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        download: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        target: Option<String>,
    },
}

impl TerminalAction {
    pub fn is_submit(&self) -> bool {
        matches!(self, TerminalAction::Submit { .. })
    }
}

/// Form keys ordered by `(order, key)`
pub fn rank_forms(config: &Config) -> Vec<String> {
    let mut keys: Vec<(i64, &String)> = config.forms.iter().map(|(key, spec)| (spec.order, key)).collect();
    keys.sort();
    keys.into_iter().map(|(_, key)| key.clone()).collect()
}

pub fn error_text(count: usize) -> String {
    if count == 1 {
        "1 Error".to_string()
    } else {
        format!("{count} Errors")
    }
}

/// One rule per selector, each scoped under `#root`; an empty selector targets the root itself
pub fn scoped_css(root: &str, style: &IndexMap<String, IndexMap<String, Value>>) -> String {
    style
        .iter()
        .map(|(selector, properties)| {
            let selector = selector.trim();
            let scope = if selector.is_empty() {
                format!("#{root}")
            } else {
                format!("#{root} {selector}")
            };
            let body: String = properties
                .iter()
                .map(|(property, value)| format!(" {property}: {};", to_text(value)))
                .collect();
            format!("{scope} {{{body} }}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Links to the artifact, or points at the errors blocking it
pub struct ActionInputs {
    pub href: String,
    pub label: String,
    pub download: String,
    pub target: String,
}

pub fn terminal_action(errors: &ErrorSummary, root: &str, isolated: bool, inputs: ActionInputs) -> TerminalAction {
    if !errors.is_empty() {
        return TerminalAction::Errors {
            count: errors.total(),
            text: error_text(errors.total()),
            focus: ErrorFocus {
                root: root.to_string(),
                isolated,
                first: errors.first().cloned(),
            },
        };
    }

    let non_empty = |s: String| (!s.is_empty()).then_some(s);
    TerminalAction::Submit {
        href: inputs.href,
        label: non_empty(inputs.label).unwrap_or_else(|| DEFAULT_SUBMIT_LABEL.to_string()),
        download: non_empty(inputs.download),
        target: non_empty(inputs.target),
    }
}
