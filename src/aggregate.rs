//! Error aggregation across forms and checks
//!
//! Form errors come first, forms in rank order, then failing checks in declared order.

use indexmap::IndexMap;
use serde::Serialize;

use crate::artifacts::CheckResult;
use crate::store::{FormStore, ValidationError};

/// Where an aggregated error came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "name", rename_all = "lowercase")]
pub enum ErrorSource {
    Form(String),
    Check(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorEntry {
    pub source: ErrorSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub entries: Vec<ErrorEntry>,
    /// Validation errors per form key, in rank order
    pub per_form: IndexMap<String, Vec<ValidationError>>,
}

impl ErrorSummary {
    pub fn total(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Target of the scroll-to-error affordance
    pub fn first(&self) -> Option<&ErrorEntry> {
        self.entries.first()
    }

    pub fn for_form(&self, key: &str) -> &[ValidationError] {
        self.per_form.get(key).map(Vec::as_slice).unwrap_or_default()
    }
}

/// Fold every form's errors (in `ranked` order) and every failing check into one list
pub fn aggregate(ranked: &[String], store: &FormStore, checks: &[CheckResult]) -> ErrorSummary {
    let mut summary = ErrorSummary::default();

    for key in ranked {
        let errors = store.get(key).map(|state| state.errors.clone()).unwrap_or_default();
        summary.entries.extend(errors.iter().map(|error| ErrorEntry {
            source: ErrorSource::Form(key.clone()),
            path: Some(error.path.clone()),
            message: error.message.clone(),
        }));
        summary.per_form.insert(key.clone(), errors);
    }

    summary
        .entries
        .extend(checks.iter().filter(|check| !check.passing()).map(|check| ErrorEntry {
            source: ErrorSource::Check(check.label.clone()),
            path: None,
            message: check.text.clone(),
        }));

    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::FormState;
    use serde_json::json;

    fn check(label: &str, text: &str) -> CheckResult {
        CheckResult {
            label: label.to_string(),
            text: text.to_string(),
        }
    }

    #[test]
    fn forms_in_rank_order_then_failing_checks() {
        let mut store = FormStore::new([
            ("a".to_string(), FormState::initial(None)),
            ("b".to_string(), FormState::initial(None)),
        ]);
        store
            .on_change("a", json!({}), vec![ValidationError::new("", "a broke")])
            .unwrap();
        store
            .on_change("b", json!({}), vec![ValidationError::new("/x", "b broke")])
            .unwrap();

        let ranked = vec!["b".to_string(), "a".to_string()];
        let summary = aggregate(&ranked, &store, &[check("A", ""), check("B", "fail reason")]);

        let messages: Vec<_> = summary.entries.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(messages, vec!["b broke", "a broke", "fail reason"]);
        assert_eq!(summary.total(), 3);
        assert_eq!(summary.first().unwrap().source, ErrorSource::Form("b".into()));
        assert_eq!(summary.for_form("a").len(), 1);
        assert!(summary.for_form("missing").is_empty());
    }

    #[test]
    fn whitespace_check_passes() {
        let store = FormStore::new([("a".to_string(), FormState::initial(None))]);
        let summary = aggregate(&["a".to_string()], &store, &[check("A", "  \n ")]);
        assert!(summary.is_empty());
        assert!(summary.first().is_none());
    }
}
