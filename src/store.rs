//! Per-form data store
//!
//! One `{data, errors}` slot per declared form key. The key set is fixed at
//! construction; the only mutation is [`FormStore::on_change`], which replaces
//! both fields together.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{Result, UrlformsError};
use crate::reactive::Revision;

/// A schema mismatch reported for one form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    /// JSON pointer into the form data (empty for the root)
    #[serde(default)]
    pub path: String,
    pub message: String,
}

impl ValidationError {
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Current data and errors of one form
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FormState {
    pub data: Value,
    pub errors: Vec<ValidationError>,
}

impl FormState {
    /// Initial state: the resolved form data, or an empty object
    pub fn initial(data: Option<Value>) -> Self {
        Self {
            data: data.unwrap_or_else(|| Value::Object(Map::new())),
            errors: Vec::new(),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Keep the first error for each distinct message
fn dedupe(errors: Vec<ValidationError>) -> Vec<ValidationError> {
    let mut out: Vec<ValidationError> = Vec::with_capacity(errors.len());
    for error in errors {
        if !out.iter().any(|seen| seen.message == error.message) {
            out.push(error);
        }
    }
    out
}

#[derive(Debug, Clone, Default)]
pub struct FormStore {
    states: IndexMap<String, FormState>,
    revision: Revision,
}

impl FormStore {
    pub fn new(states: impl IntoIterator<Item = (String, FormState)>) -> Self {
        Self {
            states: states.into_iter().collect(),
            revision: 0,
        }
    }

    pub fn revision(&self) -> Revision {
        self.revision
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&FormState> {
        self.states.get(key)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Replace one form's data and errors together; one revision bump
    pub fn on_change(&mut self, key: &str, data: Value, errors: Vec<ValidationError>) -> Result<()> {
        self.batch(|batch| batch.on_change(key, data, errors))
    }

    /// Group several changes under a single revision bump
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Batch<'_>) -> Result<R>) -> Result<R> {
        let mut batch = Batch {
            states: &mut self.states,
            changed: 0,
        };
        let result = f(&mut batch);
        let changed = batch.changed;
        if changed > 0 {
            self.revision += 1;
            debug!(revision = self.revision, changed, "store updated");
        }
        result
    }

    /// `form-key → data` for every declared form
    pub fn data_snapshot(&self) -> Value {
        Value::Object(
            self.states
                .iter()
                .map(|(key, state)| (key.clone(), state.data.clone()))
                .collect(),
        )
    }
}

/// Mutation handle passed to [`FormStore::batch`]
pub struct Batch<'a> {
    states: &'a mut IndexMap<String, FormState>,
    changed: usize,
}

impl Batch<'_> {
    pub fn on_change(&mut self, key: &str, data: Value, errors: Vec<ValidationError>) -> Result<()> {
        let state = self
            .states
            .get_mut(key)
            .ok_or_else(|| UrlformsError::UnknownForm { key: key.to_string() })?;
        *state = FormState {
            data,
            errors: dedupe(errors),
        };
        self.changed += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store() -> FormStore {
        FormStore::new([
            ("a".to_string(), FormState::initial(Some(json!({"x": 1})))),
            ("b".to_string(), FormState::initial(None)),
        ])
    }

    #[test]
    fn initial_state() {
        let store = store();
        assert_eq!(store.get("a").unwrap().data, json!({"x": 1}));
        assert_eq!(store.get("b").unwrap().data, json!({}));
        assert_eq!(store.data_snapshot(), json!({"a": {"x": 1}, "b": {}}));
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn on_change_replaces_data_and_errors_together() {
        let mut store = store();
        store
            .on_change("a", json!({"x": 2}), vec![ValidationError::new("/x", "too big")])
            .unwrap();
        let state = store.get("a").unwrap();
        assert_eq!(state.data, json!({"x": 2}));
        assert_eq!(state.errors, vec![ValidationError::new("/x", "too big")]);
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn errors_are_deduplicated_by_message() {
        let mut store = store();
        store
            .on_change(
                "a",
                json!({}),
                vec![
                    ValidationError::new("/1", "required"),
                    ValidationError::new("/2", "other"),
                    ValidationError::new("/3", "required"),
                ],
            )
            .unwrap();
        let paths: Vec<_> = store.get("a").unwrap().errors.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["/1", "/2"]);
    }

    #[test]
    fn batch_bumps_revision_once() {
        let mut store = store();
        store
            .batch(|batch| {
                batch.on_change("a", json!(1), vec![])?;
                batch.on_change("b", json!(2), vec![])
            })
            .unwrap();
        assert_eq!(store.revision(), 1);
        assert_eq!(store.data_snapshot(), json!({"a": 1, "b": 2}));
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut store = store();
        let err = store.on_change("zzz", json!({}), vec![]).unwrap_err();
        assert!(matches!(err, UrlformsError::UnknownForm { .. }));
        assert_eq!(store.revision(), 0);
        assert_eq!(store.len(), 2);
    }
}
