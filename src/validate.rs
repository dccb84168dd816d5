//! Form validation seam
//!
//! The schema algorithm is external: [`FormValidator`] is the boundary, and
//! [`JsonSchemaValidator`] adapts the `jsonschema` crate with one compiled
//! validator cached per form key.

use std::sync::Arc;

use dashmap::DashMap;
use jsonschema::Validator;
use serde_json::Value;

use crate::error::{Result, UrlformsError};
use crate::store::ValidationError;

pub trait FormValidator: Send + Sync {
    /// Compile (or otherwise check) a form's schema ahead of use
    fn prepare(&self, key: &str, schema: &Value) -> Result<()>;

    /// Errors for `data` against the form's schema; empty when valid
    fn validate(&self, key: &str, schema: &Value, data: &Value) -> Result<Vec<ValidationError>>;
}

/// `jsonschema`-backed validator (thread-safe cache)
#[derive(Default)]
pub struct JsonSchemaValidator {
    cache: DashMap<String, Arc<Validator>>,
}

impl JsonSchemaValidator {
    pub fn new() -> Self {
        Self::default()
    }

    fn compiled(&self, key: &str, schema: &Value) -> Result<Arc<Validator>> {
        if let Some(cached) = self.cache.get(key) {
            return Ok(Arc::clone(&cached));
        }
        let validator = Validator::new(schema).map_err(|e| UrlformsError::SchemaCompile {
            key: key.to_string(),
            details: e.to_string(),
        })?;
        let validator = Arc::new(validator);
        self.cache.insert(key.to_string(), Arc::clone(&validator));
        Ok(validator)
    }
}

impl FormValidator for JsonSchemaValidator {
    fn prepare(&self, key: &str, schema: &Value) -> Result<()> {
        self.compiled(key, schema).map(|_| ())
    }

    fn validate(&self, key: &str, schema: &Value, data: &Value) -> Result<Vec<ValidationError>> {
        let validator = self.compiled(key, schema)?;
        let errors = validator
            .iter_errors(data)
            .map(|error| ValidationError::new(error.instance_path.to_string(), error.to_string()))
            .collect();
        Ok(errors)
    }
}
