//! Page instance: one config, its forms, and everything derived from them
//!
//! ```text
//! on_change / submit ──► FormStore (revision += 1)
//!                             │
//!                             ▼
//!                   Context {config, data}  (derived)
//!                             │
//!            ┌────────────────┼────────────────┐
//!            ▼                ▼                ▼
//!      url / submit_*   above_* / below_*    checks/*      (derived, lazy)
//!            └────────────────┼────────────────┘
//!                             ▼
//!                 ErrorSummary ─► RenderModel
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{json, Value};
use tracing::{debug, info};

use crate::aggregate::{aggregate, ErrorSummary};
use crate::artifacts::{Artifacts, CheckResult};
use crate::config::{Config, DEFAULT_IFRAME_STYLE};
use crate::error::{Result, TemplateError, UrlformsError};
use crate::filters::FilterRegistry;
use crate::loader::{resolve_forms, DocumentLoader, LocationLoader};
use crate::props::{merge_props, ResolvedForm};
use crate::reactive::{Derived, Revision};
use crate::render::{rank_forms, scoped_css, terminal_action, ActionInputs, Badge, FormItem, RenderModel};
use crate::store::{Batch, FormState, FormStore, ValidationError};
use crate::template::{Environment, VirtualSource};
use crate::validate::{FormValidator, JsonSchemaValidator};

/// Per-process counter for generated id prefixes
static NEXT_INSTANCE: AtomicUsize = AtomicUsize::new(0);

pub struct Instance {
    config: Config,
    config_value: Value,
    id_prefix: String,
    ranked: Vec<String>,
    resolved: IndexMap<String, ResolvedForm>,
    store: FormStore,
    context: Derived<Arc<Value>>,
    artifacts: Artifacts,
    validator: Box<dyn FormValidator>,
}

impl Instance {
    /// Build an instance from a config and its resolved documents
    pub fn new(config: Config, resolved: IndexMap<String, ResolvedForm>) -> Result<Self> {
        Self::with_validator(config, resolved, Box::new(JsonSchemaValidator::new()))
    }

    pub fn with_validator(
        config: Config,
        mut resolved: IndexMap<String, ResolvedForm>,
        validator: Box<dyn FormValidator>,
    ) -> Result<Self> {
        config.validate()?;

        // exactly one entry per declared form, in declared order
        let resolved: IndexMap<String, ResolvedForm> = config
            .forms
            .iter()
            .map(|(key, spec)| {
                let form = resolved
                    .shift_remove(key)
                    .unwrap_or_else(|| ResolvedForm::from_inline(spec));
                match form.missing_location(spec) {
                    Some(location) => Err(UrlformsError::ConfigInvalid {
                        reason: format!("form '{key}' references '{location}', which was never resolved"),
                    }),
                    None => Ok((key.clone(), form)),
                }
            })
            .collect::<Result<_>>()?;

        for (key, form) in &resolved {
            if let Some(schema) = &form.schema {
                validator.prepare(key, schema)?;
            }
        }

        let filters = FilterRegistry::with_bundles(&config.filter_bundles()?);
        let env = Environment::new(VirtualSource::from_config(&config), filters);
        let artifacts = Artifacts::new(&config, env);

        let store = FormStore::new(
            resolved
                .iter()
                .map(|(key, form)| (key.clone(), FormState::initial(form.form_data.clone()))),
        );

        let id_prefix = config
            .id_prefix
            .clone()
            .unwrap_or_else(|| format!("urlforms-{}", NEXT_INSTANCE.fetch_add(1, Ordering::Relaxed)));

        info!(id = %id_prefix, forms = resolved.len(), checks = config.checks.len(), "instance ready");

        Ok(Self {
            config_value: config.to_value(),
            ranked: rank_forms(&config),
            config,
            id_prefix,
            resolved,
            store,
            context: Derived::new(),
            artifacts,
            validator,
        })
    }

    /// Resolve every location reference through `loader`, then build
    pub async fn from_config(config: Config, loader: &dyn DocumentLoader) -> Result<Self> {
        let resolved = resolve_forms(&config, loader).await?;
        Self::new(config, resolved)
    }

    /// Load a config file; locations resolve relative to it
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let config = Config::from_file(path)?;
        let loader = LocationLoader::for_config(path)?;
        Self::from_config(config, &loader).await
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    /// Form keys in `(order, key)` order
    pub fn ranked_keys(&self) -> &[String] {
        &self.ranked
    }

    pub fn resolved(&self, key: &str) -> Option<&ResolvedForm> {
        self.resolved.get(key)
    }

    pub fn state(&self, key: &str) -> Option<&FormState> {
        self.store.get(key)
    }

    pub fn revision(&self) -> Revision {
        self.store.revision()
    }

    pub fn artifacts(&self) -> &Artifacts {
        &self.artifacts
    }

    /// A form reported new data and errors
    pub fn on_change(&mut self, key: &str, data: Value, errors: Vec<ValidationError>) -> Result<()> {
        self.store.on_change(key, data, errors)
    }

    /// Several changes, one recomputation of everything derived
    pub fn batch<R>(&mut self, f: impl FnOnce(&mut Batch<'_>) -> Result<R>) -> Result<R> {
        self.store.batch(f)
    }

    /// Validate `data` against the form's schema, then record it with the errors found
    pub fn submit(&mut self, key: &str, data: Value) -> Result<Vec<ValidationError>> {
        let form = self
            .resolved
            .get(key)
            .ok_or_else(|| UrlformsError::UnknownForm { key: key.to_string() })?;
        let errors = match &form.schema {
            Some(schema) => self.validator.validate(key, schema, &data)?,
            None => Vec::new(),
        };
        debug!(form = key, errors = errors.len(), "form submitted");
        self.store.on_change(key, data, errors)?;
        Ok(self.store.get(key).map(|state| state.errors.clone()).unwrap_or_default())
    }

    /// `{config, data}` at the current revision
    pub fn context(&self) -> Arc<Value> {
        self.context.get_or_compute(self.store.revision(), || {
            Arc::new(json!({
                "config": self.config_value,
                "data": self.store.data_snapshot(),
            }))
        })
    }

    pub fn context_compute_count(&self) -> usize {
        self.context.compute_count()
    }

    /// Render any named template against the current context
    pub fn evaluate(&self, name: &str) -> std::result::Result<String, TemplateError> {
        self.artifacts.env().evaluate(name, &self.context())
    }

    pub fn url(&self) -> String {
        self.artifacts.url(self.revision(), &self.context())
    }

    pub fn checks(&self) -> Vec<CheckResult> {
        self.artifacts.checks(self.revision(), &self.context())
    }

    pub fn errors(&self) -> ErrorSummary {
        aggregate(&self.ranked, &self.store, &self.checks())
    }

    pub fn render(&self) -> RenderModel {
        let revision = self.revision();
        let ctx = self.context();
        let checks = self.artifacts.checks(revision, &ctx);
        let errors = aggregate(&self.ranked, &self.store, &checks);

        let forms = self
            .ranked
            .iter()
            .map(|key| {
                let resolved = self.resolved.get(key).cloned().unwrap_or_default();
                let data = self.store.get(key).map(|state| state.data.clone()).unwrap_or(Value::Null);
                let config_props = self.config.forms.get(key).and_then(|spec| spec.props.as_ref());
                FormItem {
                    key: key.clone(),
                    label: resolved.title().unwrap_or(key).to_string(),
                    above: self.artifacts.above(key, revision, &ctx),
                    below: self.artifacts.below(key, revision, &ctx),
                    props: merge_props(&self.id_prefix, key, config_props, &resolved, &data),
                    badge: Badge::from_errors(errors.for_form(key)),
                }
            })
            .collect();

        let isolated = self.config.is_isolated();
        let action = terminal_action(
            &errors,
            &self.id_prefix,
            isolated,
            ActionInputs {
                href: self.artifacts.url(revision, &ctx),
                label: self.artifacts.submit_button(revision, &ctx),
                download: self.artifacts.download_filename(revision, &ctx),
                target: self.artifacts.submit_target(revision, &ctx),
            },
        );

        RenderModel {
            id_prefix: self.id_prefix.clone(),
            theme: self.config.theme().to_string(),
            style: self.config.style.as_ref().map(|style| scoped_css(&self.id_prefix, style)),
            iframe_style: isolated.then(|| {
                self.config
                    .iframe_style
                    .clone()
                    .unwrap_or_else(|| DEFAULT_IFRAME_STYLE.to_string())
            }),
            forms,
            checks: checks.into_iter().map(Into::into).collect(),
            action,
        }
    }
}

impl std::fmt::Debug for Instance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Instance")
            .field("id_prefix", &self.id_prefix)
            .field("forms", &self.ranked)
            .field("revision", &self.store.revision())
            .finish()
    }
}
