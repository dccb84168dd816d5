//! Per-form render props as an explicit precedence merge
//!
//! Layers, lowest to highest:
//! 1. defaults (`schema`, `liveValidate`, `liveOmit`, `showErrorList`, `idPrefix`, `id`)
//! 2. the form's `props` from the config
//! 3. the resolved documents (`schema`, `uiSchema`)
//! 4. forced bindings (`formData`, `onChange`)
//!
//! Each layer replaces top-level keys of the one below; there is no deep merge.

use serde_json::{json, Map, Value};

use crate::config::{FormSpec, Source};

/// Resolved documents of one form
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedForm {
    pub schema: Option<Value>,
    pub ui_schema: Option<Value>,
    pub form_data: Option<Value>,
}

impl ResolvedForm {
    /// Only the inline documents of a form; locations stay unresolved
    pub fn from_inline(spec: &FormSpec) -> Self {
        let inline = |source: &Option<Source>| match source {
            Some(Source::Inline(value)) => Some(value.clone()),
            _ => None,
        };
        Self {
            schema: inline(&spec.schema),
            ui_schema: inline(&spec.ui_schema),
            form_data: inline(&spec.form_data),
        }
    }

    /// The first location in `spec` this form holds no document for
    pub fn missing_location<'a>(&self, spec: &'a FormSpec) -> Option<&'a str> {
        [
            (&spec.schema, &self.schema),
            (&spec.ui_schema, &self.ui_schema),
            (&spec.form_data, &self.form_data),
        ]
        .into_iter()
        .find_map(|(source, resolved)| match (source, resolved) {
            (Some(Source::Location(location)), None) => Some(location.as_str()),
            _ => None,
        })
    }

    /// `schema.title`, if the schema has one
    pub fn title(&self) -> Option<&str> {
        self.schema.as_ref()?.get("title")?.as_str()
    }
}

pub fn default_props(id_prefix: &str, key: &str) -> Map<String, Value> {
    let id = format!("{id_prefix}-{key}");
    let mut map = Map::new();
    map.insert("schema".into(), json!({}));
    map.insert("liveValidate".into(), Value::Bool(true));
    map.insert("liveOmit".into(), Value::Bool(true));
    map.insert("showErrorList".into(), Value::Bool(false));
    map.insert("idPrefix".into(), Value::String(id.clone()));
    map.insert("id".into(), Value::String(id));
    map
}

fn resolved_props(resolved: &ResolvedForm) -> Map<String, Value> {
    let mut map = Map::new();
    if let Some(schema) = &resolved.schema {
        map.insert("schema".into(), schema.clone());
    }
    if let Some(ui_schema) = &resolved.ui_schema {
        map.insert("uiSchema".into(), ui_schema.clone());
    }
    map
}

/// `onChange` names the form key the host reports changes for
fn forced_props(key: &str, data: &Value) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("formData".into(), data.clone());
    map.insert("onChange".into(), Value::String(key.to_string()));
    map
}

fn layer(base: &mut Map<String, Value>, over: &Map<String, Value>) {
    for (k, v) in over {
        base.insert(k.clone(), v.clone());
    }
}

pub fn merge_props(
    id_prefix: &str,
    key: &str,
    config_props: Option<&Map<String, Value>>,
    resolved: &ResolvedForm,
    data: &Value,
) -> Map<String, Value> {
    let mut props = default_props(id_prefix, key);
    if let Some(config_props) = config_props {
        layer(&mut props, config_props);
    }
    layer(&mut props, &resolved_props(resolved));
    layer(&mut props, &forced_props(key, data));
    props
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_only() {
        let props = merge_props("urlforms-0", "main", None, &ResolvedForm::default(), &json!({}));
        assert_eq!(
            Value::Object(props),
            json!({
                "schema": {},
                "liveValidate": true,
                "liveOmit": true,
                "showErrorList": false,
                "idPrefix": "urlforms-0-main",
                "id": "urlforms-0-main",
                "formData": {},
                "onChange": "main",
            })
        );
    }

    #[test]
    fn layers_override_in_order() {
        let config_props = json!({"liveValidate": false, "schema": {"title": "ignored"}, "formData": "ignored"});
        let resolved = ResolvedForm {
            schema: Some(json!({"title": "Main"})),
            ui_schema: Some(json!({"ui:order": ["a"]})),
            form_data: None,
        };
        let props = merge_props("p", "main", config_props.as_object(), &resolved, &json!({"a": 1}));

        assert_eq!(props["liveValidate"], json!(false));
        assert_eq!(props["schema"], json!({"title": "Main"}));
        assert_eq!(props["uiSchema"], json!({"ui:order": ["a"]}));
        assert_eq!(props["formData"], json!({"a": 1}));
        assert_eq!(resolved.title(), Some("Main"));
    }
}
