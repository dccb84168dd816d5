//! End-to-end tests for page instances
//!
//! Build instances from config documents, push form changes through them and
//! check the derived artifacts, error aggregation and render model.

use indexmap::IndexMap;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::fs;
use tempfile::TempDir;
use urlforms::{
    Config, DocumentFormat, ErrorSource, Instance, TerminalAction, UrlformsError, ValidationError,
};

fn instance(yaml: &str) -> Instance {
    let config = Config::parse(yaml, DocumentFormat::Yaml).unwrap();
    Instance::new(config, IndexMap::new()).unwrap()
}

const NAMED_URL: &str = r#"
forms:
  main:
    schema:
      type: object
      required: [name]
      properties:
        name: {type: string}
templates:
  url: "https://example.com/{{ data.main.name }}"
"#;

// ============================================================================
// URL artifact end to end
// ============================================================================

#[test]
fn test_valid_data_links_to_rendered_url() {
    let mut page = instance(NAMED_URL);
    let errors = page.submit("main", json!({"name": "ok"})).unwrap();
    assert!(errors.is_empty());

    assert_eq!(page.url(), "https://example.com/ok");
    assert_eq!(page.errors().total(), 0);

    let model = page.render();
    assert_eq!(
        model.action,
        TerminalAction::Submit {
            href: "https://example.com/ok".into(),
            label: "Submit".into(),
            download: None,
            target: None,
        }
    );
}

#[test]
fn test_invalid_data_blocks_submit() {
    let mut page = instance(NAMED_URL);
    let errors = page.submit("main", json!({})).unwrap();
    assert!(!errors.is_empty());

    let summary = page.errors();
    assert!(summary.total() >= 1);
    assert_eq!(summary.first().unwrap().source, ErrorSource::Form("main".into()));

    match page.render().action {
        TerminalAction::Errors { count, text, focus } => {
            assert_eq!(count, summary.total());
            assert!(text.ends_with("Error") || text.ends_with("Errors"));
            assert_eq!(focus.root, page.id_prefix());
        }
        other => panic!("expected the error affordance, got {other:?}"),
    }
}

#[test]
fn test_submit_artifacts_render_through_templates() {
    let mut page = instance(
        r#"
forms:
  file: {}
filters: [json]
templates:
  url: "data:application/json,{{ data.file | to_json(indent=0) | urlencode }}"
  submit_button: "Download {{ data.file.name }}"
  download_filename: "{{ data.file.name }}.json"
  submit_target: _blank
"#,
    );
    page.submit("file", json!({"name": "x"})).unwrap();

    assert_eq!(
        page.render().action,
        TerminalAction::Submit {
            href: "data:application/json,%7B%22name%22%3A%22x%22%7D".into(),
            label: "Download x".into(),
            download: Some("x.json".into()),
            target: Some("_blank".into()),
        }
    );
}

// ============================================================================
// Ordering and aggregation
// ============================================================================

#[test]
fn test_forms_render_in_rank_order() {
    let page = instance(
        r#"
forms:
  b: {order: 1}
  a: {order: 1}
  c: {order: 0, schema: {title: "Contact"}}
"#,
    );
    let model = page.render();
    let keys: Vec<_> = model.forms.iter().map(|f| f.key.as_str()).collect();
    assert_eq!(keys, vec!["c", "a", "b"]);
    assert_eq!(model.forms[0].label, "Contact");
    assert_eq!(model.forms[1].label, "a");
}

#[test]
fn test_only_failing_checks_count() {
    let page = instance(
        r#"
forms: {main: {}}
checks:
  A: ""
  B: "fail reason"
"#,
    );
    let summary = page.errors();
    assert_eq!(summary.total(), 1);
    assert_eq!(summary.entries[0].source, ErrorSource::Check("B".into()));
    assert_eq!(summary.entries[0].message, "fail reason");

    let model = page.render();
    assert_eq!(model.checks.len(), 2);
    assert!(model.checks[0].passing);
    assert!(!model.checks[1].passing);
}

#[test]
fn test_checks_react_to_data() {
    let mut page = instance(
        r#"
forms: {main: {}}
checks:
  has-name: "{% if not data.main.name %}Add a name{% endif %}"
"#,
    );
    assert_eq!(page.errors().total(), 1);

    page.on_change("main", json!({"name": "n"}), vec![]).unwrap();
    assert_eq!(page.errors().total(), 0);
    assert!(page.render().action.is_submit());
}

#[test]
fn test_form_errors_precede_check_failures() {
    let mut page = instance(
        r#"
forms: {second: {order: 2}, first: {order: 1}}
checks: {C: "always"}
"#,
    );
    page.batch(|batch| {
        batch.on_change("second", json!({}), vec![ValidationError::new("", "second")])?;
        batch.on_change("first", json!({}), vec![ValidationError::new("", "first")])
    })
    .unwrap();

    let messages: Vec<_> = page.errors().entries.into_iter().map(|e| e.message).collect();
    assert_eq!(messages, vec!["first", "second", "always"]);
    assert!(matches!(page.render().action, TerminalAction::Errors { count: 3, .. }));
}

// ============================================================================
// Store semantics
// ============================================================================

#[test]
fn test_on_change_is_atomic() {
    let mut page = instance("forms: {x: {}, y: {}}");
    page.on_change("x", json!({"v": 1}), vec![ValidationError::new("/v", "bad v")])
        .unwrap();

    let ctx = page.context();
    let state = page.state("x").unwrap();
    assert_eq!(ctx["data"]["x"], json!({"v": 1}));
    assert_eq!(state.data, ctx["data"]["x"]);
    assert_eq!(state.errors, vec![ValidationError::new("/v", "bad v")]);
    assert_eq!(page.render().forms[0].badge.messages, vec!["bad v"]);
}

#[test]
fn test_duplicate_messages_collapse() {
    let mut page = instance("forms: {x: {}}");
    page.on_change(
        "x",
        json!({}),
        vec![
            ValidationError::new("/a", "required"),
            ValidationError::new("/b", "required"),
        ],
    )
    .unwrap();
    assert_eq!(page.errors().total(), 1);
    assert_eq!(page.errors().entries[0].path.as_deref(), Some("/a"));
}

#[test]
fn test_unknown_form_key_is_rejected() {
    let mut page = instance("forms: {x: {}}");
    let err = page.on_change("nope", json!({}), vec![]).unwrap_err();
    assert!(matches!(err, UrlformsError::UnknownForm { .. }));
}

// ============================================================================
// Lazy recomputation
// ============================================================================

#[test]
fn test_derived_cells_recompute_once_per_batch() {
    let mut page = instance(
        r#"
forms: {a: {}, b: {}}
templates: {url: "{{ data.a.v }}-{{ data.b.v }}"}
"#,
    );
    assert_eq!(page.url(), "-");
    assert_eq!(page.url(), "-");
    assert_eq!(page.artifacts().compute_counts()["url"], 1);

    page.batch(|batch| {
        batch.on_change("a", json!({"v": 1}), vec![])?;
        batch.on_change("b", json!({"v": 2}), vec![])
    })
    .unwrap();
    // nothing recomputes until read
    assert_eq!(page.artifacts().compute_counts()["url"], 1);

    assert_eq!(page.url(), "1-2");
    page.render();
    assert_eq!(page.artifacts().compute_counts()["url"], 2);
    assert_eq!(page.context_compute_count(), 2);
}

// ============================================================================
// Template failures
// ============================================================================

#[test]
fn test_unresolved_template_is_a_typed_failure() {
    let page = instance("forms: {main: {}}");
    let err = page.evaluate("not_declared").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.name, "not_declared");

    // callers fall back instead of failing
    assert_eq!(page.url(), "#");
    assert!(page.render().action.is_submit());
}

#[test]
fn test_broken_template_falls_back() {
    let page = instance(
        r#"
forms: {main: {}}
templates:
  url: "{{ data.main | from_json }}"
  above_main: "{% for %}"
"#,
    );
    assert_eq!(page.url(), "#");
    assert_eq!(page.render().forms[0].above, None);
}

#[test]
fn test_reserved_check_label_is_rejected() {
    let err = Config::parse("forms: {a: {}}\nchecks: {url: x}", DocumentFormat::Yaml).unwrap_err();
    assert!(matches!(err, UrlformsError::ReservedName { .. }));
}

// ============================================================================
// Loading from disk
// ============================================================================

#[tokio::test]
async fn test_load_resolves_relative_documents() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("schema.json"),
        r#"{"title": "Profile", "type": "object", "properties": {"name": {"type": "string"}}}"#,
    )
    .unwrap();
    fs::write(dir.path().join("data.toml"), "name = \"toml\"\n").unwrap();
    let config_path = dir.path().join("page.yaml");
    fs::write(
        &config_path,
        r#"
forms:
  profile:
    schema: schema.json
    form_data: data.toml
templates:
  url: "https://example.com/{{ data.profile.name }}"
"#,
    )
    .unwrap();

    let page = Instance::load(&config_path).await.unwrap();
    assert_eq!(page.url(), "https://example.com/toml");
    let model = page.render();
    assert_eq!(model.forms[0].label, "Profile");
    assert_eq!(model.forms[0].props["formData"], json!({"name": "toml"}));
    assert_eq!(model.theme, "bootstrap");
}

#[tokio::test]
async fn test_load_fails_on_missing_document() {
    let dir = TempDir::new().unwrap();
    let config_path = dir.path().join("page.json");
    fs::write(&config_path, r#"{"forms": {"a": {"schema": "missing.json"}}}"#).unwrap();

    let err = Instance::load(&config_path).await.unwrap_err();
    assert!(matches!(err, UrlformsError::Fetch { .. }));
}

#[test]
fn test_render_model_serializes() {
    let page = instance("forms: {main: {}}\nstyle: {'': {'--gap': 1rem}}\nid_prefix: pg");
    let value: Value = serde_json::to_value(page.render()).unwrap();
    assert_eq!(value["action"]["kind"], json!("submit"));
    assert_eq!(value["style"], json!("#pg { --gap: 1rem; }"));
}
