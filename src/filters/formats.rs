//! Structured-data encode/decode filters (json, toml, yaml) and their data-URI variants

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;

use super::{FilterArgs, FilterFn};

/// Characters left alone by URI component escaping.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Default indent of `to_json`
const JSON_INDENT: usize = 2;
/// Widest indent `to_json` accepts
const MAX_JSON_INDENT: usize = 16;

pub fn uri_escape(text: &str) -> String {
    utf8_percent_encode(text, URI_COMPONENT).to_string()
}

fn data_uri(mime: &str, text: &str) -> String {
    format!("data:{mime};charset=utf-8,{}", uri_escape(text))
}

/// Reject options an encoder does not understand; `names` doubles as the positional order
fn check_options(args: &FilterArgs, names: &[&str]) -> Result<(), String> {
    if args.positional.len() > names.len() {
        return Err(format!(
            "takes at most {} positional argument(s), got {}",
            names.len(),
            args.positional.len()
        ));
    }
    match args.kwargs.keys().find(|key| !names.contains(&key.as_str())) {
        Some(key) if names.is_empty() => Err(format!("unknown option '{key}' (takes no options)")),
        Some(key) => Err(format!("unknown option '{key}' (expected {})", names.join(", "))),
        None => Ok(()),
    }
}

fn input_text<'v>(value: &'v Value) -> Result<&'v str, String> {
    value
        .as_str()
        .ok_or_else(|| format!("expected a string, got {}", super::type_name(value)))
}

// ═══════════════════════════════════════════════════════════════
// json
// ═══════════════════════════════════════════════════════════════

pub(super) fn json_filters() -> Vec<(&'static str, FilterFn)> {
    vec![
        ("to_json", to_json as FilterFn),
        ("from_json", from_json),
        ("to_json_url", to_json_url),
    ]
}

fn encode_json(value: &Value, args: &FilterArgs) -> Result<String, String> {
    check_options(args, &["indent"])?;
    let indent = match args.get(0, "indent") {
        None | Some(Value::Null) => JSON_INDENT,
        Some(v) => match v.as_u64() {
            Some(n) if n <= MAX_JSON_INDENT as u64 => n as usize,
            _ => return Err(format!("indent must be an integer from 0 to {MAX_JSON_INDENT}, got {v}")),
        },
    };
    if indent == 0 {
        return serde_json::to_string(value).map_err(|e| e.to_string());
    }

    let pad = vec![b' '; indent];
    let mut out = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(&pad);
    let mut ser = serde_json::Serializer::with_formatter(&mut out, formatter);
    serde::Serialize::serialize(value, &mut ser).map_err(|e| e.to_string())?;
    String::from_utf8(out).map_err(|e| e.to_string())
}

fn to_json(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    encode_json(value, args).map(Value::String)
}

fn from_json(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    serde_json::from_str(input_text(value)?).map_err(|e| e.to_string())
}

fn to_json_url(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    let text = encode_json(value, args)?;
    Ok(Value::String(data_uri("application/json", &text)))
}

// ═══════════════════════════════════════════════════════════════
// toml
// ═══════════════════════════════════════════════════════════════

pub(super) fn toml_filters() -> Vec<(&'static str, FilterFn)> {
    vec![
        ("to_toml", to_toml as FilterFn),
        ("from_toml", from_toml),
        ("to_toml_url", to_toml_url),
    ]
}

fn encode_toml(value: &Value, args: &FilterArgs) -> Result<String, String> {
    check_options(args, &["pretty"])?;
    let pretty = match args.get(0, "pretty") {
        None | Some(Value::Null) => false,
        Some(Value::Bool(b)) => *b,
        Some(v) => return Err(format!("pretty must be a boolean, got {v}")),
    };
    if !value.is_object() {
        return Err(format!("TOML documents must be tables, got {}", super::type_name(value)));
    }
    let text = if pretty {
        toml::to_string_pretty(value)
    } else {
        toml::to_string(value)
    };
    text.map_err(|e| e.to_string())
}

fn to_toml(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    encode_toml(value, args).map(Value::String)
}

fn from_toml(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    toml::from_str(input_text(value)?).map_err(|e| e.to_string())
}

fn to_toml_url(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    Ok(Value::String(data_uri("application/toml", &encode_toml(value, args)?)))
}

// ═══════════════════════════════════════════════════════════════
// yaml
// ═══════════════════════════════════════════════════════════════

pub(super) fn yaml_filters() -> Vec<(&'static str, FilterFn)> {
    vec![
        ("to_yaml", to_yaml as FilterFn),
        ("from_yaml", from_yaml),
        ("to_yaml_url", to_yaml_url),
    ]
}

// serde_yaml has no layout knobs, so every option is rejected
fn encode_yaml(value: &Value, args: &FilterArgs) -> Result<String, String> {
    check_options(args, &[])?;
    serde_yaml::to_string(value).map_err(|e| e.to_string())
}

fn to_yaml(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    encode_yaml(value, args).map(Value::String)
}

fn from_yaml(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    serde_yaml::from_str(input_text(value)?).map_err(|e| e.to_string())
}

fn to_yaml_url(value: &Value, args: &FilterArgs) -> Result<Value, String> {
    Ok(Value::String(data_uri("application/yaml", &encode_yaml(value, args)?)))
}
