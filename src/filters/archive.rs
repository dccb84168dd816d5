//! Archive bundling: an object of `path → content` packed into a zip

use std::io::{Cursor, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::Value;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::{FilterArgs, FilterFn};

pub(super) fn zip_filters() -> Vec<(&'static str, FilterFn)> {
    vec![("to_zip", to_zip as FilterFn), ("to_zip_url", to_zip_url)]
}

/// Pack every member of `value` as one file. String members are written as-is,
/// anything else as pretty JSON.
fn build_zip(value: &Value) -> Result<Vec<u8>, String> {
    let files = value
        .as_object()
        .ok_or_else(|| format!("expected an object of files, got {}", super::type_name(value)))?;

    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));

    for (path, content) in files {
        if path.is_empty() || path.starts_with('/') {
            return Err(format!("invalid archive path '{path}'"));
        }
        let bytes = match content {
            Value::String(text) => text.clone().into_bytes(),
            other => serde_json::to_vec_pretty(other).map_err(|e| e.to_string())?,
        };
        writer
            .start_file(path.as_str(), options.clone())
            .map_err(|e| e.to_string())?;
        writer.write_all(&bytes).map_err(|e| e.to_string())?;
    }

    let cursor = writer.finish().map_err(|e| e.to_string())?;
    Ok(cursor.into_inner())
}

fn to_zip(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    Ok(Value::String(STANDARD.encode(build_zip(value)?)))
}

fn to_zip_url(value: &Value, _args: &FilterArgs) -> Result<Value, String> {
    let encoded = STANDARD.encode(build_zip(value)?);
    Ok(Value::String(format!("data:application/zip;base64,{encoded}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn zip_starts_with_local_file_header() {
        let bytes = build_zip(&json!({"a.txt": "hello", "b.json": {"x": 1}})).unwrap();
        assert_eq!(&bytes[..4], b"PK\x03\x04");
    }

    #[test]
    fn zip_url_is_base64_data_uri() {
        let out = to_zip_url(&json!({"a.txt": "hello"}), &FilterArgs::default()).unwrap();
        let text = out.as_str().unwrap();
        let payload = text.strip_prefix("data:application/zip;base64,").unwrap();
        let decoded = STANDARD.decode(payload).unwrap();
        assert_eq!(&decoded[..2], b"PK");
    }

    #[test]
    fn zip_rejects_absolute_paths() {
        assert!(build_zip(&json!({"/etc/passwd": "x"})).is_err());
        assert!(build_zip(&json!("not files")).is_err());
    }
}
