//! JSON data model for fills
//!
//! The data file is a JSON object whose top-level keys become template
//! variables. A few keys carry extra meaning:
//!
//! - `choices`: `group -> selected option(s)` consulted by `checkbox()`
//! - `images`: `name -> {path, width_mm?, height_mm?}` inline images
//! - `empty_placeholder`, `checkbox_symbols`: see [`crate::config`]

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use base64::Engine;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::docx::image::{ImageFormat, ImageSource, ImageSpec};

/// Errors that can occur while loading data files
#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read data file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("data file must contain a JSON object at the top level")]
    NotAnObject,

    #[error("invalid image entry '{name}': {reason}")]
    InvalidImage { name: String, reason: String },

    #[error("unsupported field list: expected an object of labels, {{\"fields\": [...]}} or a list of objects")]
    UnsupportedFields,
}

/// Read and parse a JSON data file
pub fn load_data(path: &Path) -> Result<JsonValue, DataError> {
    let content = std::fs::read_to_string(path).map_err(|source| DataError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| DataError::Json {
        path: path.to_path_buf(),
        source,
    })
}

/// Resolve a dotted path such as `company.founders[0].name`
///
/// Empty segments are skipped. Returns `None` for any missing key, type
/// mismatch, malformed or out-of-range index, and for JSON `null`.
pub fn resolve_path<'d>(data: &'d JsonValue, path: &str) -> Option<&'d JsonValue> {
    let mut current = data;

    for part in path.split('.') {
        if part.is_empty() {
            continue;
        }

        let (key, indexes) = match part.find('[') {
            Some(open) if part.ends_with(']') => (&part[..open], Some(&part[open..])),
            _ => (part, None),
        };

        if !key.is_empty() {
            current = current.as_object()?.get(key)?;
        }

        if let Some(indexes) = indexes {
            // "[1][2]" -> ["1", "2"]
            let inner = &indexes[1..indexes.len() - 1];
            for raw in inner.split("][") {
                let index: usize = raw.trim().parse().ok()?;
                current = current.as_array()?.get(index)?;
            }
        }
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// Stringify a scalar the way it appears in a document
pub fn display_json(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::String(s) => s.clone(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::Array(items) => items
            .iter()
            .map(display_json)
            .collect::<Vec<_>>()
            .join(", "),
        JsonValue::Object(_) => value.to_string(),
    }
}

/// Turn a `choices` entry into the set of selected option names
pub fn normalize_choice(value: Option<&JsonValue>) -> BTreeSet<String> {
    match value {
        None | Some(JsonValue::Null) => BTreeSet::new(),
        Some(JsonValue::Array(items)) => items.iter().map(display_json).collect(),
        Some(JsonValue::Object(map)) => map.keys().cloned().collect(),
        Some(other) => BTreeSet::from([display_json(other)]),
    }
}

#[derive(Deserialize)]
struct ImageEntry {
    path: Option<String>,
    data: Option<String>,
    format: Option<String>,
    width_mm: Option<f64>,
    height_mm: Option<f64>,
}

/// Expand a leading `~` to the user's home directory
fn expand_user(path: &str) -> PathBuf {
    let home = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE"));
    expand_home(path, home.as_deref().map(Path::new))
}

fn expand_home(path: &str, home: Option<&Path>) -> PathBuf {
    if let (Some(rest), Some(home)) = (path.strip_prefix('~'), home) {
        if rest.is_empty() || rest.starts_with('/') || rest.starts_with('\\') {
            return home.join(rest.trim_start_matches(['/', '\\']));
        }
    }
    PathBuf::from(path)
}

/// Collect the image specs declared under `images`
///
/// Paths are resolved relative to `base_dir` when they are not absolute.
pub fn image_specs(
    data: &JsonValue,
    base_dir: Option<&Path>,
) -> Result<Vec<(String, ImageSpec)>, DataError> {
    let Some(images) = data.get("images").and_then(JsonValue::as_object) else {
        return Ok(Vec::new());
    };

    let mut specs = Vec::with_capacity(images.len());
    for (name, raw) in images {
        let invalid = |reason: String| DataError::InvalidImage {
            name: name.clone(),
            reason,
        };
        let entry: ImageEntry =
            serde_json::from_value(raw.clone()).map_err(|e| invalid(e.to_string()))?;

        let source = match (entry.path, entry.data) {
            (Some(path), None) => {
                let mut path = expand_user(&path);
                if path.is_relative() {
                    if let Some(base) = base_dir {
                        path = base.join(path);
                    }
                }
                ImageSource::Path(path)
            }
            (None, Some(encoded)) => {
                let format = entry
                    .format
                    .as_deref()
                    .and_then(ImageFormat::from_extension)
                    .ok_or_else(|| invalid("inline data needs a format (png, jpeg, gif, bmp)".into()))?;
                let bytes = base64::engine::general_purpose::STANDARD
                    .decode(encoded.trim())
                    .map_err(|e| invalid(format!("bad base64 data: {}", e)))?;
                ImageSource::Bytes { bytes, format }
            }
            (Some(_), Some(_)) => return Err(invalid("give either 'path' or 'data', not both".into())),
            (None, None) => return Err(invalid("missing 'path'".into())),
        };

        specs.push((
            name.clone(),
            ImageSpec {
                source,
                width_mm: entry.width_mm.filter(|w| *w > 0.0),
                height_mm: entry.height_mm.filter(|h| *h > 0.0),
            },
        ));
    }

    Ok(specs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_resolve_simple_key() {
        let data = json!({"full_name": "Ivan Petrov"});
        assert_eq!(resolve_path(&data, "full_name"), Some(&json!("Ivan Petrov")));
    }

    #[test]
    fn test_resolve_nested_with_index() {
        let data = json!({"company": {"founders": [{"name": "A"}, {"name": "B"}]}});
        assert_eq!(
            resolve_path(&data, "company.founders[1].name"),
            Some(&json!("B"))
        );
    }

    #[test]
    fn test_resolve_chained_indexes() {
        let data = json!({"grid": [[1, 2], [3, 4]]});
        assert_eq!(resolve_path(&data, "grid[1][0]"), Some(&json!(3)));
    }

    #[test]
    fn test_resolve_skips_empty_segments() {
        let data = json!({"a": {"b": 1}});
        assert_eq!(resolve_path(&data, ".a..b."), Some(&json!(1)));
    }

    #[test]
    fn test_resolve_misses() {
        let data = json!({"a": {"b": [1]}, "n": null, "s": "text"});
        assert_eq!(resolve_path(&data, "missing"), None);
        assert_eq!(resolve_path(&data, "a.b[5]"), None);
        assert_eq!(resolve_path(&data, "a.b[-1]"), None);
        assert_eq!(resolve_path(&data, "a.b[x]"), None);
        assert_eq!(resolve_path(&data, "s.length"), None);
        assert_eq!(resolve_path(&data, "a[0]"), None);
        assert_eq!(resolve_path(&data, "n"), None);
    }

    #[test]
    fn test_normalize_choice_shapes() {
        assert!(normalize_choice(None).is_empty());
        assert!(normalize_choice(Some(&json!(null))).is_empty());
        assert_eq!(
            normalize_choice(Some(&json!("charter"))),
            BTreeSet::from(["charter".to_string()])
        );
        assert_eq!(
            normalize_choice(Some(&json!(["a", 2]))),
            BTreeSet::from(["a".to_string(), "2".to_string()])
        );
        assert_eq!(
            normalize_choice(Some(&json!({"x": true}))),
            BTreeSet::from(["x".to_string()])
        );
        assert_eq!(
            normalize_choice(Some(&json!(7))),
            BTreeSet::from(["7".to_string()])
        );
    }

    #[test]
    fn test_display_json() {
        assert_eq!(display_json(&json!(null)), "");
        assert_eq!(display_json(&json!(42)), "42");
        assert_eq!(display_json(&json!(1.5)), "1.5");
        assert_eq!(display_json(&json!(true)), "true");
        assert_eq!(display_json(&json!(["a", "b"])), "a, b");
    }

    #[test]
    fn test_image_specs_from_path() {
        let data = json!({"images": {"logo": {"path": "img/logo.png", "width_mm": 30}}});
        let specs = image_specs(&data, Some(Path::new("/tmp/job"))).expect("Should parse");
        assert_eq!(specs.len(), 1);
        let (name, spec) = &specs[0];
        assert_eq!(name, "logo");
        assert_eq!(spec.width_mm, Some(30.0));
        assert_eq!(spec.height_mm, None);
        assert_eq!(
            spec.source,
            ImageSource::Path(PathBuf::from("/tmp/job/img/logo.png"))
        );
    }

    #[test]
    fn test_image_specs_from_base64() {
        let data = json!({"images": {"sig": {"data": "AAEC", "format": "png"}}});
        let specs = image_specs(&data, None).expect("Should parse");
        assert_eq!(
            specs[0].1.source,
            ImageSource::Bytes {
                bytes: vec![0, 1, 2],
                format: ImageFormat::Png
            }
        );
    }

    #[test]
    fn test_image_specs_reject_missing_source() {
        let data = json!({"images": {"sig": {"width_mm": 10}}});
        let err = image_specs(&data, None).unwrap_err();
        assert!(err.to_string().contains("sig"));
    }

    #[test]
    fn test_image_specs_absent() {
        assert!(image_specs(&json!({"a": 1}), None).expect("ok").is_empty());
    }

    #[test]
    fn test_expand_user_leaves_plain_paths() {
        assert_eq!(expand_user("a/b.png"), PathBuf::from("a/b.png"));
        assert_eq!(expand_user("~user/x"), PathBuf::from("~user/x"));
    }

    #[test]
    fn test_expand_home() {
        let home = Path::new("/home/ivan");
        assert_eq!(expand_home("~", Some(home)), PathBuf::from("/home/ivan"));
        assert_eq!(
            expand_home("~/img/logo.png", Some(home)),
            PathBuf::from("/home/ivan/img/logo.png")
        );
        assert_eq!(expand_home("~/x.png", None), PathBuf::from("~/x.png"));
        assert_eq!(expand_home("~ivan/x.png", Some(home)), PathBuf::from("~ivan/x.png"));
    }
}
