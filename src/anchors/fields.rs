//! Label/value pairs for anchor fills

use serde_json::Value as JsonValue;

use crate::data::{display_json, DataError};

/// A label to look for and the value to write next to it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub anchor: String,
    pub value: String,
}

impl Field {
    fn new(anchor: &str, value: Option<&JsonValue>) -> Self {
        Self {
            anchor: anchor.trim().to_string(),
            value: value.map(display_json).unwrap_or_default().trim().to_string(),
        }
    }
}

/// `{"anchor": .., "value": ..}` entry, if `item` has that shape
fn anchor_entry(item: &serde_json::Map<String, JsonValue>) -> Option<Field> {
    let anchor = item.get("anchor")?;
    let value = item.get("value")?;
    Some(Field::new(&display_json(anchor), Some(value)))
}

/// Read fields from any of the accepted shapes
///
/// - `{"fields": [{"anchor": .., "value": ..}, ...]}`
/// - `{"label": value, ...}`
/// - `[{"label": value}, {"anchor": .., "value": ..}, ...]`
///
/// Entries without an anchor are dropped. List items of any other shape
/// are ignored.
pub fn load_fields(data: &JsonValue) -> Result<Vec<Field>, DataError> {
    let fields: Vec<Field> = match data {
        JsonValue::Object(map) => match map.get("fields") {
            Some(JsonValue::Array(items)) => items
                .iter()
                .filter_map(JsonValue::as_object)
                .map(|item| {
                    let anchor = item.get("anchor").map(display_json).unwrap_or_default();
                    Field::new(&anchor, item.get("value"))
                })
                .collect(),
            _ => map
                .iter()
                .map(|(label, value)| Field::new(label, Some(value)))
                .collect(),
        },
        JsonValue::Array(items) => items
            .iter()
            .filter_map(JsonValue::as_object)
            .filter_map(|item| {
                anchor_entry(item).or_else(|| match item.iter().next() {
                    Some((label, value)) if item.len() == 1 => Some(Field::new(label, Some(value))),
                    _ => None,
                })
            })
            .collect(),
        _ => return Err(DataError::UnsupportedFields),
    };

    Ok(fields
        .into_iter()
        .filter(|f| !f.anchor.is_empty())
        .collect())
}
